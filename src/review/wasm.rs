//! WASM surface of the review engine
//!
//! ```javascript,ignore
//! const engine = new ReviewEngine({
//!   getDocument: (id) => api.getDocument(id),
//!   updateAnnotations: (docId, anns) => api.updateAnnotations(docId, anns),
//!   addAnnotations: (docId, anns) => api.addAnnotations(docId, anns),
//!   lookupConcept: (text) => api.getLinker(text),
//! }, { rollback_on_failure: false });
//!
//! await engine.loadDocument('42');
//! engine.selectAnnotation('a1');
//! const { ok, error } = await engine.review('ACCEPT');
//! if (!ok) notify(error.message);
//! ```

use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

use crate::config::EngineConfig;
use crate::error::{Result, TatError};
use crate::model::{Annotation, Document, ReviewAction, ReviewProgress};
use crate::query::{export_annotations, AnnotationQuery, ExportFormat};
use crate::review::client::{ConceptLinker, DocumentStore, ReviewClient};
use crate::review::ledger::UpdateResponse;
use crate::review::session::{LinkerResponse, ReviewSession, ReviewState};
use crate::review::workspace::Workspace;
use crate::to_js;

// =============================================================================
// JS-backed store
// =============================================================================

/// Store whose operations are JS callbacks returning Promises
pub struct JsStore {
    get_document: Option<js_sys::Function>,
    update_annotations: js_sys::Function,
    add_annotations: js_sys::Function,
    lookup_concept: js_sys::Function,
}

fn callback(store: &JsValue, name: &str) -> std::result::Result<Option<js_sys::Function>, JsValue> {
    let value = js_sys::Reflect::get(store, &JsValue::from_str(name))?;
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    value
        .dyn_into::<js_sys::Function>()
        .map(Some)
        .map_err(|_| JsValue::from_str(&format!("store.{} is not a function", name)))
}

fn required(store: &JsValue, name: &str) -> std::result::Result<js_sys::Function, JsValue> {
    callback(store, name)?.ok_or_else(|| JsValue::from_str(&format!("store.{} is required", name)))
}

fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| value.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| format!("{:?}", value))
}

impl JsStore {
    pub fn from_js(store: &JsValue) -> std::result::Result<Self, JsValue> {
        Ok(Self {
            get_document: callback(store, "getDocument")?,
            update_annotations: required(store, "updateAnnotations")?,
            add_annotations: required(store, "addAnnotations")?,
            lookup_concept: required(store, "lookupConcept")?,
        })
    }

    async fn invoke<T: serde::de::DeserializeOwned>(&self, func: &js_sys::Function, args: &[JsValue]) -> Result<T> {
        let this = JsValue::NULL;
        let returned = match args {
            [a] => func.call1(&this, a),
            [a, b] => func.call2(&this, a, b),
            _ => func.call0(&this),
        }
        .map_err(|e| TatError::network(js_message(&e)))?;

        let value = JsFuture::from(js_sys::Promise::resolve(&returned))
            .await
            .map_err(|e| TatError::network(js_message(&e)))?;
        serde_wasm_bindgen::from_value(value).map_err(|e| TatError::network(format!("malformed response: {}", e)))
    }

    fn annotations_arg(annotations: &[Annotation]) -> Result<JsValue> {
        to_js(annotations).map_err(|e| TatError::invalid_input(js_message(&e)))
    }
}

impl DocumentStore for JsStore {
    async fn get_document(&self, document_id: &str) -> Result<Document> {
        let func = self
            .get_document
            .as_ref()
            .ok_or_else(|| TatError::invalid_state("store has no getDocument callback"))?;
        self.invoke(func, &[JsValue::from_str(document_id)]).await
    }

    async fn update_annotations(&self, document_id: &str, annotations: &[Annotation]) -> Result<UpdateResponse> {
        let payload = Self::annotations_arg(annotations)?;
        self.invoke(&self.update_annotations, &[JsValue::from_str(document_id), payload]).await
    }

    async fn add_annotations(&self, document_id: &str, annotations: &[Annotation]) -> Result<UpdateResponse> {
        let payload = Self::annotations_arg(annotations)?;
        self.invoke(&self.add_annotations, &[JsValue::from_str(document_id), payload]).await
    }
}

impl ConceptLinker for JsStore {
    async fn lookup_concept(&self, text: &str) -> Result<LinkerResponse> {
        self.invoke(&self.lookup_concept, &[JsValue::from_str(text)]).await
    }
}

// =============================================================================
// Async outcomes
// =============================================================================

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    /// Notification text
    message: String,
    detail: String,
}

/// What async methods resolve with; they never reject on backend failures
#[derive(Serialize)]
struct Outcome<T> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

fn settle<T: Serialize>(result: Result<T>) -> std::result::Result<JsValue, JsValue> {
    let outcome = match result {
        Ok(value) => Outcome { ok: true, value: Some(value), error: None },
        Err(e) => Outcome {
            ok: false,
            value: None,
            error: Some(ErrorBody {
                kind: e.kind(),
                message: e.user_message(),
                detail: e.to_string(),
            }),
        },
    };
    to_js(&outcome).map_err(|e| {
        web_sys::console::error_1(&format!("[ReviewEngine] Failed to serialize outcome: {}", js_message(&e)).into());
        e
    })
}

fn sync_err(e: TatError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// =============================================================================
// ReviewEngine
// =============================================================================

#[wasm_bindgen]
pub struct ReviewEngine {
    client: ReviewClient<JsStore>,
}

#[wasm_bindgen]
impl ReviewEngine {
    /// Create an engine.
    ///
    /// # Arguments
    /// * `store` - object with `updateAnnotations`, `addAnnotations`,
    ///   `lookupConcept` and optionally `getDocument` callbacks
    /// * `config` - `EngineConfig` object, or null for defaults
    #[wasm_bindgen(constructor)]
    pub fn new(store: JsValue, config: JsValue) -> std::result::Result<ReviewEngine, JsValue> {
        let config: EngineConfig = if config.is_null() || config.is_undefined() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?
        };
        let store = JsStore::from_js(&store)?;
        let workspace = Workspace::new(Document::default(), config);

        Ok(Self {
            client: ReviewClient::new(workspace, store),
        })
    }

    // =========================================================================
    // Document
    // =========================================================================

    /// Fetch a document through `store.getDocument`. Resolves `{ ok, error? }`.
    #[wasm_bindgen(js_name = loadDocument)]
    pub fn load_document(&self, document_id: String) -> js_sys::Promise {
        let client = self.client.clone();
        future_to_promise(async move { settle(client.load(&document_id).await) })
    }

    /// Use an already fetched document
    #[wasm_bindgen(js_name = setDocument)]
    pub fn set_document(&self, document: JsValue) -> std::result::Result<(), JsValue> {
        let document: Document = serde_wasm_bindgen::from_value(document)
            .map_err(|e| JsValue::from_str(&format!("Invalid document: {}", e)))?;
        if let Err(e) = document.check_spans() {
            web_sys::console::warn_1(&format!("[ReviewEngine] {}", e).into());
        }
        self.client.with_mut(|ws| ws.replace_document(document));
        Ok(())
    }

    #[wasm_bindgen(js_name = getDocument)]
    pub fn get_document(&self) -> std::result::Result<JsValue, JsValue> {
        self.client.with(|ws| to_js(&ws.document))
    }

    // =========================================================================
    // Highlighting
    // =========================================================================

    #[wasm_bindgen(js_name = findMatches)]
    pub fn find_matches(&self, query_text: &str, caret_offset: usize) -> std::result::Result<JsValue, JsValue> {
        let result = self
            .client
            .with(|ws| ws.find_matches(query_text, caret_offset))
            .map_err(sync_err)?;
        to_js(&result)
    }

    /// Render segments for the current document and mode
    #[wasm_bindgen]
    pub fn composite(&self) -> std::result::Result<JsValue, JsValue> {
        self.client.with(|ws| to_js(&ws.composite()))
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Returns the new state name
    #[wasm_bindgen(js_name = selectAnnotation)]
    pub fn select_annotation(&self, id: &str) -> std::result::Result<JsValue, JsValue> {
        let state = self.client.with_mut(|ws| ws.select_annotation(id)).map_err(sync_err)?;
        to_js(&state)
    }

    #[wasm_bindgen(js_name = startBatchReview)]
    pub fn start_batch_review(&self) -> std::result::Result<(), JsValue> {
        self.client.with_mut(|ws| ws.start_batch_review()).map_err(sync_err)
    }

    #[wasm_bindgen(js_name = closeBatchReview)]
    pub fn close_batch_review(&self) {
        self.client.with_mut(|ws| ws.session.close_batch_review());
    }

    /// Literal selection `[start, end)` in UTF-16 offsets
    #[wasm_bindgen(js_name = selectText)]
    pub fn select_text(&self, start: usize, end: usize) -> std::result::Result<JsValue, JsValue> {
        let state = self.client.with_mut(|ws| ws.select_text(start, end)).map_err(sync_err)?;
        to_js(&state)
    }

    #[wasm_bindgen(js_name = clearSelection)]
    pub fn clear_selection(&self) {
        self.client.with_mut(|ws| ws.session.clear_selection());
    }

    #[wasm_bindgen]
    pub fn close(&self) {
        self.client.with_mut(|ws| ws.session.close());
    }

    #[wasm_bindgen(js_name = getState)]
    pub fn get_state(&self) -> std::result::Result<JsValue, JsValue> {
        let state: ReviewState = self.client.with(|ws| ws.state());
        to_js(&state)
    }

    // =========================================================================
    // Add mode
    // =========================================================================

    /// Enter add mode and run the concept lookup. Resolves `{ ok, error? }`.
    #[wasm_bindgen(js_name = enableAddMode)]
    pub fn enable_add_mode(&self) -> js_sys::Promise {
        let client = self.client.clone();
        future_to_promise(async move { settle(client.enable_add_mode().await) })
    }

    /// Returns the mention index to scroll back to, if any
    #[wasm_bindgen(js_name = closeAddMode)]
    pub fn close_add_mode(&self) -> Option<usize> {
        self.client.with_mut(|ws| ws.session.close_add_mode())
    }

    #[wasm_bindgen(js_name = toggleCandidate)]
    pub fn toggle_candidate(&self, index: usize) -> std::result::Result<bool, JsValue> {
        self.client.with_mut(|ws| ws.session.toggle_candidate(index)).map_err(sync_err)
    }

    #[wasm_bindgen(js_name = selectAllCandidates)]
    pub fn select_all_candidates(&self) -> std::result::Result<(), JsValue> {
        self.client.with_mut(|ws| ws.session.select_all_candidates()).map_err(sync_err)
    }

    #[wasm_bindgen(js_name = deselectAllCandidates)]
    pub fn deselect_all_candidates(&self) -> std::result::Result<(), JsValue> {
        self.client.with_mut(|ws| ws.session.deselect_all_candidates()).map_err(sync_err)
    }

    #[wasm_bindgen(js_name = setActiveMatch)]
    pub fn set_active_match(&self, index: usize) -> std::result::Result<(), JsValue> {
        self.client.with_mut(|ws| ws.session.set_active_match(index)).map_err(sync_err)
    }

    /// Add the checked candidates. Resolves `{ ok, value?, error? }`.
    #[wasm_bindgen(js_name = confirmAdd)]
    pub fn confirm_add(&self) -> js_sys::Promise {
        let client = self.client.clone();
        future_to_promise(async move { settle(client.confirm_add().await) })
    }

    // =========================================================================
    // Review
    // =========================================================================

    /// "ACCEPT" or "REJECT" on the active annotation (the group in batch review)
    #[wasm_bindgen]
    pub fn review(&self, action: String) -> js_sys::Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            let result = match action.parse::<ReviewAction>() {
                Ok(action) => client.review(action).await,
                Err(e) => Err(e),
            };
            settle(result)
        })
    }

    /// "ACCEPT" or "REJECT" on the active annotation's whole linked group
    #[wasm_bindgen(js_name = reviewAll)]
    pub fn review_all(&self, action: String) -> js_sys::Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            let result = match action.parse::<ReviewAction>() {
                Ok(action) => client.review_all(action).await,
                Err(e) => Err(e),
            };
            settle(result)
        })
    }

    // =========================================================================
    // Session persistence
    // =========================================================================

    /// Session plus derived state (group status, review progress), for
    /// rendering the sidebar
    #[wasm_bindgen(js_name = getSession)]
    pub fn get_session(&self) -> std::result::Result<JsValue, JsValue> {
        #[derive(Serialize)]
        struct View<'a> {
            #[serde(flatten)]
            session: &'a ReviewSession,
            state: ReviewState,
            group_status: Option<crate::model::Status>,
            group_reviewed: bool,
            progress: ReviewProgress,
        }

        self.client.with(|ws| {
            to_js(&View {
                session: &ws.session,
                state: ws.state(),
                group_status: ws.session.group_status(&ws.document),
                group_reviewed: ws.session.group_reviewed(&ws.document),
                progress: ws.document.aggregations.review_progress(),
            })
        })
    }

    #[wasm_bindgen(js_name = saveSession)]
    pub fn save_session(&self) -> std::result::Result<String, JsValue> {
        self.client.with(|ws| ws.session.to_json()).map_err(sync_err)
    }

    #[wasm_bindgen(js_name = restoreSession)]
    pub fn restore_session(&self, json: &str) -> std::result::Result<(), JsValue> {
        self.client
            .with_mut(|ws| -> Result<()> {
                ws.session = ReviewSession::from_json(json, &ws.document)?;
                Ok(())
            })
            .map_err(sync_err)
    }

    // =========================================================================
    // Querying
    // =========================================================================

    /// Annotations matching an `AnnotationQuery` (null for all)
    #[wasm_bindgen(js_name = queryAnnotations)]
    pub fn query_annotations(&self, query: JsValue) -> std::result::Result<JsValue, JsValue> {
        let query = parse_query(query)?;
        self.client.with(|ws| to_js(&ws.query(&query)))
    }

    /// CSV or TSV text of the annotations matching `query`
    #[wasm_bindgen(js_name = exportAnnotations)]
    pub fn export_annotations(&self, format: &str, query: JsValue) -> std::result::Result<String, JsValue> {
        let format: ExportFormat = format.parse().map_err(sync_err)?;
        let query = parse_query(query)?;
        Ok(self.client.with(|ws| export_annotations(ws.query(&query), format)))
    }
}

fn parse_query(query: JsValue) -> std::result::Result<AnnotationQuery, JsValue> {
    if query.is_null() || query.is_undefined() {
        return Ok(AnnotationQuery::default());
    }
    serde_wasm_bindgen::from_value(query).map_err(|e| JsValue::from_str(&format!("Invalid query: {}", e)))
}
