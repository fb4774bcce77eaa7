//! Review state machine tests
//!
//! Shared fixture: a short abstract with two linked groups (virus, ACE2),
//! one MANUAL annotation and two unannotated mentions of "lungs".

mod ledger_tests;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::error::{Result, TatError};
use crate::model::{Aggregation, Annotation, Document, Status};
use crate::review::client::{ConceptLinker, DocumentStore};
use crate::review::ledger::UpdateResponse;
use crate::review::session::{ConceptSuggestion, LinkerResponse};

// virus: 4, 54   ACE2: 16, 22, 69   inhibitors: 74   lungs: 43   Lungs: 91
pub(super) const TEXT: &str = "The virus binds ACE2. ACE2 is expressed in lungs. The virus spreads; ACE2 inhibitors help. Lungs recover.";

pub(super) fn ann(id: &str, start: usize, text: &str, status: Status, canonical: &str) -> Annotation {
    Annotation {
        id: id.to_string(),
        start,
        end: start + text.len(),
        text: text.to_string(),
        tag: if canonical == "C1" { "species & viruses" } else { "genetics" }.to_string(),
        status,
        canonical_id: Some(canonical.to_string()),
        canonical_name: Some(format!("concept {}", canonical)),
        entity_p: 0.97,
        datetime_modified: None,
        datetime_reviewed: None,
    }
}

pub(super) fn fixture() -> Document {
    Document::new("doc-1", TEXT, vec![
        ann("v1", 4, "virus", Status::NotReviewed, "C1"),
        ann("e1", 16, "ACE2", Status::NotReviewed, "C2"),
        ann("e2", 22, "ACE2", Status::Accepted, "C2"),
        ann("v2", 54, "virus", Status::NotReviewed, "C1"),
        ann("e3", 69, "ACE2", Status::NotReviewed, "C2"),
        ann("m1", 74, "inhibitors", Status::Manual, "C3"),
    ])
}

pub(super) fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub(super) fn status_of(document: &Document, id: &str) -> Status {
    document.annotation(id).map(|a| a.status).unwrap_or_else(|| panic!("no annotation {}", id))
}

/// Tally matches the annotation statuses bucket by bucket
pub(super) fn assert_consistent(document: &Document) {
    let expected = Aggregation::from_annotations(&document.annotations);
    for status in Status::ORDER {
        assert_eq!(
            document.aggregations.count(status),
            expected.count(status),
            "bucket {} out of step",
            status
        );
    }
    assert_eq!(document.aggregations.total(), document.annotations.len() as i64);
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Backend double: keeps its own copy of the document and answers like the API
pub(super) struct MockStore {
    pub server: RefCell<Document>,
    pub fail_updates: Cell<bool>,
    /// None makes the concept lookup fail
    pub linker: RefCell<Option<Vec<ConceptSuggestion>>>,
    pub calls: RefCell<Vec<String>>,
    /// Drop every other added annotation (server-side validation)
    pub drop_odd_adds: Cell<bool>,
    active: RefCell<HashSet<String>>,
    pub overlapped: Cell<bool>,
    next_id: Cell<u64>,
}

impl MockStore {
    pub fn new(document: Document) -> Self {
        Self {
            server: RefCell::new(document),
            fail_updates: Cell::new(false),
            linker: RefCell::new(Some(vec![ConceptSuggestion {
                id: "C0024109".to_string(),
                name: "Lung".to_string(),
                kind: Some("anatomy".to_string()),
            }])),
            calls: RefCell::new(Vec::new()),
            drop_odd_adds: Cell::new(false),
            active: RefCell::new(HashSet::new()),
            overlapped: Cell::new(false),
            next_id: Cell::new(1),
        }
    }

    fn response(&self, annotations: Vec<Annotation>) -> UpdateResponse {
        let server = self.server.borrow();
        UpdateResponse {
            annotations,
            aggregations: Some(Aggregation::from_annotations(&server.annotations)),
        }
    }

    /// Mark ids as being processed; notes when one already was
    fn enter(&self, annotations: &[Annotation]) {
        let mut active = self.active.borrow_mut();
        for a in annotations {
            if !active.insert(a.id.clone()) {
                self.overlapped.set(true);
            }
        }
    }

    fn leave(&self, annotations: &[Annotation]) {
        let mut active = self.active.borrow_mut();
        for a in annotations {
            active.remove(&a.id);
        }
    }

    async fn in_transit() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }
}

impl DocumentStore for MockStore {
    async fn get_document(&self, document_id: &str) -> Result<Document> {
        self.calls.borrow_mut().push(format!("get:{}", document_id));
        let server = self.server.borrow();
        if server.id != document_id {
            return Err(TatError::network(format!("404 document {}", document_id)));
        }
        Ok(server.clone())
    }

    async fn update_annotations(&self, document_id: &str, annotations: &[Annotation]) -> Result<UpdateResponse> {
        self.calls.borrow_mut().push(format!("update:{}", annotations.len()));
        self.enter(annotations);
        let result = if self.fail_updates.get() {
            Err(TatError::network("503 Service Unavailable"))
        } else {
            let mut stored = Vec::new();
            {
                let mut server = self.server.borrow_mut();
                assert_eq!(server.id, document_id);
                for incoming in annotations {
                    if let Some(pos) = server.position(&incoming.id) {
                        let mut saved = incoming.clone();
                        saved.datetime_modified = Some("2021-06-01T12:00:00.000".to_string());
                        server.annotations[pos] = saved.clone();
                        stored.push(saved);
                    }
                }
            }
            Ok(self.response(stored))
        };
        Self::in_transit().await;
        self.leave(annotations);
        result
    }

    async fn add_annotations(&self, _document_id: &str, annotations: &[Annotation]) -> Result<UpdateResponse> {
        self.calls.borrow_mut().push(format!("add:{}", annotations.len()));
        if self.fail_updates.get() {
            Self::in_transit().await;
            return Err(TatError::network("503 Service Unavailable"));
        }
        let mut stored = Vec::new();
        {
            let mut server = self.server.borrow_mut();
            for (i, incoming) in annotations.iter().enumerate() {
                if self.drop_odd_adds.get() && i % 2 == 1 {
                    continue;
                }
                let mut saved = incoming.clone();
                saved.id = format!("srv-{}", self.next_id.get());
                self.next_id.set(self.next_id.get() + 1);
                server.annotations.push(saved.clone());
                stored.push(saved);
            }
            server.sort_annotations();
        }
        let response = self.response(stored);
        Self::in_transit().await;
        Ok(response)
    }
}

impl ConceptLinker for MockStore {
    async fn lookup_concept(&self, text: &str) -> Result<LinkerResponse> {
        self.calls.borrow_mut().push(format!("lookup:{}", text));
        Self::in_transit().await;
        match self.linker.borrow().clone() {
            Some(results) => Ok(LinkerResponse { results }),
            None => Err(TatError::network("linker timed out")),
        }
    }
}
