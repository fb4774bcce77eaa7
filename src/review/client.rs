//! ReviewClient: drives a Workspace against the backend
//!
//! Each write applies optimistically, awaits the store, then reconciles or
//! fails the transaction. Writes touching the same annotation are queued
//! behind one another with a per-id async mutex, so a double click can not
//! issue two overlapping requests for one annotation.
//!
//! Runs on a single thread (the browser event loop); shared state lives in
//! `Rc<RefCell<..>>` and no `RefCell` borrow is held across an await.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::{Annotation, Document, ReviewAction};
use crate::review::ledger::{Reconciled, ToggleBasis, Transaction, TransactionKind, UpdateResponse};
use crate::review::session::LinkerResponse;
use crate::review::workspace::Workspace;

// =============================================================================
// Collaborators
// =============================================================================

/// Backend document API
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get_document(&self, document_id: &str) -> Result<Document>;

    async fn update_annotations(&self, document_id: &str, annotations: &[Annotation]) -> Result<UpdateResponse>;

    async fn add_annotations(&self, document_id: &str, annotations: &[Annotation]) -> Result<UpdateResponse>;
}

/// External entity-resolution service
#[allow(async_fn_in_trait)]
pub trait ConceptLinker {
    async fn lookup_concept(&self, text: &str) -> Result<LinkerResponse>;
}

// =============================================================================
// Client
// =============================================================================

pub struct ReviewClient<S> {
    workspace: Rc<RefCell<Workspace>>,
    store: Rc<S>,
    locks: Rc<RefCell<HashMap<String, Rc<Mutex<()>>>>>,
}

impl<S> Clone for ReviewClient<S> {
    fn clone(&self) -> Self {
        Self {
            workspace: Rc::clone(&self.workspace),
            store: Rc::clone(&self.store),
            locks: Rc::clone(&self.locks),
        }
    }
}

impl<S: DocumentStore + ConceptLinker> ReviewClient<S> {
    pub fn new(workspace: Workspace, store: S) -> Self {
        Self {
            workspace: Rc::new(RefCell::new(workspace)),
            store: Rc::new(store),
            locks: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&Workspace) -> R) -> R {
        f(&self.workspace.borrow())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Workspace) -> R) -> R {
        f(&mut self.workspace.borrow_mut())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch a document and make it current
    pub async fn load(&self, document_id: &str) -> Result<()> {
        let document = self.store.get_document(document_id).await?;
        if let Err(e) = document.check_spans() {
            tracing::warn!(document = document_id, error = %e, "document has inconsistent spans");
        }
        self.with_mut(|ws| ws.replace_document(document));
        Ok(())
    }

    /// Review press on the active annotation, or the group in batch review
    pub async fn review(&self, action: ReviewAction) -> Result<Reconciled> {
        let (ids, basis) = self.with(|ws| ws.review_plan())?;
        self.review_ids(ids, action, basis).await
    }

    /// Review press applied to the active annotation's whole linked group
    pub async fn review_all(&self, action: ReviewAction) -> Result<Reconciled> {
        let (ids, basis) = self.with(|ws| ws.linked_plan())?;
        self.review_ids(ids, action, basis).await
    }

    pub async fn review_ids(&self, ids: Vec<String>, action: ReviewAction, basis: ToggleBasis) -> Result<Reconciled> {
        let serialize = self.with(|ws| ws.config().serialize_updates);
        let mutexes = if serialize { self.locks_for(&ids) } else { Vec::new() };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in &mutexes {
            guards.push(mutex.lock().await);
        }

        let result = match self.with_mut(|ws| ws.review_ids(&ids, action, basis)) {
            Ok(tx) => self.commit(tx).await,
            Err(e) => Err(e),
        };

        drop(guards);
        drop(mutexes);
        self.prune_locks();
        result
    }

    /// Enter add mode and look up the selected text's concept.
    ///
    /// A failed lookup leaves add mode open with no suggestion.
    pub async fn enable_add_mode(&self) -> Result<()> {
        let query_text = self.with_mut(|ws| ws.enable_add_mode())?;
        match self.store.lookup_concept(&query_text).await {
            Ok(response) => {
                self.with_mut(|ws| ws.linker_resolved(response.results));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(query = query_text.as_str(), error = %e, "concept lookup failed");
                self.with_mut(|ws| ws.linker_resolved(Vec::new()));
                Err(e)
            }
        }
    }

    /// Add the checked candidates
    pub async fn confirm_add(&self) -> Result<Reconciled> {
        let tx = self.with_mut(|ws| ws.confirm_add())?;
        self.commit(tx).await
    }

    /// Send an applied transaction and settle it
    async fn commit(&self, tx: Transaction) -> Result<Reconciled> {
        if tx.is_empty() {
            self.with_mut(|ws| ws.ledger.abandon(&tx));
            return Ok(Reconciled::default());
        }

        let response = match tx.kind {
            TransactionKind::Review => self.store.update_annotations(&tx.document_id, &tx.payload).await,
            TransactionKind::Add => self.store.add_annotations(&tx.document_id, &tx.payload).await,
        };

        match response {
            Ok(response) => Ok(self.with_mut(|ws| ws.reconcile(&tx, response))),
            Err(e) => {
                tracing::warn!(seq = tx.seq, kind = ?tx.kind, error = %e, "annotation update failed");
                let restored = self.with_mut(|ws| ws.fail(&tx));
                if !restored.is_empty() {
                    tracing::debug!(seq = tx.seq, restored = restored.len(), "optimistic state restored");
                }
                Err(e)
            }
        }
    }

    /// Per-annotation mutexes, in id order so batches never deadlock
    fn locks_for(&self, ids: &[String]) -> Vec<Rc<Mutex<()>>> {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut locks = self.locks.borrow_mut();
        sorted
            .into_iter()
            .map(|id| Rc::clone(locks.entry(id.clone()).or_insert_with(|| Rc::new(Mutex::new(())))))
            .collect()
    }

    fn prune_locks(&self) {
        self.locks.borrow_mut().retain(|_, m| Rc::strong_count(m) > 1);
    }

    /// Number of annotations with a queued or running write
    pub fn busy_count(&self) -> usize {
        self.locks.borrow().len()
    }
}
