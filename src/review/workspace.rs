//! Workspace: one open document with its session and ledger
//!
//! The synchronous half of the review engine. All mutations of the document
//! are paired with the session bookkeeping they imply, so the async client
//! and the WASM surface only ever call these methods.

use crate::config::EngineConfig;
use crate::error::{Result, TatError, ValidationError};
use crate::highlight::{composite, MatchResult, Segment, TextMatcher};
use crate::model::{Annotation, Document, ReviewAction, Status};
use crate::query::AnnotationQuery;
use crate::review::ledger::{Reconciled, ReviewLedger, ToggleBasis, Transaction, TransactionKind, UpdateResponse};
use crate::review::session::{ConceptSuggestion, Mode, ReviewSession, ReviewState};

#[derive(Debug)]
pub struct Workspace {
    pub document: Document,
    pub session: ReviewSession,
    pub ledger: ReviewLedger,
    matcher: TextMatcher,
    config: EngineConfig,
}

impl Workspace {
    pub fn new(document: Document, config: EngineConfig) -> Self {
        let session = ReviewSession::new(document.id.clone());
        Self {
            document,
            session,
            ledger: ReviewLedger::new(),
            matcher: TextMatcher::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> ReviewState {
        self.session.state()
    }

    /// Swap in a freshly fetched document. A different id resets the session
    /// and the ledger; the same id keeps them and refreshes the selection.
    pub fn replace_document(&mut self, document: Document) {
        let changed = self.session.document_changed(&document.id);
        self.document = document;
        if changed {
            self.ledger.reset();
            tracing::debug!(document = self.document.id.as_str(), "document changed");
        } else {
            self.session.refresh(&self.document);
        }
    }

    // =========================================================================
    // Read side
    // =========================================================================

    pub fn find_matches(&self, query_text: &str, caret_offset: usize) -> Result<MatchResult> {
        self.matcher.find_matches(&self.document, query_text, caret_offset)
    }

    /// Render sequence; annotations are hidden while adding, in which case
    /// the add candidates are overlaid
    pub fn composite(&self) -> Vec<Segment<'_>> {
        let include_annotations = self.session.mode != Mode::Add;
        let matches = match (&self.session.mode, &self.session.add_state) {
            (Mode::Add, Some(add)) => add.matches(),
            _ => &[],
        };
        composite(&self.document.text, &self.document.annotations, matches, include_annotations)
    }

    pub fn query(&self, query: &AnnotationQuery) -> Vec<&Annotation> {
        query.apply(&self.document.annotations)
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn select_annotation(&mut self, id: &str) -> Result<ReviewState> {
        self.session.select_annotation(&self.document, id)
    }

    pub fn start_batch_review(&mut self) -> Result<()> {
        self.session.start_batch_review(&self.document)
    }

    pub fn select_text(&mut self, start: usize, end: usize) -> Result<ReviewState> {
        self.session.select_text(&self.document, &self.matcher, start, end)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Annotations a review press would touch, and how they toggle
    pub fn review_plan(&self) -> Result<(Vec<String>, ToggleBasis)> {
        let targets = self.session.review_targets();
        if targets.is_empty() {
            return Err(TatError::invalid_state("no annotation selected"));
        }
        let basis = if self.session.mode == Mode::Review {
            ToggleBasis::Group
        } else {
            ToggleBasis::Individual
        };
        Ok((targets, basis))
    }

    /// Plan for "review all": the active annotation's linked group
    pub fn linked_plan(&self) -> Result<(Vec<String>, ToggleBasis)> {
        let Some(active) = self.session.active_annotation_id.as_deref() else {
            return Err(TatError::invalid_state("no annotation selected"));
        };
        let linked = self.document.linked_ids(active);
        if linked.is_empty() {
            return Err(TatError::invalid_state(format!("annotation {} has no linked group", active)));
        }
        Ok((linked, ToggleBasis::Group))
    }

    /// Review press on the active annotation (or the linked group in batch review)
    pub fn review_active(&mut self, action: ReviewAction) -> Result<Transaction> {
        let (ids, basis) = self.review_plan()?;
        self.review_ids(&ids, action, basis)
    }

    pub fn review_ids(&mut self, ids: &[String], action: ReviewAction, basis: ToggleBasis) -> Result<Transaction> {
        self.ledger.review(&mut self.document, ids, action, basis)
    }

    /// Review press on one annotation by id
    pub fn review(&mut self, id: &str, action: ReviewAction) -> Result<Transaction> {
        self.ledger.review(&mut self.document, &[id.to_string()], action, ToggleBasis::Individual)
    }

    /// Review press on every non-MANUAL annotation linked to `id`
    pub fn review_linked(&mut self, id: &str, action: ReviewAction) -> Result<Transaction> {
        let linked = self.document.linked_ids(id);
        if linked.is_empty() {
            return Err(TatError::invalid_state(format!("annotation {} has no linked group", id)));
        }
        self.ledger.review(&mut self.document, &linked, action, ToggleBasis::Group)
    }

    /// Enter add mode; returns the text to send to the concept linker
    pub fn enable_add_mode(&mut self) -> Result<String> {
        self.session.enable_add_mode()
    }

    pub fn linker_resolved(&mut self, results: Vec<ConceptSuggestion>) -> bool {
        self.session.linker_resolved(results)
    }

    /// Turn the checked candidates into MANUAL annotations and leave add mode
    pub fn confirm_add(&mut self) -> Result<Transaction> {
        let Some(add) = self.session.add_state.as_ref().filter(|_| self.session.mode == Mode::Add) else {
            return Err(TatError::invalid_state("not in add mode"));
        };
        let Some(concept) = add.suggestion() else {
            return Err(ValidationError::MissingConcept.into());
        };
        let candidates = add.candidates();
        if candidates.is_empty() {
            return Err(ValidationError::NoCandidates.into());
        }

        let tag = add.suggested_tag();
        let new: Vec<Annotation> = candidates
            .iter()
            .map(|m| Annotation {
                id: String::new(),
                start: m.start,
                end: m.end,
                text: m.text.clone(),
                tag: tag.clone(),
                status: Status::Manual,
                canonical_id: Some(concept.id.clone()),
                canonical_name: Some(concept.name.clone()),
                entity_p: 0.0,
                datetime_modified: None,
                datetime_reviewed: None,
            })
            .collect();
        let focus_start = add.active_match().map(|m| m.start);

        let tx = self.ledger.add(&mut self.document, new, focus_start)?;
        self.session.close_add_mode();
        Ok(tx)
    }

    /// Apply the server's answer to `tx`
    pub fn reconcile(&mut self, tx: &Transaction, response: UpdateResponse) -> Reconciled {
        let reconciled = self.ledger.reconcile(&mut self.document, tx, response);
        if tx.document_id != self.document.id {
            return reconciled;
        }

        for (from, to) in &reconciled.renamed {
            self.session.rename_annotation(from, to);
        }
        self.session.refresh(&self.document);

        if tx.kind == TransactionKind::Add {
            let focus = tx.focus_start.and_then(|start| {
                reconciled
                    .renamed
                    .iter()
                    .map(|(_, id)| id)
                    .find(|id| self.document.annotation(id).is_some_and(|a| a.start == start))
                    .cloned()
            });
            if let Some(id) = focus {
                self.session.focus_if_idle(&self.document, &id);
            }
        }
        reconciled
    }

    /// The request for `tx` failed. Rolls back when configured to; returns
    /// the ids restored.
    pub fn fail(&mut self, tx: &Transaction) -> Vec<String> {
        if self.config.rollback_on_failure {
            let restored = self.ledger.rollback(&mut self.document, tx);
            self.session.refresh(&self.document);
            restored
        } else {
            self.ledger.abandon(tx);
            Vec::new()
        }
    }
}
