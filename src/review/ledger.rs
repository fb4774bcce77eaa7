//! ReviewLedger: optimistic updates and their reconciliation
//!
//! Every mutation of `Document.annotations` goes through here together with
//! the matching aggregation change, so `sum(progress.count)` always equals
//! the number of annotations.
//!
//! Writes are two-phase. `review` / `add` apply the change locally and return
//! a `Transaction` describing what to send; the caller later hands the
//! server's answer to `reconcile`, or gives up with `rollback` / `abandon`.
//! Each transaction carries a sequence number. A server answer is applied
//! for an annotation unless a newer answer for it was already applied, so
//! the server's value beats any later optimistic write.
//!
//! Requests for different annotations may be handled by the server in any
//! order, so a response's status counts can miss writes the server had not
//! seen yet. After adopting a response, the status buckets are recounted from
//! the annotation array instead of patching the server's numbers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, TatError};
use crate::model::{Aggregation, Annotation, Document, ReviewAction, Status};
use crate::review::session::group_status;

/// Prefix of ids given to annotations the server has not stored yet
pub const PROVISIONAL_PREFIX: &str = "annotation-preflight-";

/// Backend timestamp format (naive UTC, milliseconds)
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

// =============================================================================
// Types
// =============================================================================

/// One annotation's optimistic status move. `from` is None for a created annotation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub id: String,
    pub from: Option<Status>,
    pub to: Status,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Review,
    Add,
}

/// How a review press picks the new status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleBasis {
    /// Each annotation toggles against its own status
    Individual,
    /// All annotations toggle against the group's collective status
    Group,
}

/// An applied-but-unconfirmed local write
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    pub seq: u64,
    pub document_id: String,
    pub kind: TransactionKind,
    pub changes: Vec<StatusChange>,
    /// Annotations to send to the store
    pub payload: Vec<Annotation>,
    /// Annotations as they were before this write (review only)
    pub snapshot: Vec<Annotation>,
    /// Start offset of the annotation to focus once an add is confirmed
    pub focus_start: Option<usize>,
}

impl Transaction {
    pub fn ids(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// `updateAnnotations` / `addAnnotations` response body
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct UpdateResponse {
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub aggregations: Option<Aggregation>,
}

/// What `reconcile` did
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Reconciled {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    /// `(provisional id, stored id)` pairs
    pub renamed: Vec<(String, String)>,
    pub aggregation_applied: bool,
}

// =============================================================================
// Ledger
// =============================================================================

/// Sequencing state for one document's writes
#[derive(Debug, Default)]
pub struct ReviewLedger {
    next_seq: u64,
    next_provisional: u64,
    /// Latest optimistic write per annotation
    written: HashMap<String, u64>,
    /// Latest reconciled write per annotation
    confirmed: HashMap<String, u64>,
    aggregation_confirmed: u64,
    /// Changes of transactions still awaiting an answer
    pending: BTreeMap<u64, Vec<StatusChange>>,
}

impl ReviewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Any transaction touching `id` awaits an answer
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.pending.values().flatten().any(|c| c.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget all sequencing state (new document)
    pub fn reset(&mut self) {
        *self = Self {
            next_seq: self.next_seq,
            next_provisional: self.next_provisional,
            ..Self::default()
        };
    }

    /// Apply a review press to `ids` optimistically.
    ///
    /// MANUAL annotations are skipped. Annotations whose status would not
    /// change are left out of the transaction.
    pub fn review(&mut self, document: &mut Document, ids: &[String], action: ReviewAction, basis: ToggleBasis) -> Result<Transaction> {
        let mut positions = Vec::with_capacity(ids.len());
        for id in ids {
            let pos = document
                .position(id)
                .ok_or_else(|| TatError::UnknownAnnotation(id.clone()))?;
            if !document.annotations[pos].is_manual() && !positions.contains(&pos) {
                positions.push(pos);
            }
        }
        if positions.is_empty() {
            return Err(TatError::invalid_state("manual annotations cannot be reviewed"));
        }

        let group = match basis {
            ToggleBasis::Individual => None,
            ToggleBasis::Group => {
                let statuses: Vec<Status> = positions.iter().map(|p| document.annotations[*p].status).collect();
                group_status(&statuses)
            }
        };

        let seq = self.next_seq();
        let reviewed_at = now_iso();
        let mut tx = Transaction {
            seq,
            document_id: document.id.clone(),
            kind: TransactionKind::Review,
            changes: Vec::new(),
            payload: Vec::new(),
            snapshot: Vec::new(),
            focus_start: None,
        };

        for pos in positions {
            let ann = &mut document.annotations[pos];
            let to = action.apply_to(group.unwrap_or(ann.status));
            if to == ann.status {
                continue;
            }
            tx.snapshot.push(ann.clone());
            let from = ann.status;
            ann.status = to;
            ann.datetime_reviewed = Some(reviewed_at.clone());
            document.aggregations.shift(from, to, 1);

            tx.changes.push(StatusChange { id: ann.id.clone(), from: Some(from), to });
            tx.payload.push(ann.clone());
            self.written.insert(ann.id.clone(), seq);
        }

        tracing::debug!(seq, changed = tx.changes.len(), action = ?action, "optimistic review applied");
        self.pending.insert(seq, tx.changes.clone());
        Ok(tx)
    }

    /// Insert new MANUAL annotations optimistically.
    ///
    /// Ids are replaced with provisional ones; annotations are merged into
    /// the document sorted by start.
    pub fn add(&mut self, document: &mut Document, new: Vec<Annotation>, focus_start: Option<usize>) -> Result<Transaction> {
        for ann in &new {
            if document.overlaps_annotation(ann.start, ann.end) {
                return Err(TatError::invalid_input(format!(
                    "new annotation [{}, {}) overlaps an existing one",
                    ann.start, ann.end
                )));
            }
        }

        let seq = self.next_seq();
        let mut tx = Transaction {
            seq,
            document_id: document.id.clone(),
            kind: TransactionKind::Add,
            changes: Vec::new(),
            payload: Vec::new(),
            snapshot: Vec::new(),
            focus_start,
        };

        for mut ann in new {
            ann.id = format!("{}{}", PROVISIONAL_PREFIX, self.next_provisional);
            self.next_provisional += 1;
            ann.status = Status::Manual;

            tx.changes.push(StatusChange { id: ann.id.clone(), from: None, to: Status::Manual });
            self.written.insert(ann.id.clone(), seq);
            tx.payload.push(ann);
        }

        document.annotations.extend(tx.payload.iter().cloned());
        document.sort_annotations();
        document.aggregations.add(Status::Manual, tx.payload.len() as i64);

        tracing::debug!(seq, added = tx.payload.len(), "optimistic add applied");
        self.pending.insert(seq, tx.changes.clone());
        Ok(tx)
    }

    /// Replace optimistic entries with the server's answer
    pub fn reconcile(&mut self, document: &mut Document, tx: &Transaction, response: UpdateResponse) -> Reconciled {
        self.pending.remove(&tx.seq);
        let mut out = Reconciled::default();

        if document.id != tx.document_id {
            tracing::warn!(seq = tx.seq, document = tx.document_id.as_str(), "document changed, reconcile skipped");
            out.skipped = tx.ids();
            return out;
        }

        match tx.kind {
            TransactionKind::Review => self.reconcile_review(document, tx, response.annotations, &mut out),
            TransactionKind::Add => self.reconcile_add(document, tx, response.annotations, &mut out),
        }

        if let Some(aggregation) = response.aggregations {
            // Entity-type and other tallies are taken from the newest answer
            if tx.seq >= self.aggregation_confirmed {
                document.aggregations = aggregation;
                self.aggregation_confirmed = tx.seq;
                out.aggregation_applied = true;
            } else {
                tracing::debug!(seq = tx.seq, confirmed = self.aggregation_confirmed, "older aggregation ignored");
            }
            // Status buckets always follow the annotation array
            if document.aggregations.recount(&document.annotations) {
                tracing::debug!(seq = tx.seq, pending = self.pending.len(), "status tally recounted");
            }
        }

        document.sort_annotations();
        if !out.skipped.is_empty() {
            tracing::warn!(seq = tx.seq, skipped = ?out.skipped, "reconcile skipped annotations");
        }
        out
    }

    fn is_stale(&self, id: &str, seq: u64) -> bool {
        self.confirmed.get(id).is_some_and(|confirmed| *confirmed > seq)
    }

    fn reconcile_review(&mut self, document: &mut Document, tx: &Transaction, annotations: Vec<Annotation>, out: &mut Reconciled) {
        for server in annotations {
            if self.is_stale(&server.id, tx.seq) {
                out.skipped.push(server.id);
                continue;
            }
            let Some(pos) = document.position(&server.id) else {
                out.skipped.push(server.id);
                continue;
            };

            let local = &mut document.annotations[pos];
            // Counts follow the status so the tally stays consistent before
            // the server aggregation (if any) replaces it
            document.aggregations.shift(local.status, server.status, 1);
            self.confirmed.insert(server.id.clone(), tx.seq);
            out.applied.push(server.id.clone());
            *local = server;
        }
    }

    fn reconcile_add(&mut self, document: &mut Document, tx: &Transaction, annotations: Vec<Annotation>, out: &mut Reconciled) {
        let provisional: HashSet<&str> = tx.changes.iter().map(|c| c.id.as_str()).collect();
        let mut matched: HashSet<String> = HashSet::new();

        for server in annotations {
            if self.is_stale(&server.id, tx.seq) {
                out.skipped.push(server.id);
                continue;
            }
            let pos = document.annotations.iter().position(|a| {
                provisional.contains(a.id.as_str()) && !matched.contains(&a.id) && a.start == server.start
            });
            let Some(pos) = pos else {
                out.skipped.push(server.id);
                continue;
            };

            let local = &mut document.annotations[pos];
            document.aggregations.shift(local.status, server.status, 1);
            matched.insert(local.id.clone());
            out.renamed.push((local.id.clone(), server.id.clone()));
            self.confirmed.insert(server.id.clone(), tx.seq);
            out.applied.push(server.id.clone());
            *local = server;
        }

        // Provisional entries the server did not store
        let before = document.annotations.len();
        document
            .annotations
            .retain(|a| !(provisional.contains(a.id.as_str()) && !matched.contains(&a.id)));
        let dropped = (before - document.annotations.len()) as i64;
        if dropped > 0 {
            document.aggregations.add(Status::Manual, -dropped);
            tracing::warn!(seq = tx.seq, dropped, "server did not store some added annotations");
        }
    }

    /// Undo a failed transaction where nothing newer touched the same annotations.
    /// Returns the ids restored.
    pub fn rollback(&mut self, document: &mut Document, tx: &Transaction) -> Vec<String> {
        self.pending.remove(&tx.seq);
        if document.id != tx.document_id {
            return Vec::new();
        }

        let mut restored = Vec::new();
        for change in &tx.changes {
            if self.written.get(&change.id) != Some(&tx.seq) {
                continue;
            }
            let Some(pos) = document.position(&change.id) else {
                continue;
            };
            if document.annotations[pos].status != change.to {
                continue;
            }

            match change.from {
                Some(from) => {
                    let ann = &mut document.annotations[pos];
                    ann.status = from;
                    ann.datetime_reviewed = tx
                        .snapshot
                        .iter()
                        .find(|s| s.id == change.id)
                        .and_then(|s| s.datetime_reviewed.clone());
                    document.aggregations.shift(change.to, from, 1);
                }
                None => {
                    document.annotations.remove(pos);
                    document.aggregations.add(change.to, -1);
                }
            }
            self.written.remove(&change.id);
            restored.push(change.id.clone());
        }

        tracing::debug!(seq = tx.seq, restored = restored.len(), "transaction rolled back");
        restored
    }

    /// Give up on a failed transaction, keeping its optimistic state
    pub fn abandon(&mut self, tx: &Transaction) {
        self.pending.remove(&tx.seq);
        tracing::debug!(seq = tx.seq, "transaction abandoned");
    }
}
