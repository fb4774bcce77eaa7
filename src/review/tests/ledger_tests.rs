//! Contract tests for optimistic review/add and reconciliation

use proptest::prelude::*;

use super::{ann, assert_consistent, fixture, ids, status_of};
use crate::error::TatError;
use crate::model::{Aggregation, Annotation, Document, ReviewAction, Status};
use crate::review::ledger::{ReviewLedger, ToggleBasis, Transaction, TransactionKind, UpdateResponse, PROVISIONAL_PREFIX};

fn accept(ledger: &mut ReviewLedger, doc: &mut Document, id: &str) -> Transaction {
    ledger
        .review(doc, &[id.to_string()], ReviewAction::Accept, ToggleBasis::Individual)
        .unwrap()
}

/// Server echo: stores what it was sent
fn echo(payload: &[Annotation]) -> UpdateResponse {
    UpdateResponse {
        annotations: payload.to_vec(),
        aggregations: None,
    }
}

// ============================================================================
// Status transitions
// ============================================================================

#[test]
fn test_accept_moves_aggregation_bucket() {
    let json = r#"{
        "id": 1,
        "text": "Frodo Bags went home",
        "annotations": [{"id": "a", "start": 0, "end": 10, "text": "Frodo Bags", "status": "NOT_REVIEWED"}],
        "aggregations": {"progress": {"status": ["ACCEPTED", "NOT_REVIEWED"], "count": [0, 1]}}
    }"#;
    let mut doc: Document = serde_json::from_str(json).unwrap();
    let mut ledger = ReviewLedger::new();

    accept(&mut ledger, &mut doc, "a");

    assert_eq!(doc.aggregations.progress.status, vec![Status::Accepted, Status::NotReviewed]);
    assert_eq!(doc.aggregations.progress.count, vec![1, 0]);
    assert_eq!(status_of(&doc, "a"), Status::Accepted);
}

#[test]
fn test_accept_twice_unreviews() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();

    let first = accept(&mut ledger, &mut doc, "v1");
    let second = accept(&mut ledger, &mut doc, "v1");

    assert_eq!(status_of(&doc, "v1"), Status::NotReviewed);
    assert_eq!(first.changes[0].to, Status::Accepted);
    assert_eq!(second.changes[0].from, Some(Status::Accepted));
    assert_eq!(doc.aggregations.count(Status::Accepted), 1);
    assert_consistent(&doc);
}

#[test]
fn test_review_progress_follows_reviews() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    // m1 is MANUAL and never counts
    assert_eq!(doc.aggregations.review_progress().reviewable, 5);
    assert_eq!(doc.aggregations.review_progress().percent, 20);

    accept(&mut ledger, &mut doc, "v1");
    ledger
        .review(&mut doc, &ids(&["e1"]), ReviewAction::Reject, ToggleBasis::Individual)
        .unwrap();

    let progress = doc.aggregations.review_progress();
    assert_eq!((progress.reviewed, progress.reviewable, progress.percent), (3, 5, 60));
}

#[test]
fn test_review_stamps_datetime() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = ledger
        .review(&mut doc, &ids(&["e1"]), ReviewAction::Reject, ToggleBasis::Individual)
        .unwrap();

    let stamp = doc.annotation("e1").unwrap().datetime_reviewed.clone().unwrap();
    // 2021-06-01T12:00:00.000
    assert_eq!(stamp.len(), 23);
    assert!(!stamp.ends_with('Z'));
    assert_eq!(tx.payload[0].status, Status::Rejected);
    assert_eq!(tx.kind, TransactionKind::Review);
}

#[test]
fn test_group_toggle_uses_collective_status() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let group = ids(&["e1", "e2", "e3"]);

    // Mixed group counts as NOT_REVIEWED: everything becomes ACCEPTED
    let tx = ledger.review(&mut doc, &group, ReviewAction::Accept, ToggleBasis::Group).unwrap();
    assert_eq!(tx.ids(), ids(&["e1", "e3"]));
    assert!(group.iter().all(|id| status_of(&doc, id) == Status::Accepted));

    // Now all accepted: pressing again un-reviews the whole group
    ledger.review(&mut doc, &group, ReviewAction::Accept, ToggleBasis::Group).unwrap();
    assert!(group.iter().all(|id| status_of(&doc, id) == Status::NotReviewed));
    assert_consistent(&doc);
}

#[test]
fn test_manual_annotations_skipped() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();

    let err = ledger
        .review(&mut doc, &ids(&["m1"]), ReviewAction::Accept, ToggleBasis::Individual)
        .unwrap_err();
    assert!(matches!(err, TatError::InvalidState(_)));

    let tx = ledger
        .review(&mut doc, &ids(&["m1", "v1"]), ReviewAction::Accept, ToggleBasis::Individual)
        .unwrap();
    assert_eq!(tx.ids(), ids(&["v1"]));
    assert_eq!(status_of(&doc, "m1"), Status::Manual);
}

#[test]
fn test_unknown_id_changes_nothing() {
    let mut doc = fixture();
    let before = doc.clone();
    let mut ledger = ReviewLedger::new();

    let err = ledger
        .review(&mut doc, &ids(&["v1", "ghost"]), ReviewAction::Accept, ToggleBasis::Individual)
        .unwrap_err();
    assert!(matches!(err, TatError::UnknownAnnotation(id) if id == "ghost"));
    assert_eq!(doc, before);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn test_reconcile_adopts_server_values() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = accept(&mut ledger, &mut doc, "v1");
    assert!(ledger.is_in_flight("v1"));

    let mut stored = tx.payload[0].clone();
    stored.datetime_modified = Some("2021-06-01T12:00:00.000".to_string());
    let mut server_doc = doc.clone();
    server_doc.annotations[0] = stored.clone();
    let response = UpdateResponse {
        annotations: vec![stored],
        aggregations: Some(Aggregation::from_annotations(&server_doc.annotations)),
    };

    let out = ledger.reconcile(&mut doc, &tx, response);
    assert_eq!(out.applied, ids(&["v1"]));
    assert!(out.aggregation_applied);
    assert!(!ledger.is_in_flight("v1"));
    assert!(doc.annotation("v1").unwrap().datetime_modified.is_some());
    assert_consistent(&doc);
}

#[test]
fn test_server_status_wins_over_optimistic() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = accept(&mut ledger, &mut doc, "v1");

    // Backend refused the change
    let mut refused = tx.payload[0].clone();
    refused.status = Status::NotReviewed;
    ledger.reconcile(&mut doc, &tx, UpdateResponse { annotations: vec![refused], aggregations: None });

    assert_eq!(status_of(&doc, "v1"), Status::NotReviewed);
    assert_consistent(&doc);
}

#[test]
fn test_stale_reconcile_skipped() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let older = accept(&mut ledger, &mut doc, "v1");
    let newer = ledger
        .review(&mut doc, &ids(&["v1"]), ReviewAction::Reject, ToggleBasis::Individual)
        .unwrap();

    // Answers arrive out of order
    let out_newer = ledger.reconcile(&mut doc, &newer, echo(&newer.payload));
    let out_older = ledger.reconcile(&mut doc, &older, echo(&older.payload));

    assert_eq!(out_newer.applied, ids(&["v1"]));
    assert_eq!(out_older.skipped, ids(&["v1"]));
    assert_eq!(status_of(&doc, "v1"), Status::Rejected);
    assert_consistent(&doc);
}

#[test]
fn test_reconcile_ignores_other_document() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = accept(&mut ledger, &mut doc, "v1");

    let mut other = Document::new("doc-2", super::TEXT, vec![ann("v1", 4, "virus", Status::NotReviewed, "C1")]);
    let out = ledger.reconcile(&mut other, &tx, echo(&tx.payload));

    assert_eq!(out.skipped, ids(&["v1"]));
    assert_eq!(status_of(&other, "v1"), Status::NotReviewed);
}

#[test]
fn test_reconcile_skips_deleted_annotation() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = accept(&mut ledger, &mut doc, "v1");

    doc.annotations.retain(|a| a.id != "v1");
    doc.aggregations = Aggregation::from_annotations(&doc.annotations);
    let out = ledger.reconcile(&mut doc, &tx, echo(&tx.payload));

    assert_eq!(out.skipped, ids(&["v1"]));
    assert!(doc.annotation("v1").is_none());
    assert_consistent(&doc);
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn test_rollback_restores_status_and_counts() {
    let mut doc = fixture();
    let before = doc.clone();
    let mut ledger = ReviewLedger::new();
    let tx = ledger
        .review(&mut doc, &ids(&["e1", "e2", "e3"]), ReviewAction::Reject, ToggleBasis::Group)
        .unwrap();

    let restored = ledger.rollback(&mut doc, &tx);

    assert_eq!(restored.len(), 3);
    assert_eq!(doc.annotations, before.annotations);
    assert_eq!(doc.aggregations.count(Status::Rejected), 0);
    assert_consistent(&doc);
}

#[test]
fn test_rollback_of_superseded_write_keeps_newer_state() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let first = accept(&mut ledger, &mut doc, "v1");
    let _second = ledger
        .review(&mut doc, &ids(&["v1"]), ReviewAction::Reject, ToggleBasis::Individual)
        .unwrap();

    assert!(ledger.rollback(&mut doc, &first).is_empty());
    assert_eq!(status_of(&doc, "v1"), Status::Rejected);
    assert_consistent(&doc);
}

#[test]
fn test_abandon_keeps_optimistic_state() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = accept(&mut ledger, &mut doc, "v2");

    ledger.abandon(&tx);
    assert_eq!(status_of(&doc, "v2"), Status::Accepted);
    assert_eq!(ledger.pending_count(), 0);
    assert_consistent(&doc);
}

// ============================================================================
// Adding
// ============================================================================

fn lung(start: usize, text: &str) -> Annotation {
    let mut a = ann("", start, text, Status::Manual, "C0024109");
    a.entity_p = 0.0;
    a
}

#[test]
fn test_add_inserts_provisional_annotations() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = ledger.add(&mut doc, vec![lung(91, "Lungs"), lung(43, "lungs")], Some(43)).unwrap();

    assert_eq!(tx.kind, TransactionKind::Add);
    assert!(tx.payload.iter().all(|a| a.id.starts_with(PROVISIONAL_PREFIX)));
    assert_eq!(tx.payload[0].id, "annotation-preflight-0");
    let starts: Vec<usize> = doc.annotations.iter().map(|a| a.start).collect();
    assert_eq!(starts, vec![4, 16, 22, 43, 54, 69, 74, 91]);
    assert_eq!(doc.aggregations.count(Status::Manual), 3);
    assert_consistent(&doc);
}

#[test]
fn test_add_rejects_overlap() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    assert!(ledger.add(&mut doc, vec![lung(4, "virus")], None).is_err());
    assert_eq!(doc.annotations.len(), 6);
}

#[test]
fn test_add_reconcile_renames_and_drops_unstored() {
    let mut doc = fixture();
    let mut ledger = ReviewLedger::new();
    let tx = ledger.add(&mut doc, vec![lung(43, "lungs"), lung(91, "Lungs")], Some(43)).unwrap();

    let mut stored = tx.payload[0].clone();
    stored.id = "srv-1".to_string();
    let out = ledger.reconcile(&mut doc, &tx, UpdateResponse { annotations: vec![stored], aggregations: None });

    assert_eq!(out.renamed, vec![("annotation-preflight-0".to_string(), "srv-1".to_string())]);
    assert!(doc.annotation("srv-1").is_some());
    assert!(doc.annotations.iter().all(|a| !a.id.starts_with(PROVISIONAL_PREFIX)));
    assert_eq!(doc.aggregations.count(Status::Manual), 2);
    assert_consistent(&doc);
}

#[test]
fn test_add_rollback_removes_provisional() {
    let mut doc = fixture();
    let before = doc.clone();
    let mut ledger = ReviewLedger::new();
    let tx = ledger.add(&mut doc, vec![lung(43, "lungs")], None).unwrap();

    ledger.rollback(&mut doc, &tx);
    assert_eq!(doc.annotations, before.annotations);
    assert_eq!(doc.aggregations.count(Status::Manual), 1);
}

// ============================================================================
// Aggregation invariant
// ============================================================================

/// Backend double that stores writes and counts its own statuses
struct Server {
    document: Document,
}

impl Server {
    fn handle(&mut self, tx: &Transaction) -> UpdateResponse {
        for incoming in &tx.payload {
            if let Some(pos) = self.document.position(&incoming.id) {
                self.document.annotations[pos] = incoming.clone();
            }
        }
        UpdateResponse {
            annotations: tx.payload.clone(),
            aggregations: Some(Aggregation::from_annotations(&self.document.annotations)),
        }
    }
}

#[test]
fn test_out_of_order_server_keeps_tally() {
    let mut doc = fixture();
    let mut server = Server { document: doc.clone() };
    let mut ledger = ReviewLedger::new();

    let first = accept(&mut ledger, &mut doc, "v1");
    let second = ledger
        .review(&mut doc, &ids(&["e1"]), ReviewAction::Reject, ToggleBasis::Individual)
        .unwrap();

    // Server handles the second request before the first
    let second_answer = server.handle(&second);
    let first_answer = server.handle(&first);

    ledger.reconcile(&mut doc, &second, second_answer);
    assert_consistent(&doc);
    ledger.reconcile(&mut doc, &first, first_answer);
    assert_consistent(&doc);

    assert_eq!(doc.aggregations.count(Status::Accepted), 2);
    assert_eq!(doc.aggregations.count(Status::Rejected), 1);
    let on_server = Aggregation::from_annotations(&server.document.annotations);
    for status in Status::ORDER {
        assert_eq!(doc.aggregations.count(status), on_server.count(status));
    }
}

#[derive(Debug, Clone)]
enum Step {
    Review { target: usize, accept: bool, group: bool },
    /// The server handles one request it has not seen yet
    Process { pick: usize },
    /// The answer to one handled request arrives
    Deliver { pick: usize, with_aggregation: bool },
    /// A request the server never handled fails
    Fail { pick: usize, rollback: bool },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0usize..6, any::<bool>(), any::<bool>()).prop_map(|(target, accept, group)| Step::Review { target, accept, group }),
        any::<usize>().prop_map(|pick| Step::Process { pick }),
        (any::<usize>(), any::<bool>()).prop_map(|(pick, with_aggregation)| Step::Deliver { pick, with_aggregation }),
        (any::<usize>(), any::<bool>()).prop_map(|(pick, rollback)| Step::Fail { pick, rollback }),
    ]
}

proptest! {
    #[test]
    fn aggregation_tracks_statuses(steps in proptest::collection::vec(step(), 1..60)) {
        let mut doc = fixture();
        let mut server = Server { document: doc.clone() };
        let mut ledger = ReviewLedger::new();
        let mut sent: Vec<Transaction> = Vec::new();
        let mut handled: Vec<(Transaction, UpdateResponse)> = Vec::new();
        let groups = [ids(&["v1", "v2"]), ids(&["e1", "e2", "e3"])];
        let all: Vec<String> = doc.annotations.iter().map(|a| a.id.clone()).collect();

        for step in steps {
            match step {
                Step::Review { target, accept, group } => {
                    let action = if accept { ReviewAction::Accept } else { ReviewAction::Reject };
                    let (targets, basis) = if group {
                        (groups[target % 2].clone(), ToggleBasis::Group)
                    } else {
                        (vec![all[target].clone()], ToggleBasis::Individual)
                    };
                    if let Ok(tx) = ledger.review(&mut doc, &targets, action, basis) {
                        sent.push(tx);
                    }
                }
                Step::Process { pick } => {
                    if sent.is_empty() {
                        continue;
                    }
                    let tx = sent.remove(pick % sent.len());
                    let answer = server.handle(&tx);
                    handled.push((tx, answer));
                }
                Step::Deliver { pick, with_aggregation } => {
                    if handled.is_empty() {
                        continue;
                    }
                    let (tx, mut answer) = handled.remove(pick % handled.len());
                    if !with_aggregation {
                        answer.aggregations = None;
                    }
                    ledger.reconcile(&mut doc, &tx, answer);
                }
                Step::Fail { pick, rollback } => {
                    if sent.is_empty() {
                        continue;
                    }
                    let tx = sent.remove(pick % sent.len());
                    if rollback {
                        ledger.rollback(&mut doc, &tx);
                    } else {
                        ledger.abandon(&tx);
                    }
                }
            }

            prop_assert_eq!(doc.aggregations.total(), doc.annotations.len() as i64);
            let expected = Aggregation::from_annotations(&doc.annotations);
            for status in Status::ORDER {
                prop_assert_eq!(doc.aggregations.count(status), expected.count(status));
            }
        }
    }
}
