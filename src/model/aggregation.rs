//! Per-document annotation tallies
//!
//! `progress.status` / `progress.count` are parallel arrays as sent by the
//! backend. Every status change must move a count from one bucket to another
//! so that `sum(count) == annotations.len()` holds after each mutation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::annotation::{Annotation, Status};

/// Status tally (parallel arrays)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Progress {
    #[serde(default)]
    pub status: Vec<Status>,
    #[serde(default)]
    pub count: Vec<i64>,
}

/// Reviewed / reviewable counts for the progress meter
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ReviewProgress {
    pub reviewed: i64,
    pub reviewable: i64,
    /// Rounded to the nearest whole percent; 0 when nothing is reviewable
    pub percent: u32,
}

/// Annotation count for one entity type
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EntityTypeCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count_raw: u64,
}

/// Denormalized aggregation block of a document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Aggregation {
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub entity_types: Vec<EntityTypeCount>,
    /// Aggregations this crate does not interpret (kept for round-tripping)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Aggregation {
    /// Recompute the tally from an annotation list
    pub fn from_annotations(annotations: &[Annotation]) -> Self {
        let mut counts = [0i64; 4];
        let mut types: BTreeMap<&str, u64> = BTreeMap::new();
        for ann in annotations {
            counts[ann.status.rank()] += 1;
            *types.entry(ann.tag.as_str()).or_insert(0) += 1;
        }

        Self {
            progress: Progress {
                status: Status::ORDER.to_vec(),
                count: counts.to_vec(),
            },
            entity_types: types
                .into_iter()
                .map(|(kind, count_raw)| EntityTypeCount { kind: kind.to_string(), count_raw })
                .collect(),
            extra: serde_json::Map::new(),
        }
    }

    /// Count for a status (0 when the bucket is absent)
    pub fn count(&self, status: Status) -> i64 {
        self.progress
            .status
            .iter()
            .position(|s| *s == status)
            .and_then(|i| self.progress.count.get(i).copied())
            .unwrap_or(0)
    }

    /// Sum of all buckets
    pub fn total(&self) -> i64 {
        self.progress.count.iter().sum()
    }

    /// Mutable bucket, created when the backend did not report it
    fn bucket_mut(&mut self, status: Status) -> &mut i64 {
        let progress = &mut self.progress;
        // Keep the parallel arrays the same length even if the payload was ragged
        progress.count.resize(progress.status.len(), 0);
        let idx = match progress.status.iter().position(|s| *s == status) {
            Some(i) => i,
            None => {
                progress.status.push(status);
                progress.count.push(0);
                progress.status.len() - 1
            }
        };
        &mut progress.count[idx]
    }

    /// Add `n` (may be negative) to one bucket
    pub fn add(&mut self, status: Status, n: i64) {
        *self.bucket_mut(status) += n;
    }

    /// Move `n` annotations from one bucket to another
    pub fn shift(&mut self, from: Status, to: Status, n: i64) {
        if from == to || n == 0 {
            return;
        }
        self.add(from, -n);
        self.add(to, n);
    }

    /// Reset every bucket to the tally of `annotations`, keeping the
    /// backend's bucket order. Returns true when any count changed.
    pub fn recount(&mut self, annotations: &[Annotation]) -> bool {
        let tally = Self::from_annotations(annotations);
        let before = self.progress.clone();
        for status in Status::ORDER {
            let count = tally.count(status);
            if count != 0 || self.progress.status.contains(&status) {
                *self.bucket_mut(status) = count;
            }
        }
        self.progress != before
    }

    /// Share of reviewable annotations that have been reviewed. MANUAL
    /// annotations are not reviewable and are left out.
    pub fn review_progress(&self) -> ReviewProgress {
        let reviewable: i64 = self
            .progress
            .status
            .iter()
            .zip(self.progress.count.iter())
            .filter(|(s, _)| **s != Status::Manual)
            .map(|(_, c)| *c)
            .sum();
        let reviewed = reviewable - self.count(Status::NotReviewed);
        let percent = if reviewable > 0 {
            ((100 * reviewed) as f64 / reviewable as f64).round() as u32
        } else {
            0
        };
        ReviewProgress { reviewed, reviewable, percent }
    }

    /// `(status, count)` in canonical order
    pub fn ordered_progress(&self) -> Vec<(Status, i64)> {
        let mut out: Vec<(Status, i64)> = self
            .progress
            .status
            .iter()
            .zip(self.progress.count.iter())
            .map(|(s, c)| (*s, *c))
            .collect();
        out.sort_by_key(|(s, _)| s.rank());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(json: &str) -> Aggregation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_shift_moves_counts() {
        let mut a = agg(r#"{"progress": {"status": ["ACCEPTED", "NOT_REVIEWED"], "count": [0, 1]}}"#);
        a.shift(Status::NotReviewed, Status::Accepted, 1);

        assert_eq!(a.progress.count, vec![1, 0]);
        assert_eq!(a.total(), 1);
    }

    #[test]
    fn test_shift_creates_missing_bucket() {
        let mut a = agg(r#"{"progress": {"status": ["NOT_REVIEWED"], "count": [3]}}"#);
        a.shift(Status::NotReviewed, Status::Rejected, 2);

        assert_eq!(a.count(Status::Rejected), 2);
        assert_eq!(a.count(Status::NotReviewed), 1);
        assert_eq!(a.total(), 3);
    }

    #[test]
    fn test_unknown_aggregations_round_trip() {
        let a = agg(r#"{"progress": {"status": [], "count": []}, "entity_types": [], "confidence": {"x": 1}}"#);
        let back = serde_json::to_value(&a).unwrap();
        assert_eq!(back["confidence"]["x"], 1);
    }

    #[test]
    fn test_recount_keeps_bucket_order() {
        let mut a = agg(r#"{"progress": {"status": ["NOT_REVIEWED", "ACCEPTED"], "count": [5, 0]}}"#);
        let anns: Vec<Annotation> = serde_json::from_str(
            r#"[{"id": "a", "start": 0, "end": 1, "text": "x", "status": "ACCEPTED"},
                {"id": "b", "start": 2, "end": 3, "text": "y", "status": "REJECTED"}]"#,
        )
        .unwrap();

        assert!(a.recount(&anns));
        assert_eq!(a.progress.status, vec![Status::NotReviewed, Status::Accepted, Status::Rejected]);
        assert_eq!(a.progress.count, vec![0, 1, 1]);
        assert!(!a.recount(&anns));
    }

    #[test]
    fn test_review_progress_excludes_manual() {
        let a = agg(r#"{"progress": {"status": ["ACCEPTED", "REJECTED", "NOT_REVIEWED", "MANUAL"], "count": [2, 1, 3, 4]}}"#);
        let progress = a.review_progress();

        assert_eq!(progress.reviewable, 6);
        assert_eq!(progress.reviewed, 3);
        assert_eq!(progress.percent, 50);
    }

    #[test]
    fn test_review_progress_rounds() {
        let a = agg(r#"{"progress": {"status": ["ACCEPTED", "NOT_REVIEWED"], "count": [2, 1]}}"#);
        assert_eq!(a.review_progress().percent, 67);
    }

    #[test]
    fn test_review_progress_nothing_reviewable() {
        assert_eq!(Aggregation::default().review_progress(), ReviewProgress::default());

        let manual_only = agg(r#"{"progress": {"status": ["MANUAL"], "count": [3]}}"#);
        let progress = manual_only.review_progress();
        assert_eq!(progress.reviewable, 0);
        assert_eq!(progress.percent, 0);
    }

    #[test]
    fn test_ordered_progress() {
        let a = agg(r#"{"progress": {"status": ["MANUAL", "NOT_REVIEWED", "ACCEPTED"], "count": [1, 2, 3]}}"#);
        let ordered = a.ordered_progress();
        assert_eq!(ordered[0], (Status::Accepted, 3));
        assert_eq!(ordered[2], (Status::Manual, 1));
    }
}
