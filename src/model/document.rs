//! Document: text + annotations + aggregations

use serde::{Deserialize, Serialize};

use super::aggregation::Aggregation;
use super::annotation::{de_id, Annotation, Span};
use super::offsets::OffsetMap;
use crate::error::{Result, TatError};

/// A loaded document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Document {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub aggregations: Aggregation,
    /// Metadata this crate does not interpret (filename, owner, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, annotations: Vec<Annotation>) -> Self {
        let aggregations = Aggregation::from_annotations(&annotations);
        Self {
            id: id.into(),
            text: text.into(),
            annotations,
            aggregations,
            extra: serde_json::Map::new(),
        }
    }

    pub fn offsets(&self) -> OffsetMap<'_> {
        OffsetMap::new(&self.text)
    }

    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.annotations.iter().position(|a| a.id == id)
    }

    /// True when `[start, end)` intersects any annotation
    pub fn overlaps_annotation(&self, start: usize, end: usize) -> bool {
        self.annotations.iter().any(|a| a.overlaps(start, end))
    }

    /// Ids of every annotation sharing `id`'s canonical concept (itself included).
    /// Empty when the group is all MANUAL or the annotation has no concept.
    pub fn linked_ids(&self, id: &str) -> Vec<String> {
        let Some(anchor) = self.annotation(id) else {
            return Vec::new();
        };
        let mut linked: Vec<&Annotation> = self
            .annotations
            .iter()
            .filter(|a| a.is_linked_to(anchor))
            .collect();
        if linked.iter().all(|a| a.is_manual()) {
            return Vec::new();
        }
        linked.sort_by_key(|a| a.start);
        linked.into_iter().map(|a| a.id.clone()).collect()
    }

    /// Keep annotations ordered by start (stable)
    pub fn sort_annotations(&mut self) {
        self.annotations.sort_by_key(|a| a.start);
    }

    /// Check span invariants: in bounds, `text` matches the document slice,
    /// pairwise non-overlapping. Reports the first violation.
    pub fn check_spans(&self) -> Result<()> {
        let offsets = self.offsets();
        let len = offsets.utf16_len();
        let mut sorted: Vec<&Annotation> = self.annotations.iter().collect();
        sorted.sort_by_key(|a| a.start);

        let mut prev: Option<&Annotation> = None;
        for ann in sorted {
            if ann.start >= ann.end || ann.end > len {
                return Err(TatError::invalid_input(format!(
                    "annotation {} has span [{}, {}) outside text of length {}",
                    ann.id, ann.start, ann.end, len
                )));
            }
            if offsets.slice(ann.start, ann.end) != ann.text {
                return Err(TatError::invalid_input(format!(
                    "annotation {} text does not match document at [{}, {})",
                    ann.id, ann.start, ann.end
                )));
            }
            if let Some(p) = prev {
                if p.end > ann.start {
                    return Err(TatError::invalid_input(format!(
                        "annotations {} and {} overlap",
                        p.id, ann.id
                    )));
                }
            }
            prev = Some(ann);
        }
        Ok(())
    }
}
