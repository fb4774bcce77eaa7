//! Annotation, Match and status vocabulary
//!
//! Field names follow the backend's snake_case JSON. Offsets are UTF-16
//! code units into the owning document's text.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TatError;

// =============================================================================
// Status
// =============================================================================

/// Review status of an annotation
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Accepted,
    Rejected,
    #[default]
    NotReviewed,
    /// User-created; excluded from batch review
    Manual,
}

impl Status {
    /// Canonical progress ordering (the backend does not sort its buckets)
    pub const ORDER: [Status; 4] = [
        Status::Accepted,
        Status::Rejected,
        Status::NotReviewed,
        Status::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Accepted => "ACCEPTED",
            Status::Rejected => "REJECTED",
            Status::NotReviewed => "NOT_REVIEWED",
            Status::Manual => "MANUAL",
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Status::Accepted => "Accepted",
            Status::Rejected => "Rejected",
            Status::NotReviewed => "To Review",
            Status::Manual => "Added",
        }
    }

    /// Position in `Status::ORDER`
    pub fn rank(&self) -> usize {
        match self {
            Status::Accepted => 0,
            Status::Rejected => 1,
            Status::NotReviewed => 2,
            Status::Manual => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = TatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPTED" => Ok(Status::Accepted),
            "REJECTED" => Ok(Status::Rejected),
            "NOT_REVIEWED" => Ok(Status::NotReviewed),
            "MANUAL" => Ok(Status::Manual),
            other => Err(TatError::invalid_input(format!("unknown status '{}'", other))),
        }
    }
}

/// A review button press
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAction {
    #[serde(alias = "ACCEPTED")]
    Accept,
    #[serde(alias = "REJECTED")]
    Reject,
}

impl ReviewAction {
    /// Status the press moves toward
    pub fn target(&self) -> Status {
        match self {
            ReviewAction::Accept => Status::Accepted,
            ReviewAction::Reject => Status::Rejected,
        }
    }

    /// Toggle rule: pressing the current status un-reviews
    pub fn apply_to(&self, current: Status) -> Status {
        if current == self.target() {
            Status::NotReviewed
        } else {
            self.target()
        }
    }
}

impl FromStr for ReviewAction {
    type Err = TatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACCEPT" | "ACCEPTED" => Ok(ReviewAction::Accept),
            "REJECT" | "REJECTED" => Ok(ReviewAction::Reject),
            other => Err(TatError::invalid_input(format!("unknown review action '{}'", other))),
        }
    }
}

// =============================================================================
// Confidence categories
// =============================================================================

/// Model confidence bucket derived from `entity_p`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreCategory {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
}

impl ScoreCategory {
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.99 {
            ScoreCategory::VeryHigh
        } else if p >= 0.90 {
            ScoreCategory::High
        } else if p >= 0.70 {
            ScoreCategory::Moderate
        } else if p >= 0.50 {
            ScoreCategory::Low
        } else {
            ScoreCategory::VeryLow
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreCategory::VeryHigh => "Very High",
            ScoreCategory::High => "High",
            ScoreCategory::Moderate => "Moderate",
            ScoreCategory::Low => "Low",
            ScoreCategory::VeryLow => "Very Low",
        }
    }

    /// Inclusive `entity_p` range used by confidence filters
    pub fn range(&self) -> (f64, f64) {
        match self {
            ScoreCategory::VeryHigh => (0.99, 1.0),
            ScoreCategory::High => (0.90, 0.98),
            ScoreCategory::Moderate => (0.70, 0.89),
            ScoreCategory::Low => (0.50, 0.69),
            ScoreCategory::VeryLow => (0.0, 0.49),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreCategory::VeryHigh => "VERY_HIGH",
            ScoreCategory::High => "HIGH",
            ScoreCategory::Moderate => "MODERATE",
            ScoreCategory::Low => "LOW",
            ScoreCategory::VeryLow => "VERY_LOW",
        }
    }
}

// =============================================================================
// Ids
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => s,
            RawId::Int(n) => n.to_string(),
        }
    }
}

/// Accept string or integer ids, normalise to String
pub(crate) fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

pub(crate) fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(String::from))
}

// =============================================================================
// Spans
// =============================================================================

/// Anything occupying a `[start, end)` range of document text
pub trait Span {
    fn start(&self) -> usize;
    fn end(&self) -> usize;

    /// Half-open intersection test
    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start() < end && start < self.end()
    }
}

/// A persisted, reviewable span
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Annotation {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub canonical_id: Option<String>,
    #[serde(default)]
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub entity_p: f64,
    #[serde(default)]
    pub datetime_modified: Option<String>,
    #[serde(default)]
    pub datetime_reviewed: Option<String>,
}

/// Tag for annotations the linker could not type
pub const UNASSIGNED_TAG: &str = "unassigned";

fn default_tag() -> String {
    UNASSIGNED_TAG.to_string()
}

impl Annotation {
    pub fn score_category(&self) -> ScoreCategory {
        ScoreCategory::from_probability(self.entity_p)
    }

    pub fn is_manual(&self) -> bool {
        self.status == Status::Manual
    }

    /// Two annotations are linked when they share a canonical concept
    pub fn is_linked_to(&self, other: &Annotation) -> bool {
        matches!((&self.canonical_id, &other.canonical_id), (Some(a), Some(b)) if a == b)
    }
}

impl Span for Annotation {
    fn start(&self) -> usize { self.start }
    fn end(&self) -> usize { self.end }
}

/// Context window around a match
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Snippet {
    pub start_text: String,
    /// True when text exists before `start_text` (window clipped by the clamp)
    pub truncate_start: bool,
    pub end_text: String,
    pub truncate_end: bool,
    /// Matched text, original case
    pub snippet: String,
}

/// A transient free-text search hit
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub snippet: Snippet,
}

impl Span for Match {
    fn start(&self) -> usize { self.start }
    fn end(&self) -> usize { self.end }
}
