//! Error types for TatCore.
//!
//! Three kinds matter to the UI: network failures (transient notification),
//! stale/conflicting updates, and validation failures (inline, no request issued).

use thiserror::Error;

/// Result type for TatCore operations.
pub type Result<T> = std::result::Result<T, TatError>;

/// Notification text shown for any failed backend call.
pub const REQUEST_FAILED_MESSAGE: &str = "There was an error with your request. Please try again.";

/// Error type for TatCore operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TatError {
    /// Fetch failed, timed out, or the backend answered with an error payload.
    #[error("Network failure: {0}")]
    Network(String),

    /// Server state diverged from what the optimistic update assumed.
    #[error("Stale update for annotation {id}: {reason}")]
    Stale { id: String, reason: String },

    /// Local validation blocked the request before it was issued.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Malformed input (bad spans, unknown filter values, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referenced annotation is not part of the loaded document.
    #[error("Unknown annotation: {0}")]
    UnknownAnnotation(String),

    /// Transition not allowed from the current review state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inline validation failures raised while composing new annotations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Select a concept to link before adding annotations")]
    MissingConcept,

    #[error("Select at least one mention to add")]
    NoCandidates,

    #[error("Selection overlaps an existing annotation")]
    SelectionOverlap,
}

impl TatError {
    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        TatError::Network(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        TatError::InvalidInput(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        TatError::InvalidState(msg.into())
    }

    /// Stable machine-readable kind, used by the WASM boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            TatError::Network(_) => "network",
            TatError::Stale { .. } => "stale",
            TatError::Validation(_) => "validation",
            TatError::InvalidInput(_) => "invalid_input",
            TatError::UnknownAnnotation(_) => "unknown_annotation",
            TatError::InvalidState(_) => "invalid_state",
            TatError::Serialization(_) => "serialization",
        }
    }

    /// Text for the transient user notification.
    pub fn user_message(&self) -> String {
        match self {
            TatError::Validation(v) => v.to_string(),
            TatError::Network(_) | TatError::Stale { .. } | TatError::Serialization(_) => {
                REQUEST_FAILED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}
