//! Engine configuration
//!
//! Parsed from a JS object at the WASM boundary; every field is optional.

use serde::{Deserialize, Serialize};

/// Characters of context kept on each side of a match snippet.
pub const SNIPPET_CLAMP: usize = 25;

/// Configuration for the review engine
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Context window (UTF-16 units) on each side of a match. Default: 25
    #[serde(default = "default_snippet_clamp")]
    pub snippet_clamp: usize,
    /// Anchor queries on word boundaries ("virus" skips "coronavirus"). Default: true
    #[serde(default = "default_true")]
    pub whole_word: bool,
    /// Hold a second update for an annotation until the first one settles. Default: true
    #[serde(default = "default_true")]
    pub serialize_updates: bool,
    /// Restore pre-update state when the backend call fails. Default: false
    #[serde(default)]
    pub rollback_on_failure: bool,
}

fn default_true() -> bool { true }

fn default_snippet_clamp() -> usize { SNIPPET_CLAMP }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snippet_clamp: SNIPPET_CLAMP,
            whole_word: true,
            serialize_updates: true,
            rollback_on_failure: false,
        }
    }
}

impl EngineConfig {
    /// Same as default but reverts optimistic state on failed updates
    pub fn with_rollback() -> Self {
        Self {
            rollback_on_failure: true,
            ..Self::default()
        }
    }
}
