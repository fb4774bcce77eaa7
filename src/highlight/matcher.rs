//! TextMatcher: Ctrl+F style search over document text
//!
//! Finds every whole-word, case-insensitive occurrence of a selected phrase,
//! drops occurrences that touch existing annotations, and attaches a bounded
//! snippet of surrounding text to each remaining hit.
//!
//! The query is escaped, so regex metacharacters match literally. Matches are
//! enumerated left to right without overlap; since the query is never empty
//! each hit advances the search position.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, SNIPPET_CLAMP};
use crate::error::{Result, TatError};
use crate::model::{Document, Match, OffsetMap, Snippet};

// =============================================================================
// Types
// =============================================================================

/// Output of a search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MatchResult {
    pub matches: Vec<Match>,
    /// At least one occurrence intersected an existing annotation
    pub found_overlap: bool,
    /// Match to emphasize (the one under the user's selection)
    pub active_index: usize,
    /// `active_index` as first computed; the UI scrolls back here on close
    pub initial_index: usize,
    /// The raw query as received
    pub query_text: String,
}

impl MatchResult {
    pub fn active(&self) -> Option<&Match> {
        self.matches.get(self.active_index)
    }
}

/// Document search engine
#[derive(Debug, Clone)]
pub struct TextMatcher {
    snippet_clamp: usize,
    whole_word: bool,
}

impl Default for TextMatcher {
    fn default() -> Self {
        Self {
            snippet_clamp: SNIPPET_CLAMP,
            whole_word: true,
        }
    }
}

// =============================================================================
// Implementation
// =============================================================================

impl TextMatcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            snippet_clamp: config.snippet_clamp,
            whole_word: config.whole_word,
        }
    }

    /// Find occurrences of `query_text` in `document`.
    ///
    /// # Arguments
    /// * `caret_offset` - UTF-16 start of the user's literal selection
    pub fn find_matches(&self, document: &Document, query_text: &str, caret_offset: usize) -> Result<MatchResult> {
        let mut result = MatchResult {
            query_text: query_text.to_string(),
            ..MatchResult::default()
        };

        let query = query_text.trim();
        if query.is_empty() {
            return Ok(result);
        }

        let escaped = regex::escape(query);
        let pattern = if self.whole_word {
            format!(r"\b{}\b", escaped)
        } else {
            escaped
        };
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| TatError::invalid_input(format!("query cannot be searched: {}", e)))?;

        let offsets = document.offsets();
        let mut active: Option<usize> = None;

        for m in re.find_iter(&document.text) {
            let start = offsets.to_utf16(m.start());
            let end = offsets.to_utf16(m.end());

            if document.overlaps_annotation(start, end) {
                result.found_overlap = true;
                continue;
            }

            if active.is_none() && start == caret_offset {
                active = Some(result.matches.len());
            }

            result.matches.push(Match {
                start,
                end,
                text: m.as_str().to_string(),
                snippet: self.snippet(&offsets, start, end, m.as_str()),
            });
        }

        result.active_index = active.unwrap_or(0);
        result.initial_index = result.active_index;

        tracing::debug!(
            query = query,
            matches = result.matches.len(),
            found_overlap = result.found_overlap,
            "text matcher finished"
        );

        Ok(result)
    }

    fn snippet(&self, offsets: &OffsetMap<'_>, start: usize, end: usize, matched: &str) -> Snippet {
        let len = offsets.utf16_len();
        let window_start = start.saturating_sub(self.snippet_clamp);
        let window_end = end.saturating_add(self.snippet_clamp).min(len);

        Snippet {
            start_text: offsets.slice(window_start, start).to_string(),
            truncate_start: start > self.snippet_clamp,
            end_text: offsets.slice(end, window_end).to_string(),
            truncate_end: end.saturating_add(self.snippet_clamp) < len,
            snippet: matched.to_string(),
        }
    }
}

/// Search with default settings
pub fn find_matches(document: &Document, query_text: &str, caret_offset: usize) -> Result<MatchResult> {
    TextMatcher::default().find_matches(document, query_text, caret_offset)
}

// =============================================================================
// Tests
// =============================================================================
