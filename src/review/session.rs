//! ReviewSession: the right-sidebar state machine
//!
//! Holds what the user is looking at (active annotation, linked group, add
//! mode candidates) but never the document itself. Every transition takes
//! the current `Document` by reference, so the session can be persisted and
//! restored independently through `to_json` / `from_json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, TatError, ValidationError};
use crate::highlight::{MatchResult, TextMatcher};
use crate::model::annotation::de_id;
use crate::model::{Document, Match, Status, UNASSIGNED_TAG};

// =============================================================================
// Modes and states
// =============================================================================

/// Sidebar mode
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[default]
    None,
    Add,
    Review,
}

/// Derived state of the review state machine
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Idle,
    AnnotationSelected,
    BatchReview,
    AddPending,
}

// =============================================================================
// Concept linker
// =============================================================================

/// One concept-linker result
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConceptSuggestion {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// `lookupConcept` response body
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct LinkerResponse {
    #[serde(default)]
    pub results: Vec<ConceptSuggestion>,
}

// =============================================================================
// Add mode
// =============================================================================

/// Candidate mentions for a free-text selection
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AddModeState {
    /// Selection touches an existing annotation; the Add button is disabled
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub query: Option<MatchResult>,
    #[serde(default)]
    pub loading_linker: bool,
    #[serde(default)]
    pub linker: Option<Vec<ConceptSuggestion>>,
    /// Indices into `query.matches` checked for adding
    #[serde(default)]
    pub selected: BTreeSet<usize>,
}

impl AddModeState {
    fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    fn with_query(query: MatchResult) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }

    /// First linker result, once the lookup finished
    pub fn suggestion(&self) -> Option<&ConceptSuggestion> {
        if self.loading_linker {
            return None;
        }
        self.linker.as_ref().and_then(|results| results.first())
    }

    /// Tag for annotations created from this state
    pub fn suggested_tag(&self) -> String {
        self.suggestion()
            .and_then(|s| s.kind.clone())
            .unwrap_or_else(|| UNASSIGNED_TAG.to_string())
    }

    pub fn matches(&self) -> &[Match] {
        self.query.as_ref().map(|q| q.matches.as_slice()).unwrap_or(&[])
    }

    /// Checked mentions, in document order
    pub fn candidates(&self) -> Vec<&Match> {
        let matches = self.matches();
        self.selected.iter().filter_map(|i| matches.get(*i)).collect()
    }

    /// The mention the user selected to start add mode
    pub fn active_match(&self) -> Option<&Match> {
        self.query.as_ref().and_then(|q| q.active())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Review state for one open document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ReviewSession {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub active_annotation_id: Option<String>,
    #[serde(default)]
    pub mode: Mode,
    /// Annotations sharing the active annotation's concept, sorted by start
    #[serde(default)]
    pub linked_annotation_ids: Vec<String>,
    #[serde(default)]
    pub add_state: Option<AddModeState>,
}

impl ReviewSession {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            ..Self::default()
        }
    }

    pub fn state(&self) -> ReviewState {
        match self.mode {
            Mode::Add => ReviewState::AddPending,
            Mode::Review => ReviewState::BatchReview,
            Mode::None if self.active_annotation_id.is_some() => ReviewState::AnnotationSelected,
            Mode::None => ReviewState::Idle,
        }
    }

    /// Click on an annotation span
    pub fn select_annotation(&mut self, document: &Document, id: &str) -> Result<ReviewState> {
        if self.mode == Mode::Add {
            return Err(TatError::invalid_state("cannot select annotations while adding"));
        }
        if document.annotation(id).is_none() {
            return Err(TatError::UnknownAnnotation(id.to_string()));
        }

        if self.mode != Mode::Review && self.active_annotation_id.as_deref() == Some(id) {
            self.active_annotation_id = None;
            self.linked_annotation_ids.clear();
            tracing::debug!(id, "annotation deselected");
            return Ok(self.state());
        }

        // Clicking outside the batch group leaves batch review
        if self.mode == Mode::Review && !self.linked_annotation_ids.iter().any(|l| l == id) {
            self.mode = Mode::None;
        }

        self.active_annotation_id = Some(id.to_string());
        self.linked_annotation_ids = document.linked_ids(id);
        self.add_state = None;
        tracing::debug!(id, linked = self.linked_annotation_ids.len(), "annotation selected");
        Ok(self.state())
    }

    pub fn start_batch_review(&mut self, document: &Document) -> Result<()> {
        let Some(active) = self.active_annotation_id.clone() else {
            return Err(TatError::invalid_state("batch review needs an active annotation"));
        };
        let linked = document.linked_ids(&active);
        if linked.len() < 2 {
            return Err(TatError::invalid_state("batch review needs more than one linked annotation"));
        }
        self.linked_annotation_ids = linked;
        self.mode = Mode::Review;
        self.add_state = None;
        Ok(())
    }

    /// Leave batch review, keeping the active annotation
    pub fn close_batch_review(&mut self) {
        if self.mode == Mode::Review {
            self.mode = Mode::None;
        }
    }

    /// A literal text selection `[start, end)` (UTF-16) was made in the document.
    ///
    /// A collapsed selection clears to idle. Selections are ignored while
    /// adding.
    pub fn select_text(&mut self, document: &Document, matcher: &TextMatcher, start: usize, end: usize) -> Result<ReviewState> {
        if self.mode == Mode::Add {
            return Ok(self.state());
        }

        let query_text = document.offsets().slice(start, end).to_string();
        if start >= end || query_text.trim().is_empty() {
            self.clear_selection();
            return Ok(self.state());
        }

        self.active_annotation_id = None;
        self.linked_annotation_ids.clear();
        self.mode = Mode::None;

        if document.overlaps_annotation(start, end) {
            tracing::debug!(start, end, "selection overlaps an annotation");
            self.add_state = Some(AddModeState::disabled());
            return Ok(self.state());
        }

        let query = matcher.find_matches(document, &query_text, start)?;
        self.add_state = Some(AddModeState::with_query(query));
        Ok(self.state())
    }

    /// Empty selection or click outside any span
    pub fn clear_selection(&mut self) {
        if self.mode == Mode::Add {
            return;
        }
        self.active_annotation_id = None;
        self.linked_annotation_ids.clear();
        self.mode = Mode::None;
        self.add_state = None;
    }

    /// "Add N annotations": enters add mode and returns the text to look up
    pub fn enable_add_mode(&mut self) -> Result<String> {
        let Some(add) = self.add_state.as_mut() else {
            return Err(TatError::invalid_state("no text selection to add"));
        };
        if add.disabled {
            return Err(ValidationError::SelectionOverlap.into());
        }
        let query_text = match add.query.as_ref() {
            Some(q) if !q.matches.is_empty() => q.query_text.trim().to_string(),
            _ => return Err(TatError::invalid_state("selection has no mentions to add")),
        };

        add.loading_linker = true;
        add.linker = None;
        self.mode = Mode::Add;
        self.active_annotation_id = None;
        self.linked_annotation_ids.clear();
        tracing::debug!(query = query_text.as_str(), "add mode enabled");
        Ok(query_text)
    }

    /// Store the concept lookup result. Returns false when add mode was left meanwhile.
    pub fn linker_resolved(&mut self, results: Vec<ConceptSuggestion>) -> bool {
        match (self.mode, self.add_state.as_mut()) {
            (Mode::Add, Some(add)) => {
                add.loading_linker = false;
                add.linker = Some(results);
                true
            }
            _ => false,
        }
    }

    fn add_state_mut(&mut self) -> Result<&mut AddModeState> {
        match (self.mode, self.add_state.as_mut()) {
            (Mode::Add, Some(add)) => Ok(add),
            _ => Err(TatError::invalid_state("not in add mode")),
        }
    }

    /// Check or uncheck one candidate; returns whether it is now checked
    pub fn toggle_candidate(&mut self, index: usize) -> Result<bool> {
        let add = self.add_state_mut()?;
        if index >= add.matches().len() {
            return Err(TatError::invalid_input(format!("no candidate at index {}", index)));
        }
        if add.selected.remove(&index) {
            Ok(false)
        } else {
            add.selected.insert(index);
            Ok(true)
        }
    }

    pub fn select_all_candidates(&mut self) -> Result<()> {
        let add = self.add_state_mut()?;
        add.selected = (0..add.matches().len()).collect();
        Ok(())
    }

    pub fn deselect_all_candidates(&mut self) -> Result<()> {
        self.add_state_mut()?.selected.clear();
        Ok(())
    }

    /// Card click in the add list
    pub fn set_active_match(&mut self, index: usize) -> Result<()> {
        let add = self.add_state_mut()?;
        match add.query.as_mut() {
            Some(q) if index < q.matches.len() => {
                q.active_index = index;
                Ok(())
            }
            _ => Err(TatError::invalid_input(format!("no candidate at index {}", index))),
        }
    }

    /// Leave add mode; returns the mention index to scroll back to
    pub fn close_add_mode(&mut self) -> Option<usize> {
        let initial = self
            .add_state
            .as_ref()
            .and_then(|a| a.query.as_ref())
            .map(|q| q.initial_index);
        if self.mode == Mode::Add {
            self.mode = Mode::None;
        }
        self.add_state = None;
        initial
    }

    /// Explicit close of the sidebar
    pub fn close(&mut self) {
        self.active_annotation_id = None;
        self.linked_annotation_ids.clear();
        self.mode = Mode::None;
        self.add_state = None;
    }

    /// Reset when a different document is opened. Returns true on reset.
    pub fn document_changed(&mut self, document_id: &str) -> bool {
        if self.document_id.as_deref() == Some(document_id) {
            return false;
        }
        *self = Self::new(document_id);
        true
    }

    /// Make `id` active if nothing else is selected. Returns true when it did.
    pub fn focus_if_idle(&mut self, document: &Document, id: &str) -> bool {
        if self.state() != ReviewState::Idle || self.add_state.is_some() || document.annotation(id).is_none() {
            return false;
        }
        self.active_annotation_id = Some(id.to_string());
        self.linked_annotation_ids = document.linked_ids(id);
        true
    }

    /// Follow an id change (provisional id replaced by the server's)
    pub fn rename_annotation(&mut self, from: &str, to: &str) {
        if self.active_annotation_id.as_deref() == Some(from) {
            self.active_annotation_id = Some(to.to_string());
        }
        for id in self.linked_annotation_ids.iter_mut().filter(|l| l.as_str() == from) {
            *id = to.to_string();
        }
    }

    /// Drop references to annotations that no longer exist and refresh the
    /// linked group
    pub fn refresh(&mut self, document: &Document) {
        match self.active_annotation_id.clone() {
            Some(id) if document.annotation(&id).is_some() => {
                self.linked_annotation_ids = document.linked_ids(&id);
                if self.mode == Mode::Review && self.linked_annotation_ids.len() < 2 {
                    self.mode = Mode::None;
                }
            }
            Some(_) => {
                self.active_annotation_id = None;
                self.linked_annotation_ids.clear();
                if self.mode == Mode::Review {
                    self.mode = Mode::None;
                }
            }
            None => self.linked_annotation_ids.clear(),
        }
    }

    /// Annotations a review press applies to: the linked group in batch
    /// review, otherwise the active annotation
    pub fn review_targets(&self) -> Vec<String> {
        match (&self.mode, &self.active_annotation_id) {
            (Mode::Review, _) => self.linked_annotation_ids.clone(),
            (_, Some(id)) => vec![id.clone()],
            _ => Vec::new(),
        }
    }

    /// Collective status of the linked group, MANUAL members ignored
    pub fn group_status(&self, document: &Document) -> Option<Status> {
        let statuses: Vec<Status> = self
            .linked_annotation_ids
            .iter()
            .filter_map(|id| document.annotation(id))
            .filter(|a| !a.is_manual())
            .map(|a| a.status)
            .collect();
        group_status(&statuses)
    }

    /// Every non-MANUAL member of the linked group has been reviewed
    pub fn group_reviewed(&self, document: &Document) -> bool {
        self.linked_annotation_ids
            .iter()
            .filter_map(|id| document.annotation(id))
            .filter(|a| !a.is_manual())
            .all(|a| a.status != Status::NotReviewed)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore a saved session. A session saved for another document yields
    /// a fresh one.
    pub fn from_json(json: &str, document: &Document) -> Result<Self> {
        let mut session: ReviewSession = serde_json::from_str(json)?;
        if session.document_id.as_deref() != Some(document.id.as_str()) {
            return Ok(Self::new(document.id.clone()));
        }
        session.refresh(document);
        Ok(session)
    }
}

/// ACCEPTED if all accepted, REJECTED if all rejected, else NOT_REVIEWED
pub fn group_status(statuses: &[Status]) -> Option<Status> {
    if statuses.is_empty() {
        return None;
    }
    let status = if statuses.iter().all(|s| *s == Status::Accepted) {
        Status::Accepted
    } else if statuses.iter().all(|s| *s == Status::Rejected) {
        Status::Rejected
    } else {
        Status::NotReviewed
    };
    Some(status)
}
