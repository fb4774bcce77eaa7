//! Personal document library: summaries, processing states, sorting
//!
//! The list table calls these through `sortLibrary`, `removeFromLibrary` and
//! `humanFileSize` in `model/wasm.rs`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::annotation::de_id;

/// Backend processing pipeline state
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    Created,
    Uploaded,
    Queued,
    Failed,
    Processing,
    Processed,
}

impl ProcessingState {
    /// Sort rank for the state column. FAILED is outside the pipeline order and sorts first.
    pub fn rank(&self) -> i32 {
        match self {
            ProcessingState::Failed => -1,
            ProcessingState::Created => 0,
            ProcessingState::Uploaded => 1,
            ProcessingState::Queued => 2,
            ProcessingState::Processing => 3,
            ProcessingState::Processed => 4,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self == ProcessingState::Processed
    }
}

/// Comparator for the state column
pub fn state_comparator(a: ProcessingState, b: ProcessingState) -> Ordering {
    a.rank().cmp(&b.rank())
}

/// One row of the document list
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentSummary {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub filename: String,
    pub state: ProcessingState,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub datetime_created: Option<String>,
}

impl DocumentSummary {
    /// Extension of the filename, lower-cased ("pdf", "docx", ...)
    pub fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    pub fn human_size(&self) -> Option<String> {
        self.file_size.map(human_file_size)
    }
}

/// Size in base-1024 units, one decimal ("1.5kB")
pub fn human_file_size(size_in_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
    let mut value = size_in_bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

/// Column to sort the library by
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LibrarySort {
    State,
    Filename,
    Created,
}

/// The user's documents
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Library {
    pub documents: Vec<DocumentSummary>,
}

impl Library {
    pub fn new(documents: Vec<DocumentSummary>) -> Self {
        Self { documents }
    }

    pub fn get(&self, id: &str) -> Option<&DocumentSummary> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Remove a document after a successful delete; returns it if present
    pub fn remove(&mut self, id: &str) -> Option<DocumentSummary> {
        let idx = self.documents.iter().position(|d| d.id == id)?;
        Some(self.documents.remove(idx))
    }

    /// Insert or replace (after upload/commit)
    pub fn upsert(&mut self, summary: DocumentSummary) {
        match self.documents.iter_mut().find(|d| d.id == summary.id) {
            Some(existing) => *existing = summary,
            None => self.documents.push(summary),
        }
    }

    pub fn sort_by(&mut self, key: LibrarySort, descending: bool) {
        self.documents.sort_by(|a, b| {
            let ord = match key {
                LibrarySort::State => state_comparator(a.state, b.state),
                LibrarySort::Filename => a.filename.to_lowercase().cmp(&b.filename.to_lowercase()),
                // ISO timestamps order lexically
                LibrarySort::Created => a.datetime_created.cmp(&b.datetime_created),
            };
            if descending { ord.reverse() } else { ord }
        });
    }
}
