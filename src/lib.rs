//! TatCore: Text Annotation Tool review engine
//!
//! A Rust/WASM implementation of the document annotation review core: finding
//! mentions, rendering overlays, and reviewing model annotations with
//! optimistic updates against the backend.
//!
//! # Architecture
//!
//! `logging.rs` forwards `tracing` events to the browser console.
//!
//! ## Model
//! - `annotation.rs` - Annotation, Match, Status, ScoreCategory
//! - `document.rs` - Document: text + annotations + aggregations
//! - `aggregation.rs` - Progress tallies kept in step with annotation statuses
//! - `offsets.rs` - OffsetMap: UTF-16 (wire) <-> UTF-8 (Rust) offsets
//! - `library.rs` - Document list, processing states
//! - `wasm.rs` - sortLibrary / removeFromLibrary / humanFileSize
//!
//! ## Highlighting
//! - `matcher.rs` - TextMatcher: whole-word, case-insensitive Ctrl+F
//! - `compositor.rs` - composite(): interleave spans with literal text
//!
//! ## Review
//! - `session.rs` - ReviewSession: IDLE / ANNOTATION_SELECTED / BATCH_REVIEW / ADD_PENDING
//! - `ledger.rs` - ReviewLedger: optimistic apply, reconcile, rollback
//! - `client.rs` - ReviewClient: per-annotation serialized async commits
//!
//! ## Query
//! - `filter.rs` - AnnotationQuery: backend filter shape, evaluated locally
//! - `export.rs` - CSV / TSV export
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { ReviewEngine } from 'tatcore';
//!
//! await init();
//!
//! const engine = new ReviewEngine(store, null);
//! await engine.loadDocument('42');
//!
//! // Free-text selection -> candidate mentions
//! engine.selectText(30, 36);
//! await engine.enableAddMode();      // concept lookup
//! engine.selectAllCandidates();
//! const { ok, error } = await engine.confirmAdd();
//!
//! render(engine.composite());        // [{kind: 'text'|'annotation'|'match', ...}]
//! ```

pub mod error;
pub mod config;
pub mod logging;
pub mod model;
pub mod highlight;
pub mod review;
pub mod query;

// Public exports
pub use error::{Result, TatError, ValidationError};
pub use config::EngineConfig;
pub use model::*;
pub use highlight::{composite, find_matches, MatchResult, Segment, TextMatcher};
pub use review::{ReviewClient, ReviewEngine, ReviewSession, ReviewState, Workspace};
pub use query::{export_annotations, AnnotationQuery, ExportFormat};

use serde::Serialize;
use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook and console logging for the browser
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logging::init_console_logging();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("tatcore v{}", env!("CARGO_PKG_VERSION"))
}

/// Serialize to plain JS objects (maps become objects, not `Map`s)
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> std::result::Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
