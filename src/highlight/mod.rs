//! Highlighting: Ctrl+F matching and the overlay compositor
//!
//! Both are pure functions over a document snapshot; the review engine calls
//! them and the UI layer renders the result.

pub mod matcher;
pub mod compositor;
pub mod wasm;

pub use matcher::{find_matches, MatchResult, TextMatcher};
pub use compositor::{composite, Segment};
