//! Review state machine
//!
//! - `session.rs` - ReviewSession: sidebar state (active annotation, batch review, add mode)
//! - `ledger.rs` - ReviewLedger: optimistic writes, reconciliation, rollback
//! - `workspace.rs` - Workspace: document + session + ledger, paired mutations
//! - `client.rs` - ReviewClient: async commit against a `DocumentStore`
//! - `wasm.rs` - ReviewEngine: JS surface

pub mod session;
pub mod ledger;
pub mod workspace;
pub mod client;
pub mod wasm;

#[cfg(test)]
mod tests;

pub use session::{AddModeState, ConceptSuggestion, LinkerResponse, Mode, ReviewSession, ReviewState};
pub use ledger::{Reconciled, ReviewLedger, StatusChange, ToggleBasis, Transaction, TransactionKind, UpdateResponse};
pub use workspace::Workspace;
pub use client::{ConceptLinker, DocumentStore, ReviewClient};
pub use wasm::ReviewEngine;
