//! # hitedit Editor
//!
//! Editing engine for schema-described block documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: text ⇄ BlockNode tree (schema-typed)│
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document lifecycle + mutations      │
//! │  - Open/save documents                      │
//! │  - Apply mutations with validation          │
//! │  - Stable block ids for external views      │
//! │  - Debounced text ⇄ tree reconciliation     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hitedit_editor::{Mutation, ReconciliationEngine, SyncConfig};
//!
//! let engine = ReconciliationEngine::from_source(path, &source, schema, SyncConfig::default())?;
//! let mut events = engine.subscribe();
//!
//! engine.apply(Mutation::SetValueText {
//!     path: "/Mesh".into(),
//!     parameter: "dim".into(),
//!     text: "3".into(),
//! })?;
//!
//! // ... after the serialize delay:
//! // events.recv().await == SyncEvent::TextChanged { .. }
//! ```

mod debounce;
mod document;
mod errors;
mod identity;
mod mutations;
mod reconcile;

pub use debounce::Debouncer;
pub use document::{Document, DocumentStorage};
pub use errors::EditorError;
pub use identity::{IdChanges, IdentityMapper, OpaqueId, Resolution, ID_SEPARATOR};
pub use mutations::{Applied, Mutation, MutationError, MutationResult};
pub use reconcile::{ReconciliationEngine, SyncConfig, SyncEvent, SyncStats};

// Re-export common types for convenience
pub use hitedit_parser::{BlockNode, ParamValue, SchemaCatalog};
