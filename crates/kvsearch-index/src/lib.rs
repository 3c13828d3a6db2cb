//! # kvsearch-index
//!
//! In-memory full-text index for kvsearch using Tantivy.
//!
//! The [`IndexEngine`] is the single point where the watcher and the scanner
//! converge. Writes are ordered per id by store revision rather than by
//! arrival, so redundant or reordered writes from both producers settle on
//! the same state.
//!
//! ## Features
//! - RAM-only Tantivy index, rebuilt from the store on every start
//! - Last-writer-wins by revision, with tombstones for deletes
//! - BM25 ranked queries, optional fuzzy matching
//! - Snapshot readers that never wait on writers

pub mod document;
pub mod engine;
pub mod error;
pub mod schema;

pub use engine::{IndexConfig, IndexEngine, IndexStats, WriteOutcome};
pub use error::IndexError;
pub use schema::{build_document_schema, DocumentSchema};
