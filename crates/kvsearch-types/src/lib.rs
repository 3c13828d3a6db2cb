//! # kvsearch-types
//!
//! Core data types for the kvsearch system.
//!
//! ## Overview
//!
//! kvsearch keeps an in-memory full-text index consistent with a prefix of a
//! distributed key-value store. This crate holds the types every other crate
//! speaks:
//! - [`StoredEntry`], [`ChangeEvent`], [`Snapshot`]: what the store hands out
//! - [`IndexedDocument`], [`SearchHit`]: what the index holds and returns
//! - [`mapper`]: the pure entry-to-document mapping
//! - [`Settings`]: layered process configuration

pub mod config;
pub mod document;
pub mod entry;
pub mod error;
pub mod mapper;

pub use config::{EtcdSettings, SearchSettings, Settings, WatcherSettings};
pub use document::{IndexedDocument, SearchHit};
pub use entry::{ChangeEvent, ChangeKind, Revision, Snapshot, StoredEntry};
pub use error::{KvSearchError, MapperError};
pub use mapper::{map_deletion, map_entry, VALUE_FIELD};
