//! Store-side records.
//!
//! Entries and change events are owned by the key-value store and are
//! read-only to kvsearch. Every record carries the store revision that
//! produced it; the index orders writes by that revision.

use serde::{Deserialize, Serialize};

/// Monotonically increasing version stamp assigned by the store.
pub type Revision = i64;

/// A key-value pair read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Full key, including the watched prefix
    pub key: String,

    /// Opaque value bytes
    pub value: Vec<u8>,

    /// Revision of the last modification of this key
    pub revision: Revision,
}

impl StoredEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, revision: Revision) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            revision,
        }
    }
}

/// Kind of a change delivered by the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Put,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Put => write!(f, "PUT"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// A single change emitted by the watch stream.
///
/// Consumed exactly once by the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub key: String,

    /// Present for PUT, absent for DELETE
    #[serde(default)]
    pub value: Option<Vec<u8>>,

    /// Revision at which the change happened
    pub revision: Revision,
}

impl ChangeEvent {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>, revision: Revision) -> Self {
        Self {
            kind: ChangeKind::Put,
            key: key.into(),
            value: Some(value.into()),
            revision,
        }
    }

    pub fn delete(key: impl Into<String>, revision: Revision) -> Self {
        Self {
            kind: ChangeKind::Delete,
            key: key.into(),
            value: None,
            revision,
        }
    }

    /// View a PUT as the entry it wrote. Returns None for DELETE.
    pub fn as_entry(&self) -> Option<StoredEntry> {
        match (self.kind, &self.value) {
            (ChangeKind::Put, Some(value)) => Some(StoredEntry {
                key: self.key.clone(),
                value: value.clone(),
                revision: self.revision,
            }),
            _ => None,
        }
    }
}

/// Full contents of a prefix at one store revision.
///
/// Produced once per reconciliation pass and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Store revision the snapshot was read at
    pub revision: Revision,

    /// Every entry under the prefix at that revision
    pub entries: Vec<StoredEntry>,
}

impl Snapshot {
    pub fn new(revision: Revision, entries: Vec<StoredEntry>) -> Self {
        Self { revision, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
