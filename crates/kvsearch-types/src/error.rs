//! Error types for the kvsearch system.

use thiserror::Error;

/// Unified error type for configuration and shared operations.
#[derive(Debug, Error)]
pub enum KvSearchError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Raised when a stored value cannot become an indexable document.
///
/// Permanent for the entry that caused it: callers log and skip it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapperError {
    #[error("Malformed entry {key}: {reason}")]
    MalformedEntry { key: String, reason: String },
}

impl MapperError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        MapperError::MalformedEntry {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
