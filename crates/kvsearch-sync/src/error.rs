//! Error types for the sync pipeline.

use thiserror::Error;

use kvsearch_index::IndexError;
use kvsearch_store::StoreError;

/// Errors that can occur while keeping the index in sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The store could not be read or watched
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The index rejected a write or commit
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Shutdown was requested before the operation finished
    #[error("Cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_transient(),
            SyncError::Index(_) | SyncError::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::Store(StoreError::Unavailable("connection refused".to_string()));
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_transient());

        let err = SyncError::Index(IndexError::IndexLocked("poisoned".to_string()));
        assert!(err.to_string().contains("Index error"));
        assert!(!err.is_transient());

        assert!(!SyncError::Cancelled.is_transient());
    }
}
