//! Store error types.

use thiserror::Error;

/// Errors raised by store access.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, timeout or server error. Transient: callers retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A key returned by the store is not valid UTF-8
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The requested start revision has been compacted away
    #[error("Revision {requested} compacted (oldest available {compacted})")]
    Compacted { requested: i64, compacted: i64 },
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Compacted { .. })
    }
}

impl From<etcd_client::Error> for StoreError {
    fn from(err: etcd_client::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
