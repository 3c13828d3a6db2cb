//! Error types for the kvsearch client.

use thiserror::Error;

/// Errors that can occur when using the kvsearch client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to connect to the daemon
    #[error("Connection failed: {0}")]
    Connection(#[from] tonic::transport::Error),

    /// RPC call failed
    #[error("RPC failed: {0}")]
    Rpc(#[from] tonic::Status),
}

impl ClientError {
    /// Whether the server rejected the request as invalid.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, ClientError::Rpc(status) if status.code() == tonic::Code::InvalidArgument)
    }
}
