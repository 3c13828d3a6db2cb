//! gRPC service implementation for kvsearch.
//!
//! Provides:
//! - Search RPC over the in-memory index
//! - ListEntries RPC reading raw entries from the store
//! - GetSyncStatus RPC reporting watcher and scanner state
//! - Health check and reflection endpoints

pub mod grpc;
pub mod handler;
pub mod server;

pub mod pb {
    tonic::include_proto!("kvsearch");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("kvsearch_descriptor");
}

pub use grpc::SearchServiceImpl;
pub use handler::{HandlerError, SearchHandler};
pub use server::run_server_with_shutdown;
