//! Client library for the kvsearch daemon.
//!
//! # Example
//!
//! ```rust,no_run
//! use kvsearch_client::SearchClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = SearchClient::connect("http://[::1]:50051").await?;
//!     for hit in client.search("canary", 10).await? {
//!         println!("{} {:.3}", hit.id, hit.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;

pub use client::{SearchClient, DEFAULT_ENDPOINT};
pub use error::ClientError;

// Re-export wire types for convenience
pub use kvsearch_service::pb::{Entry, GetSyncStatusResponse, SearchHit};
