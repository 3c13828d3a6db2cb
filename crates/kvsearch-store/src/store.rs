//! Store capability trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use kvsearch_types::{ChangeEvent, Revision, Snapshot};

use crate::error::StoreError;

/// Changes delivered together by one watch response, in revision order.
pub type ChangeBatch = Vec<ChangeEvent>;

/// Live change stream.
///
/// Yields batches until the store terminates the watch. An `Err` item is the
/// last item of the stream.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ChangeBatch, StoreError>> + Send>>;

/// Prefix-scoped access to the key-value store.
///
/// Both calls may run concurrently. Implementations are shared behind an
/// `Arc` by the watcher, the scanner and the search service.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read every entry under `prefix` at a single store revision.
    async fn get_prefix(&self, prefix: &str) -> Result<Snapshot, StoreError>;

    /// Subscribe to changes under `prefix`.
    ///
    /// With `start_revision`, changes at or after that revision are replayed
    /// before live changes; otherwise only changes after the call are seen.
    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision: Option<Revision>,
    ) -> Result<ChangeStream, StoreError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
