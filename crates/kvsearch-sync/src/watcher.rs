//! Live watch loop.
//!
//! Consumes the prefix watch stream and applies each batch to the index.
//! When the stream ends for any reason the watcher runs a full
//! reconciliation, then resubscribes from the revision right after that
//! pass's snapshot, so changes made while no stream was open are covered
//! either by the pass or by the replay.
//!
//! Only shutdown ends the loop: a recovery that fails is retried with
//! backoff, whatever the error.
//!
//! Batches are applied without suspension points: cancellation is only
//! observed between batches, so no batch is ever half-applied.

use std::sync::Arc;

use backoff::backoff::Backoff;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kvsearch_index::IndexEngine;
use kvsearch_store::{ChangeStream, KvStore};
use kvsearch_types::Revision;

use crate::apply::apply_batch;
use crate::error::SyncError;
use crate::reconcile::Reconciler;
use crate::retry::{retry_transient, RetryConfig};
use crate::status::{SyncStatus, WatcherState};

/// Why a stream stopped delivering.
#[derive(Debug)]
enum StreamEnd {
    Cancelled,
    /// Server closed the stream cleanly
    Closed,
    Failed(SyncError),
}

pub struct Watcher {
    store: Arc<dyn KvStore>,
    engine: Arc<IndexEngine>,
    reconciler: Arc<Reconciler>,
    status: Arc<SyncStatus>,
    retry: RetryConfig,
}

impl Watcher {
    pub fn new(
        store: Arc<dyn KvStore>,
        engine: Arc<IndexEngine>,
        reconciler: Arc<Reconciler>,
        status: Arc<SyncStatus>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            engine,
            reconciler,
            status,
            retry,
        }
    }

    /// Watch from `start_revision` until `cancel` fires.
    ///
    /// `start_revision` is the first revision not yet reflected in the index,
    /// normally the bootstrap snapshot revision plus one.
    pub async fn run(self, start_revision: Revision, cancel: CancellationToken) {
        let prefix = self.reconciler.prefix().to_string();
        self.status.set_watcher_state(WatcherState::Starting);
        self.status.set_watch_revision(start_revision - 1);

        let mut subscription = self.store.watch_prefix(&prefix, Some(start_revision)).await;

        loop {
            let end = match subscription {
                Ok(stream) => {
                    info!(prefix = %prefix, "Watching for changes");
                    self.status.set_watcher_state(WatcherState::Streaming);
                    self.consume(stream, &cancel).await
                }
                Err(e) => StreamEnd::Failed(e.into()),
            };

            match end {
                StreamEnd::Cancelled => break,
                StreamEnd::Closed => warn!(prefix = %prefix, "Watch stream closed, recovering"),
                StreamEnd::Failed(e) => warn!(prefix = %prefix, error = %e, "Watch stream failed, recovering"),
            }

            self.status.set_watcher_state(WatcherState::Recovering);
            self.status.record_watch_restart();

            subscription = tokio::select! {
                _ = cancel.cancelled() => break,
                stream = self.recover(&prefix) => Ok(stream),
            };
        }

        self.status.set_watcher_state(WatcherState::Stopped);
        info!(prefix = %prefix, "Watcher stopped");
    }

    async fn consume(&self, mut stream: ChangeStream, cancel: &CancellationToken) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };

            let batch = match next {
                Some(Ok(batch)) => batch,
                Some(Err(e)) => return StreamEnd::Failed(e.into()),
                None => return StreamEnd::Closed,
            };

            let stats = match apply_batch(&self.engine, &batch) {
                Ok(stats) => stats,
                Err(e) => return StreamEnd::Failed(e.into()),
            };
            self.status.record_apply(&stats);
            if let Some(revision) = batch.iter().map(|event| event.revision).max() {
                self.status.set_watch_revision(revision);
            }
            debug!(events = batch.len(), applied = stats.applied, "Watch batch applied");
        }
    }

    /// Resubscribe until it succeeds. Errors that transient retries give up
    /// on (an unreadable snapshot, an index failure) are backed off and
    /// retried here too.
    async fn recover(&self, prefix: &str) -> ChangeStream {
        let mut backoff = self.retry.backoff();
        loop {
            match self.resubscribe(prefix).await {
                Ok(stream) => return stream,
                Err(e) => {
                    let delay = backoff.next_backoff().unwrap_or(self.retry.max);
                    error!(
                        prefix,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Watch recovery failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Reconcile, then open a stream right after the reconciled revision.
    /// Retried with backoff while the store is unavailable.
    async fn resubscribe(&self, prefix: &str) -> Result<ChangeStream, SyncError> {
        retry_transient(self.retry, "watch recovery", || async move {
            let report = self.reconciler.reconcile_after_running().await?;
            let stream = self
                .store
                .watch_prefix(prefix, Some(report.revision + 1))
                .await?;
            self.status.set_watch_revision(report.revision);
            info!(prefix, revision = report.revision, "Watch resumed after reconciliation");
            Ok(stream)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsearch_index::IndexConfig;
    use async_trait::async_trait;
    use kvsearch_store::{MemoryStore, StoreError};
    use kvsearch_types::Snapshot;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the next `failures` snapshot reads with a permanent error.
    struct FailingSnapshots {
        inner: Arc<MemoryStore>,
        failures: AtomicU32,
    }

    #[async_trait]
    impl KvStore for FailingSnapshots {
        async fn get_prefix(&self, prefix: &str) -> Result<Snapshot, StoreError> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StoreError::InvalidKey("a/\u{fffd}".to_string()));
            }
            self.inner.get_prefix(prefix).await
        }

        async fn watch_prefix(
            &self,
            prefix: &str,
            start_revision: Option<Revision>,
        ) -> Result<ChangeStream, StoreError> {
            self.inner.watch_prefix(prefix, start_revision).await
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: Arc<IndexEngine>,
        status: Arc<SyncStatus>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(store: Arc<MemoryStore>, start_revision: Revision) -> Fixture {
        start_over(store.clone(), store, start_revision)
    }

    /// Watcher reading through `source`, with `store` used to drive writes.
    fn start_over(
        source: Arc<dyn KvStore>,
        store: Arc<MemoryStore>,
        start_revision: Revision,
    ) -> Fixture {
        let engine = Arc::new(IndexEngine::new(IndexConfig::default().with_memory_mb(15)).unwrap());
        let status = Arc::new(SyncStatus::new());
        let reconciler = Arc::new(Reconciler::new(
            source.clone(),
            engine.clone(),
            status.clone(),
            "a/",
        ));
        let retry = RetryConfig::new(Duration::from_millis(100), Duration::from_secs(1));
        let watcher = Watcher::new(source, engine.clone(), reconciler, status.clone(), retry);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(start_revision, cancel.clone()));
        Fixture {
            store,
            engine,
            status,
            cancel,
            handle,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_applies_live_changes() {
        let f = start(Arc::new(MemoryStore::new()), 1);
        settle().await;
        assert_eq!(f.status.watcher_state(), WatcherState::Streaming);

        f.store.put("a/1", "hello");
        settle().await;
        assert_eq!(f.engine.query("hello", 10).unwrap().len(), 1);

        f.store.delete("a/1");
        settle().await;
        assert!(f.engine.query("hello", 10).unwrap().is_empty());
        assert_eq!(f.status.snapshot().watch_revision, Some(2));

        f.cancel.cancel();
        f.handle.await.unwrap();
        assert_eq!(f.status.watcher_state(), WatcherState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_from_start_revision() {
        let store = Arc::new(MemoryStore::new());
        store.put("a/1", "before");
        store.put("a/2", "after");

        // Revision 1 is already indexed; only revision 2 is new
        let f = start(store, 2);
        settle().await;
        assert!(f.engine.get("a/1").is_none());
        assert!(f.engine.get("a/2").is_some());

        f.cancel.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_recovered_after_disconnect() {
        let f = start(Arc::new(MemoryStore::new()), 1);
        settle().await;
        f.store.put("a/1", "kept");
        settle().await;

        // Writes while the stream is down, with the store unreachable
        f.store.set_unavailable(true);
        settle().await;
        f.store.set_unavailable(false);
        f.store.put("a/2", "missed");
        f.store.delete("a/1");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(f.engine.get("a/1").is_none());
        assert!(f.engine.get("a/2").is_some());
        assert_eq!(f.status.watcher_state(), WatcherState::Streaming);
        assert!(f.status.snapshot().watch_restarts >= 1);

        // Live again after recovery
        f.store.put("a/3", "live");
        settle().await;
        assert!(f.engine.get("a/3").is_some());

        f.cancel.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_triggers_recovery() {
        let f = start(Arc::new(MemoryStore::new()), 1);
        settle().await;

        f.store.disconnect_watchers();
        settle().await;
        assert_eq!(f.status.snapshot().watch_restarts, 1);
        assert_eq!(f.store.watcher_count(), 1);

        f.cancel.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_survives_permanent_error() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FailingSnapshots {
            inner: store.clone(),
            failures: AtomicU32::new(0),
        });
        let f = start_over(source.clone(), store, 1);
        settle().await;
        assert_eq!(f.status.watcher_state(), WatcherState::Streaming);

        source.failures.store(2, Ordering::SeqCst);
        f.store.disconnect_watchers();
        f.store.put("a/1", "after");
        settle().await;
        assert_eq!(f.status.watcher_state(), WatcherState::Recovering);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(source.failures.load(Ordering::SeqCst), 0);
        assert_eq!(f.status.watcher_state(), WatcherState::Streaming);
        assert!(f.engine.get("a/1").is_some());

        f.store.put("a/2", "live");
        settle().await;
        assert!(f.engine.get("a/2").is_some());

        f.cancel.cancel();
        f.handle.await.unwrap();
        assert_eq!(f.status.watcher_state(), WatcherState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compacted_start_recovers() {
        let store = Arc::new(MemoryStore::new());
        store.put("a/1", "one");
        store.put("a/1", "two");
        store.compact(2);

        let f = start(store, 1);
        settle().await;
        assert_eq!(f.engine.get("a/1").unwrap().revision, 2);
        assert_eq!(f.status.watcher_state(), WatcherState::Streaming);

        f.cancel.cancel();
        f.handle.await.unwrap();
    }
}
