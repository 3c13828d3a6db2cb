//! Sync pipeline wiring.
//!
//! Builds the reconciler, watcher and scanner around one shared index,
//! runs the bootstrap pass and spawns the long-running loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kvsearch_index::IndexEngine;
use kvsearch_store::KvStore;
use kvsearch_types::{Revision, Settings};

use crate::error::SyncError;
use crate::jitter::JitterConfig;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::retry::{retry_transient, RetryConfig};
use crate::scanner::{Scanner, ScannerConfig};
use crate::status::SyncStatus;
use crate::watcher::Watcher;

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Key prefix mirrored into the index
    pub prefix: String,
    pub scanner: ScannerConfig,
    pub retry: RetryConfig,
}

impl PipelineConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            scanner: ScannerConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scanner.interval = interval;
        self
    }
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            prefix: settings.key_prefix.clone(),
            scanner: ScannerConfig {
                interval: Duration::from_secs(settings.scan_interval_secs),
                jitter: JitterConfig::new(settings.scan_jitter_secs),
            },
            retry: RetryConfig::new(
                Duration::from_millis(settings.watcher.backoff_initial_ms),
                Duration::from_millis(settings.watcher.backoff_max_ms),
            ),
        }
    }
}

/// Handles of the spawned loops.
pub struct PipelineHandle {
    watcher: JoinHandle<()>,
    scanner: JoinHandle<()>,
}

impl PipelineHandle {
    /// Wait for both loops to exit after their token was cancelled.
    pub async fn join(self) {
        if let Err(e) = self.watcher.await {
            warn!(error = %e, "Watcher task ended abnormally");
        }
        if let Err(e) = self.scanner.await {
            warn!(error = %e, "Scanner task ended abnormally");
        }
    }
}

/// Keeps one index in sync with one store prefix.
pub struct SyncPipeline {
    store: Arc<dyn KvStore>,
    engine: Arc<IndexEngine>,
    reconciler: Arc<Reconciler>,
    status: Arc<SyncStatus>,
    config: PipelineConfig,
}

impl SyncPipeline {
    pub fn new(store: Arc<dyn KvStore>, engine: Arc<IndexEngine>, config: PipelineConfig) -> Self {
        let status = Arc::new(SyncStatus::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            engine.clone(),
            status.clone(),
            config.prefix.clone(),
        ));
        Self {
            store,
            engine,
            reconciler,
            status,
            config,
        }
    }

    pub fn status(&self) -> Arc<SyncStatus> {
        self.status.clone()
    }

    pub fn engine(&self) -> Arc<IndexEngine> {
        self.engine.clone()
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Fill the index from a full snapshot, retrying while the store is
    /// unavailable. Must finish before the index serves queries.
    pub async fn bootstrap(&self, cancel: &CancellationToken) -> Result<ReconcileReport, SyncError> {
        info!(prefix = %self.config.prefix, store = self.store.name(), "Running initial sync");
        let pass = retry_transient(self.config.retry, "initial sync", || async move {
            self.reconciler.reconcile_after_running().await
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            report = pass => report,
        }
    }

    /// Spawn the watcher from `start_revision` and the scanner.
    pub fn spawn(&self, start_revision: Revision, cancel: CancellationToken) -> PipelineHandle {
        let watcher = Watcher::new(
            self.store.clone(),
            self.engine.clone(),
            self.reconciler.clone(),
            self.status.clone(),
            self.config.retry,
        );
        let scanner = Scanner::new(self.reconciler.clone(), self.status.clone(), self.config.scanner);

        PipelineHandle {
            watcher: tokio::spawn(watcher.run(start_revision, cancel.clone())),
            scanner: tokio::spawn(scanner.run(cancel)),
        }
    }

    /// Bootstrap, then start watching right after the bootstrap snapshot.
    pub async fn start(&self, cancel: CancellationToken) -> Result<PipelineHandle, SyncError> {
        let report = self.bootstrap(&cancel).await?;
        info!(
            revision = report.revision,
            documents = report.entries,
            "Initial sync complete"
        );
        Ok(self.spawn(report.revision + 1, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsearch_index::IndexConfig;
    use kvsearch_store::MemoryStore;

    fn pipeline(store: Arc<MemoryStore>) -> SyncPipeline {
        let engine = Arc::new(IndexEngine::new(IndexConfig::default().with_memory_mb(15)).unwrap());
        let mut config = PipelineConfig::new("a/").with_scan_interval(Duration::from_secs(60));
        config.retry = RetryConfig::new(Duration::from_millis(100), Duration::from_secs(1));
        SyncPipeline::new(store, engine, config)
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            key_prefix: "experiments/".to_string(),
            scan_interval_secs: 15,
            scan_jitter_secs: 3,
            ..Default::default()
        };
        let config = PipelineConfig::from(&settings);
        assert_eq!(config.prefix, "experiments/");
        assert_eq!(config.scanner.interval, Duration::from_secs(15));
        assert_eq!(config.scanner.jitter, JitterConfig::new(3));
        assert_eq!(config.retry.initial, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_bootstraps_then_watches() {
        let store = Arc::new(MemoryStore::new());
        store.put("a/1", "hello");
        let pipeline = pipeline(store.clone());
        let cancel = CancellationToken::new();

        let handle = pipeline.start(cancel.clone()).await.unwrap();
        let engine = pipeline.engine();
        assert_eq!(engine.query("hello", 10).unwrap().len(), 1);

        store.put("a/2", "world");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.query("world", 10).unwrap().len(), 1);

        cancel.cancel();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_retries_until_store_returns() {
        let store = Arc::new(MemoryStore::new());
        store.put("a/1", "hello");
        store.set_unavailable(true);
        let pipeline = Arc::new(pipeline(store.clone()));

        let bootstrap = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.bootstrap(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!bootstrap.is_finished());

        store.set_unavailable(false);
        let report = bootstrap.await.unwrap().unwrap();
        assert_eq!(report.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_cancelled() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let pipeline = pipeline(store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline.bootstrap(&cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
