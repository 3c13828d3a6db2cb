//! End-to-end test infrastructure for kvsearch.
//!
//! Provides a shared TestHarness that runs the full sync pipeline against an
//! in-memory store, plus polling helpers for asserting on eventual state.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kvsearch_index::{IndexConfig, IndexEngine};
use kvsearch_service::SearchServiceImpl;
use kvsearch_store::MemoryStore;
use kvsearch_sync::{PipelineConfig, PipelineHandle, RetryConfig, SyncPipeline, SyncStatus};
use kvsearch_types::SearchSettings;

/// Prefix every harness mirrors.
pub const TEST_PREFIX: &str = "a/";

/// Shared test harness for E2E tests.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<IndexEngine>,
    pub pipeline: SyncPipeline,
    pub cancel: CancellationToken,
    handle: Option<PipelineHandle>,
}

impl TestHarness {
    /// Harness whose scanner effectively never fires during a test.
    pub fn new() -> Self {
        Self::with_scan_interval(Duration::from_secs(3600))
    }

    pub fn with_scan_interval(interval: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(
            IndexEngine::new(IndexConfig::default().with_memory_mb(15))
                .expect("Failed to create index"),
        );

        let mut config = PipelineConfig::new(TEST_PREFIX).with_scan_interval(interval);
        config.retry = RetryConfig::new(Duration::from_millis(20), Duration::from_millis(100));
        let pipeline = SyncPipeline::new(store.clone(), engine.clone(), config);

        Self {
            store,
            engine,
            pipeline,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Run the initial sync and spawn the watcher and scanner.
    pub async fn start(&mut self) {
        let handle = self
            .pipeline
            .start(self.cancel.clone())
            .await
            .expect("Pipeline failed to start");
        self.handle = Some(handle);
    }

    /// Cancel the loops and wait for them to exit.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.join().await;
        }
    }

    pub fn status(&self) -> Arc<SyncStatus> {
        self.pipeline.status()
    }

    /// gRPC service wired to this harness.
    pub fn service(&self) -> SearchServiceImpl {
        SearchServiceImpl::new(
            self.engine.clone(),
            self.store.clone(),
            self.pipeline.status(),
            TEST_PREFIX,
            &SearchSettings::default(),
        )
    }

    /// Ids matching `query`, in rank order.
    pub fn search_ids(&self, query: &str) -> Vec<String> {
        self.engine
            .query(query, 100)
            .expect("Query failed")
            .into_iter()
            .map(|hit| hit.id)
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Serve `service` on a free local port until the returned token is
/// cancelled. Returns the bound address.
pub async fn serve(service: SearchServiceImpl) -> (SocketAddr, CancellationToken) {
    let addr = free_local_addr();
    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(kvsearch_service::run_server_with_shutdown(addr, service, async move {
        shutdown.cancelled().await
    }));
    wait_until_listening(addr).await;
    (addr, token)
}

fn free_local_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    listener.local_addr().expect("No local addr")
}

async fn wait_until_listening(addr: SocketAddr) {
    for _ in 0..200 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Server did not start on {}", addr);
}

/// Run `fut` with a timeout, failing the test if it stalls.
pub async fn within<T>(timeout: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, fut)
        .await
        .expect("Timed out")
}

/// JSON experiment value as the seed tool writes it.
pub fn experiment_json(kind: &str, status: &str) -> String {
    serde_json::json!({
        "id": 1,
        "uuid": "00000000-0000-0000-0000-000000000001",
        "type": kind,
        "status": status,
        "enabled": true,
    })
    .to_string()
}
