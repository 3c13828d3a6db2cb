//! Watch-stream recovery E2E tests.
//!
//! Changes made while the watch is down must reach the index once the
//! watcher reconnects, whether the stream ended cleanly, with an error, or
//! the missed history was compacted away.

use std::time::Duration;

use pretty_assertions::assert_eq;

use e2e_tests::{eventually, TestHarness};
use kvsearch_sync::WatcherState;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_gap_recovery_after_store_outage() {
    let mut harness = TestHarness::new();
    harness.store.put("a/1", "before");
    harness.store.put("a/2", "stays");
    harness.start().await;
    assert!(eventually(WAIT, || harness.store.watcher_count() == 1).await);

    harness.store.set_unavailable(true);
    harness.store.delete("a/1");
    harness.store.put("a/3", "during");

    assert!(eventually(WAIT, || {
        harness.status().watcher_state() == WatcherState::Recovering
    })
    .await);
    // Nothing from the outage is visible yet
    assert_eq!(harness.search_ids("before"), vec!["a/1"]);
    assert!(harness.search_ids("during").is_empty());

    harness.store.set_unavailable(false);
    assert!(eventually(WAIT, || harness.search_ids("during") == vec!["a/3"]).await);
    assert!(harness.search_ids("before").is_empty());
    assert_eq!(harness.search_ids("stays"), vec!["a/2"]);

    assert!(eventually(WAIT, || {
        harness.status().watcher_state() == WatcherState::Streaming
    })
    .await);
    assert!(harness.status().snapshot().watch_restarts >= 1);

    // Live changes flow again after recovery
    harness.store.put("a/4", "after");
    assert!(eventually(WAIT, || harness.search_ids("after") == vec!["a/4"]).await);

    harness.stop().await;
}

#[tokio::test]
async fn test_recovery_after_clean_disconnect() {
    let mut harness = TestHarness::new();
    harness.start().await;
    assert!(eventually(WAIT, || harness.store.watcher_count() == 1).await);

    harness.store.disconnect_watchers();
    harness.store.put("a/1", "missed");

    assert!(eventually(WAIT, || harness.search_ids("missed") == vec!["a/1"]).await);
    assert!(eventually(WAIT, || harness.status().snapshot().watch_restarts >= 1).await);

    harness.stop().await;
}

#[tokio::test]
async fn test_recovery_when_history_is_compacted() {
    let mut harness = TestHarness::new();
    harness.store.put("a/1", "first");
    harness.start().await;
    assert!(eventually(WAIT, || harness.store.watcher_count() == 1).await);

    harness.store.set_unavailable(true);
    harness.store.put("a/2", "compacted");
    harness.store.delete("a/1");
    harness.store.compact(harness.store.revision());
    harness.store.set_unavailable(false);

    assert!(eventually(WAIT, || harness.search_ids("compacted") == vec!["a/2"]).await);
    assert!(harness.search_ids("first").is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_stop_sets_watcher_stopped() {
    let mut harness = TestHarness::new();
    harness.start().await;
    harness.stop().await;
    assert_eq!(harness.status().watcher_state(), WatcherState::Stopped);
}
