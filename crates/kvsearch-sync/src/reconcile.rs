//! Snapshot reconciliation.
//!
//! One pass reads the full prefix, upserts every entry and deletes every
//! indexed id absent from the snapshot. Both the scanner and the watcher's
//! gap recovery run passes through the same [`Reconciler`], so the overlap
//! guard covers them together.
//!
//! A pass has two phases. Fetching the snapshot awaits the store and may be
//! abandoned by dropping the future. Applying it has no suspension point, so
//! once started it runs to its commit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use kvsearch_index::IndexEngine;
use kvsearch_store::KvStore;
use kvsearch_types::{map_deletion, Revision, Snapshot};

use crate::apply::{apply_deletion, apply_entry, ApplyStats};
use crate::error::SyncError;
use crate::overlap::{OverlapGuard, OverlapPolicy};
use crate::status::SyncStatus;

/// Summary of one completed pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Store revision the snapshot was read at
    pub revision: Revision,
    /// Entries in the snapshot
    pub entries: usize,
    pub stats: ApplyStats,
    /// Tombstones dropped after the pass
    pub pruned: usize,
    pub duration_ms: u64,
}

/// Result of asking for a pass.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Completed(ReconcileReport),
    /// Another pass was running and the policy was [`OverlapPolicy::Skip`]
    Skipped,
}

/// Brings the index in line with the store's current contents.
pub struct Reconciler {
    store: Arc<dyn KvStore>,
    engine: Arc<IndexEngine>,
    status: Arc<SyncStatus>,
    prefix: String,
    guard: OverlapGuard,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn KvStore>,
        engine: Arc<IndexEngine>,
        status: Arc<SyncStatus>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            status,
            prefix: prefix.into(),
            guard: OverlapGuard::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a pass is in progress.
    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    pub(crate) fn guard(&self) -> &OverlapGuard {
        &self.guard
    }

    /// Run one pass, subject to the overlap policy.
    pub async fn reconcile(&self, policy: OverlapPolicy) -> Result<ReconcileOutcome, SyncError> {
        let Some(_run) = self.guard.acquire(policy).await else {
            debug!(prefix = %self.prefix, "Reconciliation already running, skipping");
            return Ok(ReconcileOutcome::Skipped);
        };
        self.run_pass().await.map(ReconcileOutcome::Completed)
    }

    /// Run one pass, waiting for any pass in progress to finish first.
    pub async fn reconcile_after_running(&self) -> Result<ReconcileReport, SyncError> {
        let _run = self.guard.acquire(OverlapPolicy::Wait).await;
        self.run_pass().await
    }

    async fn run_pass(&self) -> Result<ReconcileReport, SyncError> {
        let start = Instant::now();
        let snapshot = self.store.get_prefix(&self.prefix).await?;
        let mut report = self.apply_snapshot(&snapshot)?;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            prefix = %self.prefix,
            revision = report.revision,
            entries = report.entries,
            applied = report.stats.applied,
            stale = report.stats.stale,
            deleted = report.stats.deleted,
            malformed = report.stats.malformed,
            pruned = report.pruned,
            duration_ms = report.duration_ms,
            "Reconciliation complete"
        );
        Ok(report)
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<ReconcileReport, SyncError> {
        // Malformed entries still count as present: skipped, not deleted
        let present: HashSet<String> = snapshot
            .entries
            .iter()
            .map(|entry| map_deletion(&entry.key))
            .collect();
        let known = self.engine.known_ids_with_prefix(&self.prefix);

        let mut stats = ApplyStats::new();
        for entry in &snapshot.entries {
            apply_entry(&self.engine, entry, &mut stats)?;
        }

        let mut absent: Vec<&String> = known.difference(&present).collect();
        absent.sort();
        for id in absent {
            // An id rewritten after the snapshot holds a newer revision and
            // survives as a stale delete
            apply_deletion(&self.engine, id, snapshot.revision, &mut stats)?;
        }

        self.engine.commit()?;
        let pruned = self
            .engine
            .prune_tombstones(self.status.prune_floor(snapshot.revision));
        self.status.record_apply(&stats);

        Ok(ReconcileReport {
            revision: snapshot.revision,
            entries: snapshot.len(),
            stats,
            pruned,
            duration_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsearch_index::IndexConfig;
    use kvsearch_store::MemoryStore;
    use kvsearch_types::IndexedDocument;

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: Arc<IndexEngine>,
        reconciler: Reconciler,
    }

    fn fixture(prefix: &str) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(IndexEngine::new(IndexConfig::default().with_memory_mb(15)).unwrap());
        let reconciler = Reconciler::new(
            store.clone(),
            engine.clone(),
            Arc::new(SyncStatus::new()),
            prefix,
        );
        Fixture {
            store,
            engine,
            reconciler,
        }
    }

    fn completed(outcome: ReconcileOutcome) -> ReconcileReport {
        match outcome {
            ReconcileOutcome::Completed(report) => report,
            ReconcileOutcome::Skipped => panic!("pass was skipped"),
        }
    }

    #[tokio::test]
    async fn test_pass_converges_on_snapshot() {
        let f = fixture("a/");
        f.store.put("a/1", "hello");
        f.store.put("a/2", "world");
        f.store.put("b/1", "outside prefix");

        // Stale and extra state in the index
        f.engine
            .upsert(IndexedDocument::new("a/1", 1).with_field("value", "outdated"))
            .unwrap();
        f.engine
            .upsert(IndexedDocument::new("a/gone", 1).with_field("value", "orphan"))
            .unwrap();
        f.engine
            .upsert(IndexedDocument::new("b/kept", 1).with_field("value", "other prefix"))
            .unwrap();

        // Store copy of a/1 moves past the indexed one
        f.store.put("a/1", "hello");

        let report = completed(f.reconciler.reconcile(OverlapPolicy::Skip).await.unwrap());
        assert_eq!(report.revision, 4);
        assert_eq!(report.entries, 2);
        assert_eq!(report.stats.deleted, 1);

        let ids = f.engine.known_ids_with_prefix("a/");
        assert_eq!(ids, HashSet::from(["a/1".to_string(), "a/2".to_string()]));
        assert_eq!(f.engine.get("a/1").unwrap().revision, 4);
        assert!(f.engine.query("outdated", 10).unwrap().is_empty());
        // Ids outside the prefix are not ours to delete
        assert!(f.engine.get("b/kept").is_some());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_kept_present() {
        let f = fixture("a/");
        f.store.put("a/1", "valid");
        completed(f.reconciler.reconcile(OverlapPolicy::Skip).await.unwrap());

        f.store.put("a/1", vec![0xff, 0xfe]);
        let report = completed(f.reconciler.reconcile(OverlapPolicy::Skip).await.unwrap());

        assert_eq!(report.stats.malformed, 1);
        assert_eq!(report.stats.deleted, 0);
        assert!(f.engine.get("a/1").is_some());
    }

    #[tokio::test]
    async fn test_newer_index_state_survives_stale_snapshot() {
        let f = fixture("a/");
        f.store.put("a/2", "old");

        // The watcher already applied a later revision
        f.engine
            .upsert(IndexedDocument::new("a/2", 10).with_field("value", "x"))
            .unwrap();
        f.engine
            .upsert(IndexedDocument::new("a/3", 11).with_field("value", "y"))
            .unwrap();

        let report = completed(f.reconciler.reconcile(OverlapPolicy::Skip).await.unwrap());
        assert_eq!(report.stats.stale, 2);
        assert_eq!(f.engine.get("a/2").unwrap().fields.get("value").unwrap(), "x");
        assert!(f.engine.get("a/3").is_some());
    }

    #[tokio::test]
    async fn test_tombstones_pruned_after_pass() {
        let f = fixture("a/");
        f.store.put("a/1", "one");
        f.engine.delete("a/old", 1).unwrap();

        let report = completed(f.reconciler.reconcile(OverlapPolicy::Skip).await.unwrap());
        assert_eq!(report.pruned, 1);
        assert_eq!(f.engine.stats().tombstones, 0);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_index_untouched() {
        let f = fixture("a/");
        f.store.put("a/1", "one");
        completed(f.reconciler.reconcile(OverlapPolicy::Skip).await.unwrap());

        f.store.set_unavailable(true);
        let result = f.reconciler.reconcile(OverlapPolicy::Skip).await;
        assert!(matches!(result, Err(SyncError::Store(_))));
        assert!(f.engine.get("a/1").is_some());
        assert!(!f.reconciler.is_running());
    }

    #[tokio::test]
    async fn test_skip_when_pass_running() {
        let f = fixture("a/");
        let _held = f.reconciler.guard.acquire(OverlapPolicy::Wait).await.unwrap();
        let outcome = f.reconciler.reconcile(OverlapPolicy::Skip).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Skipped));
    }
}
