//! Sync status registry.
//!
//! Shared between the watcher, the scanner and the API so operators can see
//! how fresh the index is.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kvsearch_types::Revision;

use crate::apply::ApplyStats;

/// Result of one scanner tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanResult {
    /// Pass completed and the index was reconciled
    Success,
    /// Pass failed; the next tick retries
    Failed(String),
    /// Another pass was running
    Skipped,
}

/// Lifecycle of the watch loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WatcherState {
    #[default]
    Starting,
    /// Applying changes from a live stream
    Streaming,
    /// Stream ended; reconciling before resubscribing
    Recovering,
    Stopped,
}

impl std::fmt::Display for WatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WatcherState::Starting => "starting",
            WatcherState::Streaming => "streaming",
            WatcherState::Recovering => "recovering",
            WatcherState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// When the last scan finished
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_scan_duration_ms: Option<u64>,
    pub last_scan_result: Option<ScanResult>,
    /// Completed scans
    pub scan_count: u64,
    pub skipped_scans: u64,
    pub failed_scans: u64,

    pub watcher_state: WatcherState,
    /// Times the watch stream was re-established after ending
    pub watch_restarts: u64,
    /// Highest revision the watcher has applied or resumed after
    pub watch_revision: Option<Revision>,

    /// Highest revision reflected in the index by either path
    pub last_revision: Revision,

    /// Totals across both update paths
    pub applied: u64,
    pub stale: u64,
    pub malformed: u64,
    pub deleted: u64,
}

/// Thread-safe sync status.
#[derive(Debug, Default)]
pub struct SyncStatus {
    report: RwLock<SyncReport>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SyncReport> {
        self.report.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SyncReport> {
        self.report.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the end of a scanner tick.
    pub fn record_scan(&self, result: ScanResult, duration_ms: u64) {
        let mut report = self.write();
        match result {
            ScanResult::Success => report.scan_count += 1,
            ScanResult::Failed(_) => report.failed_scans += 1,
            ScanResult::Skipped => {
                report.skipped_scans += 1;
                return;
            }
        }
        report.last_scan_at = Some(Utc::now());
        report.last_scan_duration_ms = Some(duration_ms);
        report.last_scan_result = Some(result);
    }

    /// Fold write counters from either update path.
    pub fn record_apply(&self, stats: &ApplyStats) {
        let mut report = self.write();
        report.applied += stats.applied as u64;
        report.stale += stats.stale as u64;
        report.malformed += stats.malformed as u64;
        report.deleted += stats.deleted as u64;
        report.last_revision = report.last_revision.max(stats.last_revision);
    }

    pub fn set_watcher_state(&self, state: WatcherState) {
        self.write().watcher_state = state;
    }

    pub fn record_watch_restart(&self) {
        self.write().watch_restarts += 1;
    }

    /// Record that the watcher has seen everything up to `revision`.
    pub fn set_watch_revision(&self, revision: Revision) {
        let mut report = self.write();
        report.watch_revision = Some(report.watch_revision.map_or(revision, |r| r.max(revision)));
        report.last_revision = report.last_revision.max(revision);
    }

    /// Highest revision below which tombstones may be dropped after a pass
    /// read at `snapshot_revision`.
    ///
    /// Bounded by watcher progress: a watcher still behind may yet deliver an
    /// older PUT for a deleted id.
    pub fn prune_floor(&self, snapshot_revision: Revision) -> Revision {
        match self.read().watch_revision {
            Some(watched) => watched.min(snapshot_revision),
            None => snapshot_revision,
        }
    }

    pub fn watcher_state(&self) -> WatcherState {
        self.read().watcher_state
    }

    pub fn snapshot(&self) -> SyncReport {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_scan_results() {
        let status = SyncStatus::new();
        status.record_scan(ScanResult::Success, 12);
        status.record_scan(ScanResult::Skipped, 0);
        status.record_scan(ScanResult::Failed("store down".into()), 3);

        let report = status.snapshot();
        assert_eq!(report.scan_count, 1);
        assert_eq!(report.skipped_scans, 1);
        assert_eq!(report.failed_scans, 1);
        assert_eq!(
            report.last_scan_result,
            Some(ScanResult::Failed("store down".into()))
        );
        assert_eq!(report.last_scan_duration_ms, Some(3));
    }

    #[test]
    fn test_skipped_scan_keeps_last_result() {
        let status = SyncStatus::new();
        status.record_scan(ScanResult::Success, 5);
        status.record_scan(ScanResult::Skipped, 0);
        assert_eq!(status.snapshot().last_scan_result, Some(ScanResult::Success));
    }

    #[test]
    fn test_record_apply_accumulates() {
        let status = SyncStatus::new();
        let stats = ApplyStats {
            applied: 2,
            tombstoned: 0,
            stale: 1,
            malformed: 1,
            deleted: 0,
            last_revision: 9,
        };
        status.record_apply(&stats);
        status.record_apply(&ApplyStats {
            last_revision: 4,
            ..stats.clone()
        });

        let report = status.snapshot();
        assert_eq!(report.applied, 4);
        assert_eq!(report.malformed, 2);
        assert_eq!(report.last_revision, 9);
    }

    #[test]
    fn test_prune_floor_follows_watcher() {
        let status = SyncStatus::new();
        assert_eq!(status.prune_floor(50), 50);

        status.set_watch_revision(30);
        assert_eq!(status.prune_floor(50), 30);
        assert_eq!(status.prune_floor(20), 20);

        // Watch progress never moves backwards
        status.set_watch_revision(10);
        assert_eq!(status.snapshot().watch_revision, Some(30));
    }

    #[test]
    fn test_watcher_state() {
        let status = SyncStatus::new();
        assert_eq!(status.watcher_state(), WatcherState::Starting);
        status.set_watcher_state(WatcherState::Recovering);
        status.record_watch_restart();
        assert_eq!(status.watcher_state(), WatcherState::Recovering);
        assert_eq!(status.watcher_state().to_string(), "recovering");
        assert_eq!(status.snapshot().watch_restarts, 1);
    }
}
