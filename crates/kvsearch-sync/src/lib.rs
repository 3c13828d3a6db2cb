//! # kvsearch-sync
//!
//! Keeps the in-memory index consistent with a store prefix.
//!
//! Two independent producers write to the index:
//! - the [`Watcher`] applies the live change stream
//! - the [`Scanner`] periodically reconciles against a full snapshot
//!
//! Neither coordinates with the other beyond the reconciliation guard; the
//! index orders their writes by store revision.

pub mod apply;
pub mod error;
pub mod jitter;
pub mod overlap;
pub mod pipeline;
pub mod reconcile;
pub mod retry;
pub mod scanner;
pub mod status;
pub mod watcher;

pub use apply::{apply_batch, apply_change, ApplyStats};
pub use error::SyncError;
pub use jitter::JitterConfig;
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use pipeline::{PipelineConfig, PipelineHandle, SyncPipeline};
pub use reconcile::{ReconcileOutcome, ReconcileReport, Reconciler};
pub use retry::RetryConfig;
pub use scanner::{Scanner, ScannerConfig};
pub use status::{ScanResult, SyncReport, SyncStatus, WatcherState};
pub use watcher::Watcher;
