//! Periodic reconciling scanner.
//!
//! Every interval a pass is spawned on its own task and the overlap guard
//! decides whether it runs: a tick that finds a pass in progress (its own
//! previous pass or a watcher recovery) is skipped and recorded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::jitter::JitterConfig;
use crate::overlap::OverlapPolicy;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::status::{ScanResult, SyncStatus};

/// Scanner scheduling.
#[derive(Debug, Clone, Copy)]
pub struct ScannerConfig {
    /// Time between ticks
    pub interval: Duration,
    pub jitter: JitterConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            jitter: JitterConfig::none(),
        }
    }
}

pub struct Scanner {
    reconciler: Arc<Reconciler>,
    status: Arc<SyncStatus>,
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(reconciler: Arc<Reconciler>, status: Arc<SyncStatus>, config: ScannerConfig) -> Self {
        Self {
            reconciler,
            status,
            config,
        }
    }

    /// Run one tick's pass and record its result.
    pub async fn scan_once(&self) -> ScanResult {
        scan(&self.reconciler, &self.status).await
    }

    /// Tick until `cancel` fires. The first tick comes one interval after
    /// start; the pipeline bootstrap covers time zero.
    ///
    /// On cancellation an in-flight pass is abandoned if still fetching and
    /// awaited if already applying.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            prefix = self.reconciler.prefix(),
            interval_secs = period.as_secs(),
            jitter_secs = self.config.jitter.max_jitter_secs,
            "Scanner started"
        );

        let mut passes = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            while passes.try_join_next().is_some() {}

            let reconciler = self.reconciler.clone();
            let status = self.status.clone();
            let jitter = self.config.jitter.generate_jitter();
            passes.spawn(async move {
                if !jitter.is_zero() {
                    debug!(jitter_ms = jitter.as_millis() as u64, "Applying jitter delay");
                    tokio::time::sleep(jitter).await;
                }
                scan(&reconciler, &status).await;
            });
        }

        passes.shutdown().await;
        info!("Scanner stopped");
    }
}

async fn scan(reconciler: &Reconciler, status: &SyncStatus) -> ScanResult {
    let start = Instant::now();
    let result = match reconciler.reconcile(OverlapPolicy::Skip).await {
        Ok(ReconcileOutcome::Completed(_)) => ScanResult::Success,
        Ok(ReconcileOutcome::Skipped) => {
            info!("Skipping scan, previous reconciliation still running");
            ScanResult::Skipped
        }
        Err(e) => {
            warn!(error = %e, "Scan failed, retrying next tick");
            ScanResult::Failed(e.to_string())
        }
    };
    status.record_scan(result.clone(), start.elapsed().as_millis() as u64);
    result
}
