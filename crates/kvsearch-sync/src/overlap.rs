//! Overlap policy for reconciliation passes.
//!
//! At most one reconciliation runs at a time. A caller that finds a pass
//! already running either gives up (the scanner, whose next tick will catch
//! up) or queues behind it (the watcher, which must not resubscribe before
//! its own pass has closed the gap).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// What to do when a reconciliation is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverlapPolicy {
    /// Skip this pass. The skipped pass is recorded in the status registry.
    #[default]
    Skip,

    /// Wait for the running pass to finish, then run.
    Wait,
}

/// Serializes reconciliation passes.
#[derive(Debug, Clone, Default)]
pub struct OverlapGuard {
    running: Arc<Mutex<()>>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard according to `policy`.
    ///
    /// Returns `None` only for [`OverlapPolicy::Skip`] when a pass is running.
    pub async fn acquire(&self, policy: OverlapPolicy) -> Option<RunGuard> {
        let permit = match policy {
            OverlapPolicy::Skip => self.running.clone().try_lock_owned().ok()?,
            OverlapPolicy::Wait => self.running.clone().lock_owned().await,
        };
        Some(RunGuard { _permit: permit })
    }

    /// Check if a pass is currently running.
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }
}

/// RAII guard that ends the pass when dropped, including when the pass
/// future is dropped mid-flight.
pub struct RunGuard {
    _permit: OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_skip_while_running() {
        let guard = OverlapGuard::new();

        let run1 = guard.acquire(OverlapPolicy::Skip).await;
        assert!(run1.is_some());
        assert!(guard.is_running());

        assert!(guard.acquire(OverlapPolicy::Skip).await.is_none());

        drop(run1);
        assert!(!guard.is_running());
        assert!(guard.acquire(OverlapPolicy::Skip).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_queues_behind_running_pass() {
        let guard = OverlapGuard::new();
        let run1 = guard.acquire(OverlapPolicy::Wait).await.unwrap();

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.acquire(OverlapPolicy::Wait).await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(run1);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_future_releases_guard() {
        let guard = OverlapGuard::new();
        {
            let _run = guard.acquire(OverlapPolicy::Skip).await.unwrap();
            assert!(guard.is_running());
        }
        assert!(!guard.is_running());
    }

    #[test]
    fn test_overlap_policy_default() {
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Skip);
    }

    #[test]
    fn test_overlap_policy_serialization() {
        let json = serde_json::to_string(&OverlapPolicy::Wait).unwrap();
        let back: OverlapPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OverlapPolicy::Wait);
    }
}
