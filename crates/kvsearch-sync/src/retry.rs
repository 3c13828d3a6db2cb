//! Exponential backoff for store-facing operations.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::warn;

use crate::error::SyncError;

/// Backoff bounds used by the watcher and the bootstrap pass.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Backoff that never gives up on its own; shutdown ends the retries.
    pub fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial)
            .with_max_interval(self.max.max(self.initial))
            .with_max_elapsed_time(None)
            .build();
        backoff.reset();
        backoff
    }
}

/// Retry `operation` while it fails with a transient error.
pub async fn retry_transient<T, F, Fut>(
    config: RetryConfig,
    what: &'static str,
    mut operation: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let op = || {
        let attempt = operation();
        async move {
            attempt.await.map_err(|e| {
                if e.is_transient() {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    };

    backoff::future::retry_notify(config.backoff(), op, |e: SyncError, delay: Duration| {
        warn!(operation = what, error = %e, retry_in_ms = delay.as_millis() as u64, "Retrying after transient error");
    })
    .await
}
