use std::future::Future;
use std::time::Duration;

use hearth_db::StoreResult;
use hearth_model::EntityDescriptor;
use tracing::warn;

/// Bounded retry of failed store calls with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub fn from_descriptor(descriptor: &EntityDescriptor) -> Self {
        Self::new(
            descriptor.retry,
            Duration::from_millis(descriptor.retry_delay_ms),
        )
    }

    /// Runs `op`, re-running it while it fails with a retryable error and
    /// attempts remain. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts && err.is_retryable() => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts = self.attempts,
                        code = %err.code,
                        "store call failed, retrying: {}",
                        err.message
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
