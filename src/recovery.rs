use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry strategy for operations that may fail until the kernel finishes
/// setting up drivers and attributes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Double the delay after every failure
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            exponential_backoff: false,
        }
    }
}

impl RetryPolicy {
    /// Try once, no waiting
    pub fn once() -> Self {
        Self::default()
    }

    /// Fixed-interval polling, as used while waiting for sysfs at boot
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: interval,
            max_delay: interval,
            exponential_backoff: false,
        }
    }

    /// Delay before attempt `retry_count + 2`
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        if !self.exponential_backoff {
            return self.base_delay;
        }

        let factor = 2_u32.saturating_pow(retry_count);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Run `operation` until it succeeds or the attempts run out; the last
    /// error is returned
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("{} succeeded after {} retries", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt + 1 >= self.max_attempts => {
                    warn!("{} failed after {} attempts: {}", what, attempt + 1, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.calculate_delay(attempt);
                    debug!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay
                    );
                    attempt += 1;
                    sleep(delay).await;
                }
            }
        }
    }
}
