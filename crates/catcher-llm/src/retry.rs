//! Retry of transient completion failures.

use std::future::Future;
use std::time::Duration;

use catcher_types::{CatcherError, Result};

/// Delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    None,
}

impl Backoff {
    /// Delay after the 0-indexed `attempt` failed.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential { base, max } => {
                let millis = (base.as_millis() as u64)
                    .saturating_mul(2u64.saturating_pow(attempt as u32));
                Duration::from_millis(millis).min(*max)
            }
            Backoff::None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff: Backoff,
    /// Upper bound on a server-requested wait (rate limiting).
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(4),
            },
            max_wait: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::None,
            max_wait: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: usize, error: &CatcherError) -> Duration {
        match error {
            CatcherError::RateLimited { retry_after_ms, .. } => {
                Duration::from_millis(*retry_after_ms).min(self.max_wait)
            }
            _ => self.backoff.delay_for_attempt(attempt),
        }
    }

    /// Run `f` until it succeeds, fails for good, or the retries run out.
    /// The last error is returned as is.
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay(attempt, &e);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Transient completion failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
