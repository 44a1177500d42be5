use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Backoff for remote writes: the delay doubles after each failure up to
/// `max_delay`. `max_attempts = None` retries until success or cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_delay: DEFAULT_INITIAL_DELAY, max_delay: DEFAULT_MAX_DELAY, max_attempts: None }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Errors that know whether retrying them makes sense. Only used for
/// reporting; the loop keeps going either way.
pub trait RetryClass {
    fn is_retryable(&self) -> bool;
}

impl RetryClass for crate::fedi::FediError {
    fn is_retryable(&self) -> bool { crate::fedi::FediError::is_retryable(self) }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("cancelled")]
    Cancelled,
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },
}

pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + RetryClass,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(RetryError::Exhausted { attempts: attempt, last: err });
        }

        let delay = policy.delay_for(attempt);
        warn!(what, attempt, retryable = err.is_retryable(), delay_ms = delay.as_millis() as u64, error = %err, "⚠️ attempt failed, retrying");

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
