//! Retry policy with linear backoff.

use std::time::Duration;

use tokio::time::sleep;

use crate::cancel::CancellationToken;

/// Decides whether and when a failed attempt is retried.
///
/// After the `n`th failure (1-based) the chain waits `retry_delay * n` before
/// the next attempt, as long as `n <= max_retries`. `max_retries = 0` means a
/// single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before the next attempt, given how many retries already ran.
    ///
    /// Returns `None` once the chain is exhausted.
    #[must_use]
    pub fn next_delay(&self, retries_done: u32) -> Option<Duration> {
        if retries_done >= self.max_retries {
            return None;
        }
        Some(self.retry_delay.saturating_mul(retries_done + 1))
    }

    /// Waits `delay` unless `token` is cancelled first.
    ///
    /// Returns `false` if the wait was cut short by cancellation, in which case
    /// the chain must stop without reporting an error.
    pub async fn wait(delay: Duration, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = token.cancelled() => false,
            () = sleep(delay) => !token.is_cancelled(),
        }
    }
}
