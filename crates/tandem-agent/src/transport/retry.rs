//! Exponential-backoff retry for request/response calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{AgentError, Result};

/// Bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// Transient failures (see [`AgentError::is_transient`]) are retried.
    /// Any request failure that ends the loop is reported as
    /// [`AgentError::Transport`] carrying the last cause; other errors pass
    /// through untouched.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            debug!(label, attempt, max_attempts, "request attempt");

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !matches!(err, AgentError::Request { .. }) {
                return Err(err);
            }

            if !err.is_transient() || attempt == max_attempts {
                warn!(label, attempt, error = %err, "request failed, giving up");
                return Err(AgentError::Transport {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            let delay = self.delay_after(attempt);
            warn!(label, attempt, error = %err, delay = ?delay, "transient failure, retrying");
            tokio::time::sleep(delay).await;
        }

        Err(AgentError::Transport {
            attempts: max_attempts,
            reason: "retry budget exhausted".into(),
        })
    }
}
