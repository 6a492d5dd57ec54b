//! Bounded retry-on-throttle for single upstream calls.
//!
//! [`with_retry`] re-invokes an operation only while its error classifies as
//! [`RetryPolicy::Retryable`]; any other failure is returned on first
//! occurrence. Back-off is linear (`base_delay * attempt`), capped at
//! `max_delay`, and raised to the upstream's `Retry-After` hint when one was
//! given. Waiting uses `tokio::time::sleep` so other requests keep running.
//!
//! The envelope must wrap only the idempotent upstream call itself. Quota
//! mutation never happens inside it.

use std::future::Future;
use std::time::Duration;

use pipeline::{RetryClassification, RetryPolicy};
use tracing::{debug, warn};

/// Configuration for retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total invocations allowed, first attempt included (default: 3).
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `n * base_delay` (default: 1 second).
    pub base_delay: Duration,
    /// Upper bound for any single wait (default: 10 seconds).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Delay after failed attempt `attempt` (1-indexed), before any upstream hint.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    config
        .base_delay
        .saturating_mul(attempt.max(1))
        .min(config.max_delay)
}

/// Runs `op`, retrying throttled failures up to `config.max_attempts` total
/// invocations.
///
/// `label` names the upstream in log events. After the last attempt the final
/// error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(label: &str, config: &RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassification + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(upstream = label, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let hint = match err.retry_policy() {
            RetryPolicy::Retryable { after } if attempt < max_attempts => after,
            RetryPolicy::Retryable { .. } => {
                warn!(upstream = label, attempts = attempt, error = %err, "retries exhausted");
                return Err(err);
            }
            RetryPolicy::NonRetryable => return Err(err),
        };

        let delay = compute_delay(config, attempt).max(hint.unwrap_or_default().min(config.max_delay));
        warn!(
            upstream = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "throttled, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
