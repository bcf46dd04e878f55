//! Bounded exponential-backoff retries for upstream calls.
//!
//! Every upstream call this crate makes is an idempotent read (embed, query,
//! complete), so retrying a transient failure never duplicates a side effect.

use crate::config::RetryConfig;
use crate::error::UpstreamError;
use std::future::Future;
use std::time::Duration;

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `RateLimited` (respects `retry_after_secs`), `Connection` and `Timeout`.
/// Permanent errors (auth, parse, not found, API rejections) return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, UpstreamError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    service = %e.service(),
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient upstream error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is retryable (transient).
fn is_retryable(err: &UpstreamError) -> bool {
    matches!(
        err,
        UpstreamError::RateLimited { .. }
            | UpstreamError::Connection { .. }
            | UpstreamError::Timeout { .. }
    )
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &UpstreamError) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    if let UpstreamError::RateLimited {
        retry_after_secs, ..
    } = err
    {
        return (retry_after_secs * 1000).min(config.max_backoff_ms).max(computed);
    }
    computed
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Cheap pseudo-random fraction in [0, 1) for jitter.
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
