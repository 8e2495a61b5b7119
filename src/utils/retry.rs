//! Retry utilities for fault tolerance
//!
//! Provides retry logic with a fixed delay between attempts.

use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration: a bounded number of attempts a fixed delay apart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first (at least one attempt is made)
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl RetryConfig {
    /// `retries` retries after the first attempt, `delay` apart
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            delay,
        }
    }
}

/// Retry an async operation, calling `on_failure(attempt, &error)` after
/// every failed attempt (attempts are numbered from 1)
pub async fn retry_async_observed<F, Fut, T, E, O>(
    config: &RetryConfig,
    mut operation: F,
    mut on_failure: O,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    O: FnMut(u32, &E),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                on_failure(attempt, &e);
                if attempt >= max_attempts {
                    return Err(e);
                }
                tracing::debug!(
                    "Async operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt,
                    max_attempts,
                    e,
                    config.delay
                );
                sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}
