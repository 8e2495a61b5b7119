//! Error handling utilities for graceful degradation
//!
//! Provides helpers for the "log and carry on" pattern used where a failure is
//! not allowed to fail the caller (dependency loads, diagnostics probes).

use tracing::warn;

/// Execute an async operation and log errors without failing
///
/// Returns `Some(T)` on success, `None` on error (after logging).
///
/// # Example
/// ```rust
/// # async fn demo() {
/// use unitgraph::utils::log_error_async;
///
/// let value = log_error_async(|| async { "7".parse::<u32>() }, "Failed to parse").await;
/// assert_eq!(value, Some(7));
/// # }
/// ```
pub async fn log_error_async<F, Fut, T, E>(operation: F, context: &str) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match operation().await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_error_async_swallows() {
        let failed: Option<u32> =
            log_error_async(|| async { Err::<u32, _>("unreachable host") }, "probe").await;
        assert_eq!(failed, None);
    }
}
