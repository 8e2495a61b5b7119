//! Timeout utilities for fault tolerance
//!
//! Provides timeout wrappers for fetches and hooks that might hang.
//!
//! **Default Timeout**: loads fall back to [`DEFAULT_LOAD_TIMEOUT`]; the
//! configured value lives in `LoaderConfig::timeout_ms` and is passed to
//! [`with_module_timeout`].

use std::time::Duration;
use tokio::time::timeout;

use crate::module::traits::{ModuleError, Result};

/// Default per-attempt timeout for code unit fetches
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a fallible module operation with a timeout
///
/// Elapsing maps to [`ModuleError::Timeout`] naming `what`.
pub async fn with_module_timeout<F, T>(operation: F, duration: Duration, what: &str) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(ModuleError::Timeout(format!("{} after {:?}", what, duration))),
    }
}
