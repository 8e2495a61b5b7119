//! Utility modules for fault tolerance and resilience

pub mod error;
pub mod lock;
pub mod logging;
pub mod retry;
pub mod time;
pub mod timeout;

// Re-export commonly used items
pub use error::log_error_async;
pub use lock::{lock, read_lock, with_read_lock, with_write_lock, write_lock};
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use retry::{retry_async_observed, RetryConfig};
pub use time::current_timestamp;
pub use timeout::{with_module_timeout, DEFAULT_LOAD_TIMEOUT};
