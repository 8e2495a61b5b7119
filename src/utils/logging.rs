//! Logging initialization for host applications
//!
//! The library itself only emits `tracing` events; a host installs a
//! subscriber once at startup with one of these helpers:
//! - Respects RUST_LOG environment variable
//! - Falls back to the config filter, then to "info"
//! - Optional JSON output behind the `json-logging` feature
//!
//! # Usage
//!
//! ```rust
//! use unitgraph::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the filter: RUST_LOG wins, then `filter`, then "info"
fn env_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or("info"))
}

/// Initialize human-readable logging
///
/// Returns false if a global subscriber was already installed.
pub fn init_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging with JSON output (for log aggregation)
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(env_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging from a [`LoggingConfig`]
///
/// JSON output falls back to the human-readable format when the
/// `json-logging` feature is off.
pub fn init_logging_from_config(config: Option<&LoggingConfig>) -> bool {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            return init_json_logging(filter);
        }
    }
    init_logging(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_initialization_is_rejected() {
        let config = LoggingConfig {
            filter: Some("warn".to_string()),
            json_format: false,
        };
        // Whichever call runs first in this process wins; the second never does.
        let first = init_logging_from_config(Some(&config));
        let second = init_logging(None);
        assert!(!(first && second));
    }
}
