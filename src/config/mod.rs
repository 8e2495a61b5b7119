//! Configuration management
//!
//! Handles configuration loading and validation for the registry, the loader
//! and logging. Every field has a serde default, so partial files are fine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::module::registry::DEFAULT_MAX_DEPTH;
use crate::utils::timeout::DEFAULT_LOAD_TIMEOUT;

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Depth bound for cycle detection
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Dynamic loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Prefix joined onto relative locators (empty = no prefix)
    #[serde(default)]
    pub base_url: String,

    /// Locator aliases (`alias` or `alias/rest` is rewritten to `path/rest`)
    #[serde(default)]
    pub aliases: HashMap<String, String>,

    /// Extension appended to locators whose last segment has none
    #[serde(default)]
    pub default_extension: Option<String>,

    /// Per-attempt fetch timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Depth bound for dependency tree checks
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_LOAD_TIMEOUT.as_millis() as u64
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            aliases: HashMap::new(),
            default_extension: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl LoaderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Validate loader configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("loader timeout_ms must be greater than 0"));
        }
        if self.max_depth == 0 {
            return Err(anyhow::anyhow!("loader max_depth must be greater than 0"));
        }
        if let Some(ext) = &self.default_extension {
            if ext.is_empty() || ext.contains('/') {
                return Err(anyhow::anyhow!(
                    "default_extension {:?} must be a non-empty extension without '/'",
                    ext
                ));
            }
        }
        for (alias, path) in &self.aliases {
            if alias.is_empty() || path.is_empty() {
                return Err(anyhow::anyhow!(
                    "alias {:?} -> {:?}: alias and path must be non-empty",
                    alias,
                    path
                ));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "unitgraph=debug"); RUST_LOG takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl SystemConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SystemConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SystemConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.registry.max_depth == 0 {
            return Err(anyhow::anyhow!("registry max_depth must be greater than 0"));
        }
        self.loader.validate()
    }
}
