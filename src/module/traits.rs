//! Module system traits and interfaces
//!
//! Defines the error taxonomy, the opaque module object type, and the traits
//! the loader uses to retrieve and initialize code units.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

use crate::module::id::ModuleId;
use crate::module::registry::ModuleRegistry;

/// Published interface of a module.
///
/// Opaque to the registry and shared by reference with every caller of
/// [`ModuleRegistry::get`].
pub type ModuleObject = Arc<dyn Any + Send + Sync>;

/// Result alias used throughout the module system
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Module system errors
///
/// `Clone` because a single in-flight load hands the same outcome to every
/// concurrent caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("Invalid module: {0}")]
    InvalidModule(String),

    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module initialization failed: {0}")]
    InitializationError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Code unit not found: {0}")]
    SourceNotFound(String),

    #[error("Failed to fetch code unit: {0}")]
    FetchError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ModuleError {
    /// Short, stable name of the error kind (used in events and reports)
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleError::InvalidModule(_) => "InvalidModule",
            ModuleError::InvalidDependency(_) => "InvalidDependency",
            ModuleError::DependencyNotFound(_) => "DependencyNotFound",
            ModuleError::CircularDependency(_) => "CircularDependency",
            ModuleError::ModuleNotFound(_) => "ModuleNotFound",
            ModuleError::InitializationError(_) => "InitializationError",
            ModuleError::Timeout(_) => "TimeoutError",
            ModuleError::SourceNotFound(_) => "SourceNotFound",
            ModuleError::FetchError(_) => "FetchError",
            ModuleError::ConfigError(_) => "ConfigError",
        }
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::ConfigError(e.to_string())
    }
}

/// Context handed to a code unit's initialization hook
#[derive(Clone)]
pub struct InitContext {
    /// Resolved locator the unit was fetched from
    pub locator: String,
    /// Module id derived from the locator, if one could be derived
    pub module_id: Option<ModuleId>,
    /// Registry the unit may publish itself into
    pub registry: Arc<ModuleRegistry>,
}

impl std::fmt::Debug for InitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitContext")
            .field("locator", &self.locator)
            .field("module_id", &self.module_id)
            .finish_non_exhaustive()
    }
}

/// A fetched, executable code unit
///
/// The analogue of "import a module and get its default export": the loader
/// fetches one of these per locator and runs its initialization hook at most
/// once per successful load.
#[async_trait]
pub trait CodeUnit: Send + Sync {
    /// Published interface of the unit
    fn exports(&self) -> ModuleObject;

    /// Whether the unit exposes an initialization hook
    fn has_init(&self) -> bool {
        false
    }

    /// Run the initialization hook
    ///
    /// Typically publishes the unit through `context.registry.register(..)`.
    async fn init(&self, _context: InitContext) -> Result<()> {
        Ok(())
    }
}

/// Capability used by the loader to retrieve code units
///
/// Implementations must tolerate the same locator being fetched more than
/// once; the loader itself never issues two concurrent fetches for one
/// locator.
#[async_trait]
pub trait CodeUnitSource: Send + Sync {
    /// Retrieve and execute the unit at `locator`
    ///
    /// A locator with nothing behind it should fail with
    /// [`ModuleError::SourceNotFound`]; diagnostics rely on the distinction.
    async fn fetch(&self, locator: &str) -> Result<Arc<dyn CodeUnit>>;
}
