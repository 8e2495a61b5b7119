//! unitgraph - module registry and dynamic loader
//!
//! This crate keeps a registry of named, namespaced modules together with
//! their declared dependency graph, and a loader that fetches code units on
//! demand, loads what they depend on first and initializes each exactly once.
//!
//! ## Design Principles
//!
//! 1. **Acyclic by construction**: Registration never commits a dependency cycle
//! 2. **One fetch per locator**: Concurrent loads of a locator share one in-flight fetch
//! 3. **Pluggable retrieval**: Code units come from a `CodeUnitSource` supplied by the host
//! 4. **Observable**: Every registration, load and failure is published as an event
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use unitgraph::{ModuleRegistry, RegistrationMetadata};
//!
//! let registry = ModuleRegistry::new();
//! registry
//!     .register("core", "store", Arc::new(42u32), &[] as &[&str], RegistrationMetadata::new())
//!     .unwrap();
//! assert_eq!(registry.get_as::<u32>("core", "store").as_deref(), Some(&42));
//! ```

pub mod config;
pub mod module;
pub mod utils;

pub use config::{LoaderConfig, LoggingConfig, RegistryConfig, SystemConfig};
pub use module::{
    make_id, CodeUnit, CodeUnitSource, Diagnostics, DynamicLoader, EventKind, InitContext,
    LoadOptions, LoadState, ModuleError, ModuleId, ModuleObject, ModuleRegistry,
    RegisterModuleOptions, RegistrationMetadata, RegistryEvent, Result, SystemReport,
};
