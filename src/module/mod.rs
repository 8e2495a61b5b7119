//! Module system
//!
//! This module provides the registry of published modules and the dynamic
//! loader that fetches, wires up and initializes them.
//!
//! ## Architecture
//!
//! - **Registry**: Named, namespaced modules with declared dependency edges;
//!   registration never admits a cycle
//! - **Loader**: Fetches code units by locator, loads their dependencies first,
//!   runs each init hook once and deduplicates concurrent loads
//! - **Events**: Synchronous pub/sub for registrations, loads and failures
//! - **Diagnostics**: Read-only reports over registry and loader state

pub mod api;
pub mod diagnostics;
pub mod id;
pub mod loader;
pub mod registry;
pub mod traits;

pub use api::{EventKind, RegistryEvent, SubscriptionId};
pub use diagnostics::{Diagnostics, PathProbe, ProbeFailure, SystemReport};
pub use id::{make_id, ModuleId};
pub use loader::{DynamicLoader, LoadOptions, LoadState, LoaderReport, RegisterModuleOptions};
pub use registry::{ModuleRegistry, RegistrationMetadata};
pub use traits::{CodeUnit, CodeUnitSource, InitContext, ModuleError, ModuleObject, Result};
