//! Module loading system
//!
//! Handles dynamic loading of code units, locator resolution, and the fetch
//! plan of pre-registered locators and dependencies.

pub mod loader;
pub mod locator;
pub mod plan;

pub use loader::{
    DependencyCheck, DependencyIssue, DependencyProblem, DynamicLoader, FailedLoad, LoadOptions,
    LoadState, LoaderReport, ModuleDiagnosis, PlanTreeNode, RegisterModuleOptions,
};
pub use locator::{derive_module_id, resolve_locator};
pub use plan::{FetchPlan, PlanEntry, PlanUpdate};
