//! Registry records and query results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::module::id::ModuleId;
use crate::module::traits::ModuleObject;

/// Metadata stored alongside a registered module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub namespace: String,
    pub name: String,
    /// Unix timestamp (seconds) of registration
    pub registered_at: u64,
    /// Set when a declared dependency was not loaded at registration time
    pub has_missing_dependencies: bool,
    /// Client-provided fields, merged by `update_metadata`
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Metadata and policy flags supplied to `ModuleRegistry::register`
#[derive(Debug, Clone, Default)]
pub struct RegistrationMetadata {
    /// Fail with `InvalidDependency` instead of dropping malformed entries
    pub require_valid_dependencies: bool,
    /// Fail with `DependencyNotFound` instead of flagging missing entries
    pub require_all_dependencies: bool,
    /// Client fields stored verbatim in the record's metadata
    pub fields: Map<String, Value>,
}

impl RegistrationMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_valid_dependencies(mut self, yes: bool) -> Self {
        self.require_valid_dependencies = yes;
        self
    }

    pub fn require_all_dependencies(mut self, yes: bool) -> Self {
        self.require_all_dependencies = yes;
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A registered module
#[derive(Clone)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub object: ModuleObject,
    pub dependencies: Vec<ModuleId>,
    pub metadata: ModuleMetadata,
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Recursive view of a module's declared dependencies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    pub id: ModuleId,
    /// Whether the node is registered
    pub loaded: bool,
    /// Node already appears on the path from the root; children not expanded
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub circular: bool,
    pub dependencies: Vec<DependencyTree>,
}

/// Outcome of `ModuleRegistry::load_dependencies`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub success: bool,
    pub loaded_dependencies: Vec<ModuleId>,
    pub missing_dependencies: Vec<ModuleId>,
}

/// Outcome of `ModuleRegistry::safe_get`
#[derive(Clone, Default)]
pub struct SafeGetResult {
    pub success: bool,
    pub module: Option<ModuleObject>,
    pub dependency_result: Option<DependencyStatus>,
}

impl fmt::Debug for SafeGetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeGetResult")
            .field("success", &self.success)
            .field("module", &self.module.as_ref().map(|_| ".."))
            .field("dependency_result", &self.dependency_result)
            .finish()
    }
}
