//! Module registry
//!
//! Source of truth for published modules: their interface objects, declared
//! dependency edges and metadata. Registration is validate-then-commit under a
//! single write lock, so a rejected registration leaves no trace. The registry
//! is append-only for its lifetime; there is no unregister.

pub mod cycle;
pub mod dependencies;
pub mod graph;
pub mod record;

pub use cycle::{CycleDetector, DEFAULT_MAX_DEPTH};
pub use dependencies::DependencyValidator;
pub use graph::{DeclaredDependencyGraph, DependencyLookup};
pub use record::{
    DependencyStatus, DependencyTree, ModuleMetadata, ModuleRecord, RegistrationMetadata,
    SafeGetResult,
};

use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::module::api::events::{EventKind, EventManager, RegistryEvent, SubscriptionId};
use crate::module::id::ModuleId;
use crate::module::traits::{ModuleError, ModuleObject, Result};
use crate::utils::lock::{read_lock, with_read_lock, write_lock};
use crate::utils::time::current_timestamp;

#[derive(Default)]
struct RegistryState {
    records: HashMap<ModuleId, ModuleRecord>,
    graph: DeclaredDependencyGraph,
}

/// Registry of published modules
///
/// Construct one per process and share it as `Arc<ModuleRegistry>`.
pub struct ModuleRegistry {
    state: RwLock<RegistryState>,
    events: EventManager,
    detector: CycleDetector,
    initialized: AtomicBool,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.len())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// Create an empty registry with default settings
    pub fn new() -> Self {
        Self::with_config(&RegistryConfig::default())
    }

    /// Create an empty registry
    pub fn with_config(config: &RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            events: EventManager::new(),
            detector: CycleDetector::new(config.max_depth),
            initialized: AtomicBool::new(false),
        }
    }

    /// Publish a module
    ///
    /// Re-registering an existing id is a logged no-op; the first object stays.
    /// Malformed dependency strings are dropped (or rejected with
    /// `require_valid_dependencies`), a dependency cycle is always rejected,
    /// and dependencies that are not registered yet flag the record and raise
    /// a `DependencyError` event (or are rejected with
    /// `require_all_dependencies`). On any error the registry is unchanged.
    pub fn register<S: AsRef<str>>(
        &self,
        namespace: &str,
        name: &str,
        object: ModuleObject,
        dependencies: &[S],
        metadata: RegistrationMetadata,
    ) -> Result<&Self> {
        let id = ModuleId::new(namespace, name)?;
        let mut pending = Vec::with_capacity(2);

        {
            let mut state = write_lock(&self.state);

            if state.records.contains_key(&id) {
                debug!("Module {} already registered, ignoring", id);
                return Ok(self);
            }

            let invalid = DependencyValidator::validate_format(dependencies);
            if !invalid.is_empty() {
                if metadata.require_valid_dependencies {
                    return Err(ModuleError::InvalidDependency(format!(
                        "{} declares malformed dependencies {:?}",
                        id, invalid
                    )));
                }
                warn!("Dropping malformed dependencies of {}: {:?}", id, invalid);
            }
            let deps = DependencyValidator::parse_valid(dependencies);

            if self.detector.has_cycle(&id, &deps, &state.graph) {
                return Err(ModuleError::CircularDependency(format!(
                    "registering {} with dependencies {:?} would create a cycle",
                    id,
                    render(&deps)
                )));
            }

            let missing = DependencyValidator::validate_existence_with(&render(&deps), |dep| {
                state.records.contains_key(dep)
            });
            if !missing.is_empty() && metadata.require_all_dependencies {
                return Err(ModuleError::DependencyNotFound(format!(
                    "{} requires unregistered modules {:?}",
                    id, missing
                )));
            }
            if !missing.is_empty() {
                warn!("Module {} registered with missing dependencies {:?}", id, missing);
            }

            let record = ModuleRecord {
                id: id.clone(),
                object,
                dependencies: deps.clone(),
                metadata: ModuleMetadata {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    registered_at: current_timestamp(),
                    has_missing_dependencies: !missing.is_empty(),
                    fields: metadata.fields,
                },
            };
            state.graph.set_dependencies(id.clone(), deps.clone());
            state.records.insert(id.clone(), record);

            if !missing.is_empty() || !invalid.is_empty() {
                pending.push(RegistryEvent::DependencyError {
                    id: id.clone(),
                    missing,
                    invalid,
                });
            }
            pending.push(RegistryEvent::Register {
                id: id.clone(),
                dependencies: deps,
            });
        }

        info!("Registered module {}", id);
        for event in &pending {
            self.events.publish(event);
        }
        Ok(self)
    }

    /// Published object of a module, or `None` (logged) if absent
    pub fn get(&self, namespace: &str, name: &str) -> Option<ModuleObject> {
        let id = key(namespace, name)?;
        let object = read_lock(&self.state)
            .records
            .get(&id)
            .map(|record| Arc::clone(&record.object));
        if object.is_none() {
            debug!("Module {} not found", id);
        }
        object
    }

    /// Published object of a module, failing with `ModuleNotFound` if absent
    pub fn get_or_err(&self, namespace: &str, name: &str) -> Result<ModuleObject> {
        self.get(namespace, name)
            .ok_or_else(|| ModuleError::ModuleNotFound(format!("{}.{}", namespace, name)))
    }

    /// Published object downcast to its concrete type
    pub fn get_as<T: Any + Send + Sync>(&self, namespace: &str, name: &str) -> Option<Arc<T>> {
        self.get(namespace, name)?.downcast::<T>().ok()
    }

    pub fn is_loaded(&self, namespace: &str, name: &str) -> bool {
        key(namespace, name).is_some_and(|id| self.contains(&id))
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &ModuleId) -> bool {
        read_lock(&self.state).records.contains_key(id)
    }

    /// Full record of a registered module
    pub fn record(&self, namespace: &str, name: &str) -> Option<ModuleRecord> {
        let id = key(namespace, name)?;
        read_lock(&self.state).records.get(&id).cloned()
    }

    /// Declared dependencies; empty for unknown modules
    pub fn get_dependencies(&self, namespace: &str, name: &str) -> Vec<ModuleId> {
        key(namespace, name)
            .and_then(|id| {
                read_lock(&self.state)
                    .graph
                    .dependencies_of(&id)
                    .map(<[ModuleId]>::to_vec)
            })
            .unwrap_or_default()
    }

    /// Replace a module's declared dependencies
    ///
    /// Rejects self-references and any dependency whose own declared
    /// dependencies already point back at this module. This is a one-hop
    /// check: longer cycles are not detected here.
    pub fn update_dependencies<S: AsRef<str>>(
        &self,
        namespace: &str,
        name: &str,
        new_deps: &[S],
    ) -> bool {
        let Some(id) = key(namespace, name) else {
            return false;
        };
        let mut state = write_lock(&self.state);
        if !state.records.contains_key(&id) {
            warn!("Cannot update dependencies of unregistered module {}", id);
            return false;
        }

        let invalid = DependencyValidator::validate_format(new_deps);
        if !invalid.is_empty() {
            warn!("Dropping malformed dependencies of {}: {:?}", id, invalid);
        }
        let deps = DependencyValidator::parse_valid(new_deps);

        if deps.contains(&id) {
            warn!("Rejected dependency update: {} cannot depend on itself", id);
            return false;
        }
        if let Some(back) = deps.iter().find(|dep| {
            state
                .graph
                .dependencies_of(dep)
                .is_some_and(|theirs| theirs.contains(&id))
        }) {
            warn!(
                "Rejected dependency update: {} already depends on {}",
                back, id
            );
            return false;
        }

        let has_missing = deps.iter().any(|dep| !state.records.contains_key(dep));
        state.graph.set_dependencies(id.clone(), deps.clone());
        if let Some(record) = state.records.get_mut(&id) {
            record.dependencies = deps;
            record.metadata.has_missing_dependencies = has_missing;
        }
        debug!("Updated dependencies of {}", id);
        true
    }

    /// Merge client fields into a module's metadata
    pub fn update_metadata(&self, namespace: &str, name: &str, fields: Map<String, Value>) -> bool {
        let Some(id) = key(namespace, name) else {
            return false;
        };
        match write_lock(&self.state).records.get_mut(&id) {
            Some(record) => {
                record.metadata.fields.extend(fields);
                true
            }
            None => {
                warn!("Cannot update metadata of unregistered module {}", id);
                false
            }
        }
    }

    /// Every registered module that declares a dependency on this one
    pub fn get_dependent_modules(&self, namespace: &str, name: &str) -> Vec<ModuleRecord> {
        let Some(id) = key(namespace, name) else {
            return Vec::new();
        };
        let state = read_lock(&self.state);
        state
            .graph
            .dependents_of(&id)
            .iter()
            .filter_map(|dependent| state.records.get(dependent).cloned())
            .collect()
    }

    /// Recursive dependency tree rooted at a module
    ///
    /// Not depth bounded. A node that reappears on its own path is marked
    /// `circular` and not expanded again.
    pub fn get_dependency_tree(&self, namespace: &str, name: &str) -> Option<DependencyTree> {
        let id = key(namespace, name)?;
        let state = read_lock(&self.state);
        let mut path = Vec::new();
        Some(build_tree(&state, &id, &mut path))
    }

    /// Classify each declared dependency as loaded or missing
    ///
    /// A status check only; nothing is fetched.
    pub fn load_dependencies(&self, namespace: &str, name: &str) -> DependencyStatus {
        let Some(id) = key(namespace, name) else {
            return DependencyStatus::default();
        };
        let state = read_lock(&self.state);
        let Some(deps) = state.graph.dependencies_of(&id) else {
            warn!("Cannot check dependencies of unregistered module {}", id);
            return DependencyStatus::default();
        };

        let (loaded, missing): (Vec<ModuleId>, Vec<ModuleId>) = deps
            .iter()
            .cloned()
            .partition(|dep| state.records.contains_key(dep));
        DependencyStatus {
            success: missing.is_empty(),
            loaded_dependencies: loaded,
            missing_dependencies: missing,
        }
    }

    /// Look up a module and, optionally, the status of its dependencies
    ///
    /// `success` is true when the module is present and, if `load_deps` is
    /// set, every declared dependency is registered.
    pub fn safe_get(&self, namespace: &str, name: &str, load_deps: bool) -> SafeGetResult {
        if !self.is_loaded(namespace, name) {
            debug!("safe_get: module {}.{} not loaded", namespace, name);
            return SafeGetResult::default();
        }
        let dependency_result = load_deps.then(|| self.load_dependencies(namespace, name));
        let module = self.get(namespace, name);
        let deps_ok = dependency_result.as_ref().map_or(true, |status| status.success);
        SafeGetResult {
            success: module.is_some() && deps_ok,
            module,
            dependency_result,
        }
    }

    /// Namespaces with at least one registered module, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let state = read_lock(&self.state);
        let namespaces: BTreeSet<&str> = state.records.keys().map(ModuleId::namespace).collect();
        namespaces.into_iter().map(str::to_string).collect()
    }

    /// Registered modules of one namespace, sorted
    pub fn modules_in(&self, namespace: &str) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = read_lock(&self.state)
            .records
            .keys()
            .filter(|id| id.namespace() == namespace)
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Every registered module id, sorted
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = read_lock(&self.state).records.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of the declared dependency graph
    pub fn declared_graph(&self) -> DeclaredDependencyGraph {
        with_read_lock(&self.state, |state| state.graph.clone())
    }

    pub fn len(&self) -> usize {
        with_read_lock(&self.state, |state| state.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to registry events
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    /// Alias for [`subscribe`](Self::subscribe)
    pub fn on<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.events.unsubscribe(kind, id)
    }

    /// Deliver an event to subscribers (used by the loader for load/error)
    pub(crate) fn notify(&self, event: RegistryEvent) {
        self.events.publish(&event);
    }

    /// Process-wide "registry ready" flag; carries no other semantics
    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

fn key(namespace: &str, name: &str) -> Option<ModuleId> {
    ModuleId::new(namespace, name).ok()
}

fn render(ids: &[ModuleId]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

fn build_tree(state: &RegistryState, id: &ModuleId, path: &mut Vec<ModuleId>) -> DependencyTree {
    let loaded = state.records.contains_key(id);
    if path.contains(id) {
        return DependencyTree {
            id: id.clone(),
            loaded,
            circular: true,
            dependencies: Vec::new(),
        };
    }

    path.push(id.clone());
    let dependencies = state
        .graph
        .dependencies_of(id)
        .unwrap_or(&[])
        .iter()
        .map(|dep| build_tree(state, dep, path))
        .collect();
    path.pop();

    DependencyTree {
        id: id.clone(),
        loaded,
        circular: false,
        dependencies,
    }
}
