//! Dynamic loader implementation
//!
//! Fetches code units through a [`CodeUnitSource`], loads their dependencies
//! first, runs initialization hooks and reports outcomes on the registry's
//! event bus.
//!
//! Each resolved locator has at most one load in flight. A load runs as its
//! own tokio task and its join handle is stored, as a `Shared` future, in the
//! loader state before the first await. Concurrent callers join it and receive
//! the same outcome; a caller that stops waiting does not stop the load.
//!
//! A load that waits on a dependency records a wait edge. Joining an in-flight
//! load whose waits already lead back to the joiner fails with
//! `CircularDependency` instead of waiting forever.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::module::api::events::RegistryEvent;
use crate::module::id::ModuleId;
use crate::module::loader::locator;
use crate::module::loader::plan::{FetchPlan, PlanUpdate};
use crate::module::registry::{CycleDetector, DependencyLookup, DependencyValidator, ModuleRegistry};
use crate::module::traits::{CodeUnit, CodeUnitSource, InitContext, ModuleError, Result};
use crate::utils::error::log_error_async;
use crate::utils::lock::{lock, read_lock, with_write_lock, write_lock};
use crate::utils::retry::{retry_async_observed, RetryConfig};
use crate::utils::timeout::with_module_timeout;

type LoadResult = Result<Arc<dyn CodeUnit>>;
type InFlight = Shared<BoxFuture<'static, LoadResult>>;

/// Load state of one locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

enum LoadSlot {
    Loading(InFlight),
    Loaded(Arc<dyn CodeUnit>),
    Failed(ModuleError),
}

struct LoadRecord {
    slot: LoadSlot,
    retry_count: u32,
}

impl LoadRecord {
    fn state(&self) -> LoadState {
        match self.slot {
            LoadSlot::Loading(_) => LoadState::Loading,
            LoadSlot::Loaded(_) => LoadState::Loaded,
            LoadSlot::Failed(_) => LoadState::Failed,
        }
    }
}

#[derive(Default)]
struct LoaderState {
    records: HashMap<String, LoadRecord>,
    initializing: HashSet<String>,
    plan: FetchPlan,
    /// In-flight load -> in-flight loads it is waiting on
    waits: HashMap<String, HashSet<String>>,
}

impl LoaderState {
    /// Whether the wait edges lead from `from` to `target`
    fn waits_on(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(next) = self.waits.get(node) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
        false
    }

    fn is_loading(&self, locator: &str) -> bool {
        matches!(
            self.records.get(locator).map(|r| &r.slot),
            Some(LoadSlot::Loading(_))
        )
    }
}

/// Options for [`DynamicLoader::load_module`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Run the unit's init hook after loading
    pub init: bool,
    /// Fetch again even if the locator is already loaded
    pub force: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            init: true,
            force: false,
        }
    }
}

/// Options for [`DynamicLoader::register_module`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterModuleOptions {
    /// Run the init hook when this module is loaded as a dependency
    pub init: bool,
}

impl Default for RegisterModuleOptions {
    fn default() -> Self {
        Self { init: true }
    }
}

/// Node of a fetch-plan dependency tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTreeNode {
    pub id: ModuleId,
    /// Pre-registered locator, if any
    pub locator: Option<String>,
    /// Published in the registry or loaded by this loader
    pub loaded: bool,
    /// Neither pre-registered nor published
    pub missing: bool,
    /// Depth bound reached; children not expanded
    pub too_deep: bool,
    /// Node already on the path from the root
    pub circular: bool,
    pub dependencies: Vec<PlanTreeNode>,
}

/// Result of [`DynamicLoader::check_dependency_tree`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCheck {
    pub tree: PlanTreeNode,
    /// Some node in the tree closes a cycle
    pub circular: bool,
}

/// Why a dependency is not satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyIssue {
    /// Neither pre-registered nor published
    NotRegistered,
    /// Pre-registered but not loaded (yet)
    NotLoaded,
    /// Its last load failed
    LoadFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyProblem {
    pub id: ModuleId,
    pub reason: DependencyIssue,
}

/// Per-module entry of a [`LoaderReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDiagnosis {
    pub id: ModuleId,
    /// Pre-registered locator, if any
    pub locator: Option<String>,
    pub state: LoadState,
    /// Published in the registry
    pub registered: bool,
    pub has_problems: bool,
    pub problematic_dependencies: Vec<DependencyProblem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLoad {
    pub locator: String,
    pub retry_count: u32,
    pub error: String,
}

/// Snapshot of loader state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderReport {
    pub loaded: Vec<String>,
    pub loading: Vec<String>,
    pub failed: Vec<FailedLoad>,
    pub initializing: Vec<String>,
    pub modules: Vec<ModuleDiagnosis>,
    /// Cycles across pre-registered and declared edges
    pub circular_dependencies: Vec<Vec<ModuleId>>,
}

/// Removes a locator from the initializing set when dropped
struct InitGuard {
    state: Arc<Mutex<LoaderState>>,
    locator: String,
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        lock(&self.state).initializing.remove(&self.locator);
    }
}

/// Removes a wait edge when dropped
struct WaitEdge {
    state: Arc<Mutex<LoaderState>>,
    waiter: String,
    target: String,
}

impl Drop for WaitEdge {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(targets) = state.waits.get_mut(&self.waiter) {
            targets.remove(&self.target);
            if targets.is_empty() {
                state.waits.remove(&self.waiter);
            }
        }
    }
}

/// Dynamic loader
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DynamicLoader {
    registry: Arc<ModuleRegistry>,
    source: Arc<dyn CodeUnitSource>,
    config: Arc<RwLock<LoaderConfig>>,
    state: Arc<Mutex<LoaderState>>,
}

impl DynamicLoader {
    pub fn new(registry: Arc<ModuleRegistry>, source: Arc<dyn CodeUnitSource>) -> Self {
        Self::with_config(registry, source, LoaderConfig::default())
    }

    pub fn with_config(
        registry: Arc<ModuleRegistry>,
        source: Arc<dyn CodeUnitSource>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            registry,
            source,
            config: Arc::new(RwLock::new(config)),
            state: Arc::new(Mutex::new(LoaderState::default())),
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn source(&self) -> &Arc<dyn CodeUnitSource> {
        &self.source
    }

    /// Current configuration
    pub fn config(&self) -> LoaderConfig {
        read_lock(&self.config).clone()
    }

    /// Replace the configuration
    ///
    /// Applies to loads started afterwards; locators already pre-registered
    /// keep their resolved form.
    pub fn configure(&self, config: LoaderConfig) -> Result<()> {
        config.validate()?;
        *write_lock(&self.config) = config;
        debug!("Loader reconfigured");
        Ok(())
    }

    /// Add or replace one locator alias
    pub fn set_alias(&self, alias: impl Into<String>, path: impl Into<String>) {
        let (alias, path) = (alias.into(), path.into());
        debug!("Alias {} -> {}", alias, path);
        with_write_lock(&self.config, |config| {
            config.aliases.insert(alias, path);
        });
    }

    pub fn resolve_locator(&self, locator: &str) -> String {
        locator::resolve_locator(&read_lock(&self.config), locator)
    }

    /// Best guess at where `id` lives
    ///
    /// The pre-registered locator if there is one; otherwise `namespace/name`
    /// resolved against the configuration, but only when a base URL or an
    /// alias for the namespace makes that guess meaningful.
    pub fn estimate_locator(&self, id: &ModuleId) -> Option<String> {
        if let Some(entry) = lock(&self.state).plan.get(id) {
            return Some(entry.locator.clone());
        }
        let config = self.config();
        if config.base_url.is_empty() && !config.aliases.contains_key(id.namespace()) {
            return None;
        }
        Some(locator::resolve_locator(
            &config,
            &format!("{}/{}", id.namespace(), id.name()),
        ))
    }

    /// Module id for a resolved locator: pre-registration first, then the
    /// last two path segments
    pub fn derive_module_id(&self, resolved: &str) -> Option<ModuleId> {
        if let Some(id) = lock(&self.state).plan.id_for_locator(resolved) {
            return Some(id.clone());
        }
        locator::derive_module_id(resolved, &read_lock(&self.config).base_url)
    }

    pub fn load_state(&self, locator: &str) -> LoadState {
        let resolved = self.resolve_locator(locator);
        lock(&self.state)
            .records
            .get(&resolved)
            .map(LoadRecord::state)
            .unwrap_or(LoadState::Unloaded)
    }

    /// Retries spent on `locator` across all its loads
    pub fn retry_count(&self, locator: &str) -> u32 {
        let resolved = self.resolve_locator(locator);
        lock(&self.state)
            .records
            .get(&resolved)
            .map(|r| r.retry_count)
            .unwrap_or(0)
    }

    pub fn is_loaded(&self, locator: &str) -> bool {
        self.load_state(locator) == LoadState::Loaded
    }

    /// Pre-register where a module lives and what must be fetched before it
    ///
    /// Repeat calls merge dependency lists. A different locator for an id
    /// already pre-registered is ignored with a warning.
    pub fn register_module<S: AsRef<str>>(
        &self,
        module_id: &str,
        locator: &str,
        dependencies: &[S],
        options: RegisterModuleOptions,
    ) -> Result<()> {
        let id = ModuleId::parse(module_id).ok_or_else(|| {
            ModuleError::InvalidModule(format!(
                "{:?} is not a namespace.name module id",
                module_id
            ))
        })?;

        let invalid = DependencyValidator::validate_format(dependencies);
        if !invalid.is_empty() {
            warn!(
                "Ignoring malformed dependencies of {}: {:?}",
                id, invalid
            );
        }
        let dependencies = DependencyValidator::parse_valid(dependencies);
        let resolved = self.resolve_locator(locator);

        let update = lock(&self.state)
            .plan
            .register(id.clone(), resolved.clone(), dependencies, options.init);
        match update {
            PlanUpdate::Inserted => debug!("Pre-registered {} at {}", id, resolved),
            PlanUpdate::Merged => debug!("Merged dependencies for {}", id),
            PlanUpdate::LocatorMismatch { kept } => warn!(
                "{} is already pre-registered at {}; ignoring locator {}",
                id, kept, resolved
            ),
        }
        Ok(())
    }

    /// Load the code unit at `locator`
    ///
    /// Already-loaded locators return the cached unit unless `force` is set;
    /// a load already in flight is joined. Dependencies pre-registered for
    /// the unit (or declared in the registry) are loaded first; their
    /// failures are logged and do not fail this load.
    ///
    /// The load runs on its own task: dropping the returned future does not
    /// abandon it. Must be called within a tokio runtime.
    pub async fn load_module(&self, locator: &str, options: LoadOptions) -> LoadResult {
        let resolved = self.resolve_locator(locator);
        let wait = self.start_or_join(&mut lock(&self.state), resolved, options);
        wait.await
    }

    /// Returns the in-flight load for `resolved`, spawning one if needed
    fn start_or_join(
        &self,
        state: &mut LoaderState,
        resolved: String,
        options: LoadOptions,
    ) -> BoxFuture<'static, LoadResult> {
        if let Some(record) = state.records.get(&resolved) {
            match &record.slot {
                LoadSlot::Loaded(unit) if !options.force => {
                    debug!("{} already loaded", resolved);
                    return future::ready(Ok(Arc::clone(unit))).boxed();
                }
                LoadSlot::Loading(in_flight) => {
                    debug!("Joining in-flight load of {}", resolved);
                    return in_flight.clone().boxed();
                }
                _ => {}
            }
        }

        let task = tokio::spawn(self.clone().run_load(resolved.clone(), options));
        let records = Arc::downgrade(&self.state);
        let locator = resolved.clone();
        let in_flight: InFlight = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    error!("Load task for {} ended abnormally: {}", locator, e);
                    let err = ModuleError::FetchError(format!(
                        "load task for {} ended abnormally",
                        locator
                    ));
                    if let Some(state) = records.upgrade() {
                        if let Some(record) = lock(&state).records.get_mut(&locator) {
                            record.slot = LoadSlot::Failed(err.clone());
                        }
                    }
                    Err(err)
                })
            })
            .boxed()
            .shared();
        state
            .records
            .entry(resolved)
            .and_modify(|r| r.slot = LoadSlot::Loading(in_flight.clone()))
            .or_insert_with(|| LoadRecord {
                slot: LoadSlot::Loading(in_flight.clone()),
                retry_count: 0,
            });
        in_flight.boxed()
    }

    /// Wait, from inside the load of `waiter`, on the load of `locator`
    ///
    /// Fails with `CircularDependency` if `locator` is in flight and already
    /// waiting, directly or through other loads, on `waiter`.
    async fn wait_for_dependency(&self, waiter: &str, locator: &str, options: LoadOptions) -> LoadResult {
        let resolved = self.resolve_locator(locator);
        let (wait, _edge) = {
            let mut state = lock(&self.state);
            if state.is_loading(&resolved) && state.waits_on(&resolved, waiter) {
                return Err(ModuleError::CircularDependency(format!(
                    "{} is waiting on {}",
                    resolved, waiter
                )));
            }
            let wait = self.start_or_join(&mut state, resolved.clone(), options);
            state
                .waits
                .entry(waiter.to_string())
                .or_default()
                .insert(resolved.clone());
            let edge = WaitEdge {
                state: Arc::clone(&self.state),
                waiter: waiter.to_string(),
                target: resolved,
            };
            (wait, edge)
        };
        wait.await
    }

    async fn run_load(self, locator: String, options: LoadOptions) -> LoadResult {
        let config = self.config();
        let retry = RetryConfig::fixed(config.max_retries, config.retry_delay());
        info!("Loading {}", locator);

        let outcome = retry_async_observed(
            &retry,
            || self.attempt_load(&locator, options, &config),
            |attempt, e: &ModuleError| {
                if attempt < retry.max_attempts {
                    warn!(
                        "Load of {} failed (attempt {}/{}): {}",
                        locator, attempt, retry.max_attempts, e
                    );
                    if let Some(record) = lock(&self.state).records.get_mut(&locator) {
                        record.retry_count += 1;
                    }
                }
            },
        )
        .await;

        {
            let mut state = lock(&self.state);
            if let Some(record) = state.records.get_mut(&locator) {
                record.slot = match &outcome {
                    Ok(unit) => LoadSlot::Loaded(Arc::clone(unit)),
                    Err(e) => LoadSlot::Failed(e.clone()),
                };
            }
        }

        match &outcome {
            Ok(_) => {
                info!("Loaded {}", locator);
                let module_id = self.derive_module_id(&locator);
                self.registry.notify(RegistryEvent::Load { locator, module_id });
            }
            Err(e) => {
                error!("Giving up on {}: {}", locator, e);
                self.registry.notify(RegistryEvent::Error {
                    locator,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
        outcome
    }

    async fn attempt_load(
        &self,
        locator: &str,
        options: LoadOptions,
        config: &LoaderConfig,
    ) -> LoadResult {
        let unit = with_module_timeout(
            self.source.fetch(locator),
            config.timeout(),
            &format!("fetch of {}", locator),
        )
        .await?;

        let module_id = self.derive_module_id(locator);
        if let Some(id) = &module_id {
            self.load_dependencies_of(locator, id).await;
        }

        if options.init && unit.has_init() {
            self.run_init(locator, module_id, &unit).await?;
        }
        Ok(unit)
    }

    /// Dependencies to fetch before `id`: pre-registered ones first, then
    /// those declared in the registry, each with its locator (if known) and
    /// whether to run its init hook
    fn dependencies_to_fetch(&self, id: &ModuleId) -> Vec<(ModuleId, Option<String>, bool)> {
        let planned = lock(&self.state)
            .plan
            .get(id)
            .map(|entry| entry.dependencies.clone())
            .unwrap_or_default();
        let declared = self.registry.get_dependencies(id.namespace(), id.name());

        let mut seen = HashSet::new();
        planned
            .into_iter()
            .chain(declared)
            .filter(|dep| seen.insert(dep.clone()))
            .map(|dep| {
                let init = lock(&self.state)
                    .plan
                    .get(&dep)
                    .map(|entry| entry.init)
                    .unwrap_or(true);
                let locator = self.estimate_locator(&dep);
                (dep, locator, init)
            })
            .collect()
    }

    /// Load the dependencies of `id`, whose load runs at `locator`
    ///
    /// Each dependency is awaited until its own load finishes, however long
    /// its retries take.
    async fn load_dependencies_of(&self, locator: &str, id: &ModuleId) {
        for (dep, dep_locator, init) in self.dependencies_to_fetch(id) {
            if self.registry.contains(&dep) {
                debug!("Dependency {} of {} already published", dep, id);
                continue;
            }
            let Some(dep_locator) = dep_locator else {
                warn!("No locator known for dependency {} of {}", dep, id);
                continue;
            };

            let options = LoadOptions { init, force: false };
            let context = format!("Dependency {} of {} did not load", dep, id);
            log_error_async(
                || self.wait_for_dependency(locator, &dep_locator, options),
                &context,
            )
            .await;
        }
    }

    async fn run_init(
        &self,
        locator: &str,
        module_id: Option<ModuleId>,
        unit: &Arc<dyn CodeUnit>,
    ) -> Result<()> {
        if !lock(&self.state).initializing.insert(locator.to_string()) {
            warn!("{} is already initializing; skipping init hook", locator);
            return Ok(());
        }
        let _guard = InitGuard {
            state: Arc::clone(&self.state),
            locator: locator.to_string(),
        };

        debug!("Initializing {}", locator);
        let context = InitContext {
            locator: locator.to_string(),
            module_id,
            registry: Arc::clone(&self.registry),
        };
        unit.init(context).await.map_err(|e| match e {
            ModuleError::InitializationError(_) => e,
            other => ModuleError::InitializationError(format!("{}: {}", locator, other)),
        })
    }

    /// Walk the pre-registered dependency tree of `module_id`
    pub fn check_dependency_tree(&self, module_id: &str) -> Result<DependencyCheck> {
        let id = ModuleId::parse(module_id).ok_or_else(|| {
            ModuleError::InvalidModule(format!(
                "{:?} is not a namespace.name module id",
                module_id
            ))
        })?;
        let (plan, loaded) = self.snapshot();
        let mut walk = TreeWalk {
            plan: &plan,
            loaded: &loaded,
            registry: &self.registry,
            max_depth: read_lock(&self.config).max_depth,
            path: Vec::new(),
            circular: false,
        };
        let tree = walk.visit(&id, 0);
        Ok(DependencyCheck {
            tree,
            circular: walk.circular,
        })
    }

    /// Plan copy plus the load state of every known locator
    fn snapshot(&self) -> (FetchPlan, HashMap<String, LoadState>) {
        let state = lock(&self.state);
        let states = state
            .records
            .iter()
            .map(|(locator, record)| (locator.clone(), record.state()))
            .collect();
        (state.plan.clone(), states)
    }

    /// Report load states, unsatisfied dependencies and dependency cycles
    ///
    /// Covers every pre-registered module and every module published in the
    /// registry. A dependency is unsatisfied when it is neither published nor
    /// loaded by this loader. Cycles are searched over the union of the fetch
    /// plan and the registry's declared edges.
    pub fn diagnose(&self) -> LoaderReport {
        let mut loaded = Vec::new();
        let mut loading = Vec::new();
        let mut failed = Vec::new();
        let mut initializing: Vec<String>;
        let plan;
        {
            let state = lock(&self.state);
            for (locator, record) in &state.records {
                match &record.slot {
                    LoadSlot::Loaded(_) => loaded.push(locator.clone()),
                    LoadSlot::Loading(_) => loading.push(locator.clone()),
                    LoadSlot::Failed(e) => failed.push(FailedLoad {
                        locator: locator.clone(),
                        retry_count: record.retry_count,
                        error: e.to_string(),
                    }),
                }
            }
            initializing = state.initializing.iter().cloned().collect();
            plan = state.plan.clone();
        }
        loaded.sort();
        loading.sort();
        initializing.sort();
        failed.sort_by(|a, b| a.locator.cmp(&b.locator));

        let state_of = |locator: &str| {
            if loaded.binary_search_by(|l| l.as_str().cmp(locator)).is_ok() {
                LoadState::Loaded
            } else if loading.binary_search_by(|l| l.as_str().cmp(locator)).is_ok() {
                LoadState::Loading
            } else if failed.iter().any(|f| f.locator == locator) {
                LoadState::Failed
            } else {
                LoadState::Unloaded
            }
        };

        // Registry edges, extended with the pre-registered ones
        let mut graph = self.registry.declared_graph();
        for id in plan.ids() {
            let mut deps = graph.dependencies_of(&id).map(<[ModuleId]>::to_vec).unwrap_or_default();
            if let Some(entry) = plan.get(&id) {
                for dep in &entry.dependencies {
                    if !deps.contains(dep) {
                        deps.push(dep.clone());
                    }
                }
            }
            graph.set_dependencies(id, deps);
        }

        let mut ids: Vec<ModuleId> = plan.ids();
        ids.extend(self.registry.module_ids());
        ids.sort();
        ids.dedup();

        let modules = ids
            .iter()
            .map(|id| {
                let locator = plan.get(id).map(|e| e.locator.clone());
                let problematic_dependencies: Vec<DependencyProblem> = graph
                    .dependencies_of(id)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|dep| {
                        if self.registry.contains(dep) {
                            return None;
                        }
                        let reason = match plan.get(dep).map(|e| state_of(&e.locator)) {
                            None => DependencyIssue::NotRegistered,
                            Some(LoadState::Loaded) => return None,
                            Some(LoadState::Failed) => DependencyIssue::LoadFailed,
                            Some(_) => DependencyIssue::NotLoaded,
                        };
                        Some(DependencyProblem {
                            id: dep.clone(),
                            reason,
                        })
                    })
                    .collect();
                ModuleDiagnosis {
                    id: id.clone(),
                    state: locator.as_deref().map(&state_of).unwrap_or(LoadState::Unloaded),
                    locator,
                    registered: self.registry.contains(id),
                    has_problems: !problematic_dependencies.is_empty(),
                    problematic_dependencies,
                }
            })
            .collect();

        let circular_dependencies =
            CycleDetector::new(read_lock(&self.config).max_depth).find_cycles(&graph, ids.iter());

        LoaderReport {
            loaded,
            loading,
            failed,
            initializing,
            modules,
            circular_dependencies,
        }
    }
}

struct TreeWalk<'a> {
    plan: &'a FetchPlan,
    loaded: &'a HashMap<String, LoadState>,
    registry: &'a ModuleRegistry,
    max_depth: usize,
    path: Vec<ModuleId>,
    circular: bool,
}

impl TreeWalk<'_> {
    fn visit(&mut self, id: &ModuleId, depth: usize) -> PlanTreeNode {
        let entry = self.plan.get(id);
        let published = self.registry.contains(id);
        let locator = entry.map(|e| e.locator.clone());
        let loaded = published
            || locator
                .as_ref()
                .is_some_and(|l| self.loaded.get(l) == Some(&LoadState::Loaded));
        let mut node = PlanTreeNode {
            id: id.clone(),
            locator,
            loaded,
            missing: entry.is_none() && !published,
            too_deep: false,
            circular: false,
            dependencies: Vec::new(),
        };

        if self.path.contains(id) {
            node.circular = true;
            self.circular = true;
            return node;
        }
        if depth >= self.max_depth {
            node.too_deep = true;
            return node;
        }

        if let Some(entry) = entry {
            self.path.push(id.clone());
            node.dependencies = entry
                .dependencies
                .iter()
                .map(|dep| self.visit(dep, depth + 1))
                .collect();
            self.path.pop();
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NothingSource;

    #[async_trait]
    impl CodeUnitSource for NothingSource {
        async fn fetch(&self, locator: &str) -> Result<Arc<dyn CodeUnit>> {
            Err(ModuleError::SourceNotFound(locator.to_string()))
        }
    }

    fn loader() -> DynamicLoader {
        DynamicLoader::new(Arc::new(ModuleRegistry::new()), Arc::new(NothingSource))
    }

    fn id(s: &str) -> ModuleId {
        ModuleId::parse(s).unwrap()
    }

    #[test]
    fn test_wait_edges_close_loops() {
        let mut state = LoaderState::default();
        state.waits.entry("a".to_string()).or_default().insert("b".to_string());
        state.waits.entry("b".to_string()).or_default().insert("c".to_string());

        assert!(state.waits_on("a", "c"));
        assert!(state.waits_on("c", "c"));
        assert!(!state.waits_on("c", "a"));
        assert!(!state.waits_on("b", "a"));
    }

    #[test]
    fn test_register_module_rejects_bad_id() {
        let loader = loader();
        let err = loader
            .register_module("nodot", "x/y", &[] as &[&str], RegisterModuleOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidModule");
    }

    #[test]
    fn test_check_dependency_tree_markers() {
        let loader = loader();
        let opts = RegisterModuleOptions::default();
        loader.register_module("app.main", "app/main", &["core.a", "core.ghost"], opts).unwrap();
        loader.register_module("core.a", "core/a", &["app.main"], opts).unwrap();

        let check = loader.check_dependency_tree("app.main").unwrap();
        assert!(check.circular);
        assert_eq!(check.tree.locator.as_deref(), Some("app/main"));

        let a = &check.tree.dependencies[0];
        assert_eq!(a.id, id("core.a"));
        assert!(a.dependencies[0].circular);

        let ghost = &check.tree.dependencies[1];
        assert!(ghost.missing);
        assert!(!ghost.loaded);
    }

    #[test]
    fn test_check_dependency_tree_depth_bound() {
        let loader = loader();
        let config = LoaderConfig {
            max_depth: 2,
            ..LoaderConfig::default()
        };
        loader.configure(config).unwrap();
        let opts = RegisterModuleOptions::default();
        loader.register_module("c.a", "c/a", &["c.b"], opts).unwrap();
        loader.register_module("c.b", "c/b", &["c.c"], opts).unwrap();
        loader.register_module("c.c", "c/c", &["c.d"], opts).unwrap();

        let check = loader.check_dependency_tree("c.a").unwrap();
        let c = &check.tree.dependencies[0].dependencies[0];
        assert_eq!(c.id, id("c.c"));
        assert!(c.too_deep);
        assert!(c.dependencies.is_empty());
        assert!(!check.circular);
    }

    #[test]
    fn test_estimate_locator() {
        let loader = loader();
        assert_eq!(loader.estimate_locator(&id("ui.qr")), None);

        loader.set_alias("ui", "components/ui");
        assert_eq!(loader.estimate_locator(&id("ui.qr")).as_deref(), Some("components/ui/qr"));

        loader
            .register_module("ui.qr", "vendor/qr.js", &[] as &[&str], RegisterModuleOptions::default())
            .unwrap();
        assert_eq!(loader.estimate_locator(&id("ui.qr")).as_deref(), Some("vendor/qr.js"));
    }

    #[tokio::test]
    async fn test_failed_load_is_reported() {
        let loader = loader();
        let mut config = loader.config();
        config.max_retries = 0;
        loader.configure(config).unwrap();

        let err = loader.load_module("core/missing", LoadOptions::default()).await.err().unwrap();
        assert_eq!(err.kind(), "SourceNotFound");
        assert_eq!(loader.load_state("core/missing"), LoadState::Failed);
        assert_eq!(loader.retry_count("core/missing"), 0);

        let report = loader.diagnose();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].locator, "core/missing");
    }
}
