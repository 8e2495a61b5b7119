//! Fetch plan
//!
//! Declarative pre-registrations made through `DynamicLoader::register_module`:
//! for each module id, the locator it is fetched from and the modules that
//! should be fetched before it. Distinct from the registry's declared graph,
//! which records what published modules say about themselves.

use std::collections::HashMap;

use crate::module::id::ModuleId;
use crate::module::registry::graph::DependencyLookup;

/// One pre-registered module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Resolved locator
    pub locator: String,
    /// Modules to fetch before this one
    pub dependencies: Vec<ModuleId>,
    /// Run the init hook when loaded as someone's dependency
    pub init: bool,
}

/// What [`FetchPlan::register`] did with a pre-registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanUpdate {
    Inserted,
    /// Same id and locator; dependency lists merged
    Merged,
    /// Same id, different locator; the first locator is kept, lists merged
    LocatorMismatch { kept: String },
}

/// Locator and dependency pre-registrations, keyed by module id
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    entries: HashMap<ModuleId, PlanEntry>,
}

impl FetchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or merge a pre-registration
    pub fn register(
        &mut self,
        id: ModuleId,
        locator: String,
        dependencies: Vec<ModuleId>,
        init: bool,
    ) -> PlanUpdate {
        match self.entries.get_mut(&id) {
            None => {
                self.entries.insert(
                    id,
                    PlanEntry {
                        locator,
                        dependencies,
                        init,
                    },
                );
                PlanUpdate::Inserted
            }
            Some(entry) => {
                for dep in dependencies {
                    if !entry.dependencies.contains(&dep) {
                        entry.dependencies.push(dep);
                    }
                }
                if entry.locator == locator {
                    PlanUpdate::Merged
                } else {
                    PlanUpdate::LocatorMismatch {
                        kept: entry.locator.clone(),
                    }
                }
            }
        }
    }

    pub fn get(&self, id: &ModuleId) -> Option<&PlanEntry> {
        self.entries.get(id)
    }

    /// Module id pre-registered for `locator`
    pub fn id_for_locator(&self, locator: &str) -> Option<&ModuleId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.locator == locator)
            .map(|(id, _)| id)
    }

    /// Every pre-registered id, sorted
    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DependencyLookup for FetchPlan {
    fn dependencies_of(&self, id: &ModuleId) -> Option<&[ModuleId]> {
        self.entries.get(id).map(|entry| entry.dependencies.as_slice())
    }
}
