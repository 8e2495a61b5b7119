//! Module system diagnostics
//!
//! Read-only report combining the loader's view, the registry's enumeration
//! and a best-effort locator probe for every published module.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::module::id::ModuleId;
use crate::module::loader::{DynamicLoader, LoaderReport};
use crate::module::registry::ModuleRegistry;
use crate::module::traits::{ModuleError, Result};
use crate::utils::time::current_timestamp;
use crate::utils::timeout::with_module_timeout;

/// Why a published module's locator could not be confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeFailure {
    /// No locator could be guessed for the module
    PathEstimationFailed,
    /// The source has nothing at the guessed locator
    FileNotFound,
    /// The source has something there but it failed to fetch
    ImportError,
}

/// Failed probe of one published module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathProbe {
    pub id: ModuleId,
    pub locator: Option<String>,
    pub failure: ProbeFailure,
    pub message: String,
}

/// Full module system report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReport {
    /// Unix timestamp of report generation
    pub generated_at: u64,
    pub initialized: bool,
    pub total_modules: usize,
    pub namespaces: BTreeMap<String, Vec<ModuleId>>,
    pub loader: LoaderReport,
    pub path_problems: Vec<PathProbe>,
}

impl SystemReport {
    /// No dependency problems, no cycles, no failed or stuck loads, no
    /// probe failures
    pub fn is_healthy(&self) -> bool {
        self.loader.modules.iter().all(|m| !m.has_problems)
            && self.loader.circular_dependencies.is_empty()
            && self.loader.failed.is_empty()
            && self.loader.loading.is_empty()
            && self.path_problems.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Diagnostics over a registry and a loader
pub struct Diagnostics {
    registry: Arc<ModuleRegistry>,
    loader: DynamicLoader,
}

impl Diagnostics {
    pub fn new(registry: Arc<ModuleRegistry>, loader: DynamicLoader) -> Self {
        Self { registry, loader }
    }

    /// Build the full report
    ///
    /// Probes fetch straight from the loader's source; loader and registry
    /// state are left untouched.
    pub async fn diagnose_module_system(&self) -> SystemReport {
        let loader = self.loader.diagnose();

        let mut namespaces = BTreeMap::new();
        for namespace in self.registry.namespaces() {
            let ids = self.registry.modules_in(&namespace);
            namespaces.insert(namespace, ids);
        }

        let mut path_problems = Vec::new();
        for id in self.registry.module_ids() {
            if let Some(problem) = self.probe(&id).await {
                path_problems.push(problem);
            }
        }

        let report = SystemReport {
            generated_at: current_timestamp(),
            initialized: self.registry.is_initialized(),
            total_modules: self.registry.len(),
            namespaces,
            loader,
            path_problems,
        };
        info!(
            "Module system report: {} modules, {} path problems, healthy: {}",
            report.total_modules,
            report.path_problems.len(),
            report.is_healthy()
        );
        report
    }

    async fn probe(&self, id: &ModuleId) -> Option<PathProbe> {
        let Some(locator) = self.loader.estimate_locator(id) else {
            return Some(PathProbe {
                id: id.clone(),
                locator: None,
                failure: ProbeFailure::PathEstimationFailed,
                message: format!("no locator known or derivable for {}", id),
            });
        };

        let fetched = with_module_timeout(
            self.loader.source().fetch(&locator),
            self.loader.config().timeout(),
            &format!("probe of {}", locator),
        )
        .await;

        let failure = match fetched {
            Ok(_) => {
                debug!("Probe of {} at {} resolved", id, locator);
                return None;
            }
            Err(e @ ModuleError::SourceNotFound(_)) => (ProbeFailure::FileNotFound, e),
            Err(e) => (ProbeFailure::ImportError, e),
        };
        Some(PathProbe {
            id: id.clone(),
            locator: Some(locator),
            failure: failure.0,
            message: failure.1.to_string(),
        })
    }
}
