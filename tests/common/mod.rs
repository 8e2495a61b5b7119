//! Test utilities for registry and loader tests
//!
//! Provides a scripted in-memory code unit source and a fixture wiring it to a
//! registry and a loader.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unitgraph::config::LoaderConfig;
use unitgraph::module::loader::DynamicLoader;
use unitgraph::module::registry::{ModuleRegistry, RegistrationMetadata};
use unitgraph::module::traits::{
    CodeUnit, CodeUnitSource, InitContext, ModuleError, ModuleObject, Result,
};

/// How a scripted locator behaves
#[derive(Debug, Clone, Default)]
pub struct UnitScript {
    /// Publish into the registry from the init hook as `(namespace, name)`
    pub publish_as: Option<(String, String)>,
    /// Dependencies declared when publishing
    pub declares: Vec<String>,
    /// Number of initial fetches that fail with `FetchError`
    pub fail_first: u32,
    /// Delay before each fetch completes
    pub fetch_delay: Option<Duration>,
    /// Init hook always fails
    pub init_fails: bool,
}

impl UnitScript {
    /// Unit that publishes itself as `namespace.name` on init
    pub fn publishing(namespace: &str, name: &str) -> Self {
        Self {
            publish_as: Some((namespace.to_string(), name.to_string())),
            ..Self::default()
        }
    }

    pub fn declaring(mut self, deps: &[&str]) -> Self {
        self.declares = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.init_fails = true;
        self
    }
}

/// In-memory [`CodeUnitSource`] driven by [`UnitScript`]s
///
/// Records every fetch and init hook run, in order, in a journal of
/// `"fetch <locator>"` / `"init <locator>"` lines.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, UnitScript>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, locator: &str, script: UnitScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(locator.to_string(), script);
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.journal().iter().filter(|e| *e == entry).count()
    }

    pub fn fetches(&self, locator: &str) -> usize {
        self.count(&format!("fetch {}", locator))
    }

    pub fn inits(&self, locator: &str) -> usize {
        self.count(&format!("init {}", locator))
    }

    /// Journal position of the first occurrence of `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.journal().iter().position(|e| e == entry)
    }
}

#[async_trait]
impl CodeUnitSource for ScriptedSource {
    async fn fetch(&self, locator: &str) -> Result<Arc<dyn CodeUnit>> {
        let attempt = {
            let mut journal = self.journal.lock().unwrap();
            journal.push(format!("fetch {}", locator));
            journal
                .iter()
                .filter(|e| **e == format!("fetch {}", locator))
                .count() as u32
        };
        let script = self.scripts.lock().unwrap().get(locator).cloned();
        let Some(script) = script else {
            return Err(ModuleError::SourceNotFound(locator.to_string()));
        };

        if let Some(delay) = script.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if attempt <= script.fail_first {
            return Err(ModuleError::FetchError(format!(
                "{} (scripted failure {})",
                locator, attempt
            )));
        }

        Ok(Arc::new(ScriptedUnit {
            locator: locator.to_string(),
            script,
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct ScriptedUnit {
    locator: String,
    script: UnitScript,
    journal: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CodeUnit for ScriptedUnit {
    fn exports(&self) -> ModuleObject {
        Arc::new(self.locator.clone())
    }

    fn has_init(&self) -> bool {
        true
    }

    async fn init(&self, context: InitContext) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("init {}", self.locator));
        if self.script.init_fails {
            return Err(ModuleError::InitializationError(format!(
                "{} refused to start",
                self.locator
            )));
        }
        if let Some((namespace, name)) = &self.script.publish_as {
            context.registry.register(
                namespace,
                name,
                self.exports(),
                self.script.declares.as_slice(),
                RegistrationMetadata::new(),
            )?;
        }
        Ok(())
    }
}

/// Registry, scripted source and loader wired together
pub struct LoaderTestFixture {
    pub registry: Arc<ModuleRegistry>,
    pub source: Arc<ScriptedSource>,
    pub loader: DynamicLoader,
}

impl LoaderTestFixture {
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        let registry = Arc::new(ModuleRegistry::new());
        let source = ScriptedSource::new();
        let loader = DynamicLoader::with_config(
            Arc::clone(&registry),
            Arc::clone(&source) as Arc<dyn CodeUnitSource>,
            config,
        );
        Self {
            registry,
            source,
            loader,
        }
    }

    /// Fixture whose loads make a single attempt
    pub fn without_retries() -> Self {
        Self::with_config(LoaderConfig {
            max_retries: 0,
            ..LoaderConfig::default()
        })
    }
}

/// Opaque module object for direct registry tests
pub fn object<T: Send + Sync + 'static>(value: T) -> ModuleObject {
    Arc::new(value)
}
