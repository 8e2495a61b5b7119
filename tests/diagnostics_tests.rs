//! Diagnostics integration tests

use std::sync::Arc;

use unitgraph::config::LoaderConfig;
use unitgraph::module::diagnostics::{Diagnostics, ProbeFailure};
use unitgraph::module::loader::{DependencyIssue, LoadOptions, LoadState, RegisterModuleOptions};
use unitgraph::module::registry::RegistrationMetadata;
use unitgraph::module::ModuleId;
mod common;
use common::*;

fn id(s: &str) -> ModuleId {
    ModuleId::parse(s).unwrap()
}

#[tokio::test]
async fn test_missing_dependency_is_a_problem() {
    let fixture = LoaderTestFixture::new();
    fixture
        .registry
        .register("app", "a", object(()), &["app.b"], RegistrationMetadata::new())
        .unwrap();

    let report = fixture.loader.diagnose();
    assert_eq!(report.modules.len(), 1);
    let a = &report.modules[0];
    assert_eq!(a.id, id("app.a"));
    assert!(a.registered);
    assert!(a.has_problems);
    assert_eq!(a.problematic_dependencies.len(), 1);
    assert_eq!(a.problematic_dependencies[0].id, id("app.b"));
    assert_eq!(a.problematic_dependencies[0].reason, DependencyIssue::NotRegistered);
}

#[tokio::test]
async fn test_pre_registered_dependency_states() {
    let fixture = LoaderTestFixture::without_retries();
    let opts = RegisterModuleOptions::default();
    fixture
        .loader
        .register_module("app.main", "app/main", &["core.later", "core.gone"], opts)
        .unwrap();
    fixture
        .loader
        .register_module("core.later", "core/later", &[] as &[&str], opts)
        .unwrap();
    fixture
        .loader
        .register_module("core.gone", "core/gone", &[] as &[&str], opts)
        .unwrap();
    assert!(fixture
        .loader
        .load_module("core/gone", LoadOptions::default())
        .await
        .is_err());

    let report = fixture.loader.diagnose();
    let main = report
        .modules
        .iter()
        .find(|m| m.id == id("app.main"))
        .unwrap();
    assert!(!main.registered);
    assert_eq!(main.state, LoadState::Unloaded);
    assert_eq!(main.locator.as_deref(), Some("app/main"));
    let reasons: Vec<(ModuleId, DependencyIssue)> = main
        .problematic_dependencies
        .iter()
        .map(|p| (p.id.clone(), p.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            (id("core.later"), DependencyIssue::NotLoaded),
            (id("core.gone"), DependencyIssue::LoadFailed),
        ]
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].locator, "core/gone");
}

#[tokio::test]
async fn test_path_probes() {
    let fixture = LoaderTestFixture::with_config(LoaderConfig {
        base_url: "mods".to_string(),
        max_retries: 0,
        ..LoaderConfig::default()
    });
    for name in ["present", "absent", "broken"] {
        fixture
            .registry
            .register("core", name, object(()), &[] as &[&str], RegistrationMetadata::new())
            .unwrap();
    }
    fixture.source.add("mods/core/present", UnitScript::default());
    fixture
        .source
        .add("mods/core/broken", UnitScript::default().failing_first(u32::MAX));

    let diagnostics = Diagnostics::new(Arc::clone(&fixture.registry), fixture.loader.clone());
    let report = diagnostics.diagnose_module_system().await;

    assert_eq!(report.total_modules, 3);
    assert_eq!(
        report.namespaces["core"],
        vec![id("core.absent"), id("core.broken"), id("core.present")]
    );

    let failures: Vec<(ModuleId, ProbeFailure)> = report
        .path_problems
        .iter()
        .map(|p| (p.id.clone(), p.failure))
        .collect();
    assert_eq!(
        failures,
        vec![
            (id("core.absent"), ProbeFailure::FileNotFound),
            (id("core.broken"), ProbeFailure::ImportError),
        ]
    );
    assert_eq!(
        report.path_problems[0].locator.as_deref(),
        Some("mods/core/absent")
    );

    // Probes leave loader state alone
    assert_eq!(fixture.source.fetches("mods/core/present"), 1);
    assert_eq!(fixture.loader.load_state("mods/core/present"), LoadState::Unloaded);
    assert!(report.loader.loaded.is_empty());
    assert!(!report.is_healthy());
}

#[tokio::test]
async fn test_unlocatable_module_and_json_report() {
    let fixture = LoaderTestFixture::new();
    fixture
        .registry
        .register("misc", "orphan", object(()), &[] as &[&str], RegistrationMetadata::new())
        .unwrap();
    fixture.registry.set_initialized(true);

    let report = Diagnostics::new(Arc::clone(&fixture.registry), fixture.loader.clone())
        .diagnose_module_system()
        .await;

    assert!(report.initialized);
    assert_eq!(report.path_problems.len(), 1);
    assert_eq!(report.path_problems[0].failure, ProbeFailure::PathEstimationFailed);
    assert!(report.path_problems[0].locator.is_none());
    assert_eq!(fixture.source.journal(), Vec::<String>::new());

    let json = report.to_json().unwrap();
    assert!(json.contains("PATH_ESTIMATION_FAILED"));
    assert!(json.contains("\"misc.orphan\""));

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["totalModules"], 1);
    assert_eq!(value["pathProblems"][0]["failure"], "PATH_ESTIMATION_FAILED");
    assert_eq!(value["loader"]["circularDependencies"], serde_json::json!([]));
    assert!(value.get("path_problems").is_none());
}

#[tokio::test]
async fn test_healthy_system() {
    let fixture = LoaderTestFixture::new();
    fixture.source.add("core/store", UnitScript::publishing("core", "store"));
    fixture
        .loader
        .load_module("core/store", LoadOptions::default())
        .await
        .ok()
        .unwrap();
    fixture.loader.set_alias("core", "core");

    let report = Diagnostics::new(Arc::clone(&fixture.registry), fixture.loader.clone())
        .diagnose_module_system()
        .await;
    assert_eq!(report.loader.loaded, vec!["core/store".to_string()]);
    assert!(report.is_healthy(), "{:?}", report);
}
