mod common;

use common::{options, Project, FASTAPI, LOGGING, MAIN_PY};
use rapidkit_core::snippets::{InjectAction, SnippetMetadata, SnippetRegistry, SnippetStatus};
use rapidkit_core::{EngineConfig, SnippetInjector};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PYPROJECT: &str = "[tool.poetry.dependencies]\n# <<<inject:module-dependencies>>>\n";
const GAMMA: &str = "gamma = \"0.1.0\"\n";

fn injector(root: &Path) -> SnippetInjector {
    SnippetInjector::new(root, &EngineConfig::default().with_formatters(false))
}

fn gamma() -> SnippetMetadata {
    SnippetMetadata::new("gamma", "gamma", "0.1.0")
}

#[test]
fn test_reinjection_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("pyproject.toml");
    fs::write(&file, PYPROJECT).unwrap();
    let injector = injector(tmp.path());

    let first = injector
        .inject_rendered(&file, GAMMA, "module-dependencies", &gamma(), true)
        .unwrap();
    assert!(first.injected);
    assert_eq!(first.status, SnippetStatus::Applied);
    let once = fs::read(&file).unwrap();

    let second = injector
        .inject_rendered(&file, GAMMA, "module-dependencies", &gamma(), true)
        .unwrap();
    assert!(!second.injected);
    assert_eq!(second.action, InjectAction::Noop);
    assert_eq!(fs::read(&file).unwrap(), once);

    let text = String::from_utf8(once).unwrap();
    assert_eq!(text.matches("gamma = \"0.1.0\"").count(), 1);
    assert!(text.starts_with(PYPROJECT));
}

#[test]
fn test_inject_rollback_inject_matches_single_inject() {
    let single = TempDir::new().unwrap();
    let cycled = TempDir::new().unwrap();
    for root in [single.path(), cycled.path()] {
        fs::write(root.join("pyproject.toml"), PYPROJECT).unwrap();
    }

    let file = single.path().join("pyproject.toml");
    injector(single.path())
        .inject_rendered(&file, GAMMA, "module-dependencies", &gamma(), true)
        .unwrap();

    let cycler = injector(cycled.path());
    let file = cycled.path().join("pyproject.toml");
    cycler
        .inject_rendered(&file, GAMMA, "module-dependencies", &gamma(), true)
        .unwrap();
    let rolled = cycler.rollback("gamma::pyproject.toml", false).unwrap();
    assert!(rolled.removed);
    assert_eq!(fs::read_to_string(&file).unwrap(), PYPROJECT);
    cycler
        .inject_rendered(&file, GAMMA, "module-dependencies", &gamma(), true)
        .unwrap();

    assert_eq!(
        fs::read(single.path().join("pyproject.toml")).unwrap(),
        fs::read(&file).unwrap()
    );
    let registry = SnippetRegistry::load(cycled.path()).unwrap();
    let entry = registry.get("gamma::pyproject.toml").unwrap();
    assert_eq!(entry.status, SnippetStatus::Applied);
    assert!(entry.rolled_back_at.is_some());
}

#[test]
fn test_failed_injection_is_never_applied() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("pyproject.toml");
    fs::write(&file, "[tool.poetry.dependencies]\n").unwrap();

    let result = injector(tmp.path())
        .inject_rendered(&file, GAMMA, "module-dependencies", &gamma(), false)
        .unwrap();
    assert!(result.blocked);
    assert!(!result.injected);
    assert_ne!(result.status, SnippetStatus::Applied);
    assert_eq!(fs::read_to_string(&file).unwrap(), "[tool.poetry.dependencies]\n");

    let registry = SnippetRegistry::load(tmp.path()).unwrap();
    let entry = registry.get("gamma::pyproject.toml").unwrap();
    assert_eq!(entry.status, SnippetStatus::Pending);
    assert_eq!(entry.reason.as_deref(), Some("anchor"));
}

#[test]
fn test_generation_tracks_snippets_in_registry() {
    let project = Project::new();
    project.add(FASTAPI);

    let registry = SnippetRegistry::load(project.root.path()).unwrap();
    let setup = registry.get("logging_setup::src/main.py").unwrap();
    assert_eq!(setup.status, SnippetStatus::Applied);
    assert_eq!(setup.module, "logging");
    assert!(setup.content_hash.is_some());
    assert!(registry.get("logging_env::.env.example").is_some());
    assert_eq!(registry.applied_for_module("logging").len(), 2);
}

#[test]
fn test_lenient_snippet_skips_missing_anchor() {
    let project = Project::new();
    project.write("src/main.py", "app = None\n");
    let report = project.add(FASTAPI);

    let setup = report.modules[0]
        .snippets
        .iter()
        .find(|s| s.key == "logging_setup::src/main.py")
        .unwrap();
    assert_eq!(setup.action, InjectAction::Skipped);
    assert_eq!(setup.status, SnippetStatus::Pending);
    assert_eq!(project.read("src/main.py"), "app = None\n");
}

#[test]
fn test_strict_snippet_aborts_generation() {
    let project = Project::new();
    let manifest = project.module_dir().join("module.yaml");
    let text = fs::read_to_string(&manifest).unwrap();
    fs::write(
        &manifest,
        text.replacen(
            "anchor: \"# <<<inject:startup>>>\"",
            "anchor: \"# <<<inject:startup>>>\"\n    lenient: false",
            1,
        ),
    )
    .unwrap();
    project.write("src/main.py", "app = None\n");

    let err = project
        .generator()
        .generate(LOGGING, project.root.path(), &options(FASTAPI))
        .unwrap_err();
    assert!(err.to_string().contains("snippet"), "{}", err);
    assert_eq!(project.read("src/main.py"), "app = None\n");
}

#[test]
fn test_changed_snippet_template_replaces_block() {
    let project = Project::new();
    project.add(FASTAPI);

    let template = project.module_dir().join("templates/snippets/setup.py.j2");
    let mut text = fs::read_to_string(&template).unwrap();
    text.push_str("logger_ready = True\n");
    fs::write(&template, text).unwrap();

    let report = project.add(FASTAPI);
    let setup = report.modules[0]
        .snippets
        .iter()
        .find(|s| s.key == "logging_setup::src/main.py")
        .unwrap();
    assert_eq!(setup.action, InjectAction::Replaced);

    let main = project.read("src/main.py");
    assert_eq!(main.matches("logging_setup:start").count(), 1);
    assert!(main.contains("logger_ready = True\n# <<<inject:startup:logging_setup:end>>>"));
    assert!(main.starts_with("from fastapi import FastAPI\n\n# <<<inject:startup>>>\n"));
    assert!(main.ends_with("app = FastAPI()\n"));
    assert_ne!(main, MAIN_PY);
}
