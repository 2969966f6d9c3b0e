//! Dependency composition
//!
//! Modules declare package dependencies per profile. The composer collects the
//! ones that apply to the active profile chain, keeps the highest concrete
//! version per name, and merges them into the project's dependency manifest
//! through a [`DependencyAdapter`]. Existing pins are never downgraded.

pub mod package_json;
pub mod requirements;

pub use package_json::PackageJson;
pub use requirements::RequirementsTxt;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::manifest::{DependencySpec, ModuleManifest};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

/// Group name that marks development-only dependencies
pub const DEV_GROUP: &str = "dev";

/// Reads, updates and serializes one dependency manifest format
pub trait DependencyAdapter {
    /// File name relative to the project root
    fn file_name(&self) -> &str;

    /// Load existing content (empty text means a new file)
    fn parse(&mut self, text: &str) -> std::result::Result<(), String>;

    /// Current version specifier for `name`, if pinned
    fn pinned(&self, name: &str, group: Option<&str>) -> Option<String>;

    fn upsert(&mut self, name: &str, version: &str, group: Option<&str>);

    fn write(&self) -> String;
}

/// What happened to each dependency in one manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComposeReport {
    pub file: String,
    pub added: Vec<String>,
    pub upgraded: Vec<String>,
    pub kept: Vec<String>,
    pub written: bool,
}

impl ComposeReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.upgraded.is_empty()
    }
}

/// Dependencies that apply to `profile`, deduplicated by name.
/// Without a profile every declared group is used.
pub fn collect(
    manifest: &ModuleManifest,
    profile: Option<&str>,
    extra: &[DependencySpec],
) -> Vec<DependencySpec> {
    let mut declared: Vec<&DependencySpec> = Vec::new();
    match profile {
        Some(profile) => {
            // ancestors first so the most specific profile is seen last
            for p in manifest.profile_chain(profile).iter().rev() {
                if let Some(deps) = manifest.dependencies.get(p) {
                    declared.extend(deps);
                }
            }
        }
        None => declared.extend(manifest.dependencies.values().flatten()),
    }
    declared.extend(extra);
    dedupe(declared)
}

fn dedupe<'a>(deps: impl IntoIterator<Item = &'a DependencySpec>) -> Vec<DependencySpec> {
    let mut by_name: BTreeMap<(bool, String), DependencySpec> = BTreeMap::new();
    for dep in deps {
        let key = (is_dev(dep), dep.name.to_ascii_lowercase());
        match by_name.get(&key) {
            Some(existing)
                if compare_specs(&dep.version, &existing.version) != Ordering::Greater => {}
            _ => {
                by_name.insert(key, dep.clone());
            }
        }
    }
    by_name.into_values().collect()
}

pub fn is_dev(dep: &DependencySpec) -> bool {
    dep.group.as_deref() == Some(DEV_GROUP)
}

/// Lowest concrete version named by a specifier such as `>=1.2`, `^3.0.1`
/// or `==2.0`. Wildcards and unparseable specifiers yield `None`.
pub fn spec_floor(spec: &str) -> Option<semver::Version> {
    let first = spec.split(',').next()?.trim();
    let trimmed = first
        .trim_start_matches(|c: char| matches!(c, '>' | '<' | '=' | '^' | '~' | '!' | 'v' | ' '));
    if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("latest") {
        return None;
    }
    let core: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts: Vec<&str> = core.split('.').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() || parts.iter().any(|p| *p == "*" || *p == "x") {
        return None;
    }
    parts.truncate(3);
    while parts.len() < 3 {
        parts.push("0");
    }
    semver::Version::parse(&parts.join(".")).ok()
}

/// Order specifiers by their floor version; wildcards sort lowest
pub fn compare_specs(a: &str, b: &str) -> Ordering {
    match (spec_floor(a), spec_floor(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Merge `deps` into the adapter's file under `project_root`
pub fn compose(
    project_root: &Path,
    adapter: &mut dyn DependencyAdapter,
    deps: &[DependencySpec],
) -> Result<ComposeReport> {
    let path = project_root.join(adapter.file_name());
    let text = fsutil::read_optional(&path)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    adapter
        .parse(&text)
        .map_err(|reason| Error::Other(format!("cannot parse {}: {}", path.display(), reason)))?;

    let mut report = ComposeReport {
        file: adapter.file_name().to_string(),
        ..ComposeReport::default()
    };
    for dep in deps {
        let group = dep.group.as_deref();
        match adapter.pinned(&dep.name, group) {
            None => {
                adapter.upsert(&dep.name, &dep.version, group);
                report.added.push(dep.name.clone());
            }
            Some(existing) if compare_specs(&dep.version, &existing) == Ordering::Greater => {
                adapter.upsert(&dep.name, &dep.version, group);
                report.upgraded.push(dep.name.clone());
            }
            Some(_) => report.kept.push(dep.name.clone()),
        }
    }

    if report.changed() {
        report.written = fsutil::write_if_changed(&path, adapter.write().as_bytes())?;
    }
    tracing::debug!(
        file = %report.file,
        added = report.added.len(),
        upgraded = report.upgraded.len(),
        kept = report.kept.len(),
        "composed dependencies"
    );
    Ok(report)
}

/// Compose main and dev dependencies with the adapters for `language`.
/// Unknown languages compose nothing.
pub fn compose_for_language(
    project_root: &Path,
    language: &str,
    deps: &[DependencySpec],
) -> Result<Vec<ComposeReport>> {
    if deps.is_empty() {
        return Ok(Vec::new());
    }
    let (dev, main): (Vec<DependencySpec>, Vec<DependencySpec>) =
        deps.iter().cloned().partition(is_dev);
    let mut reports = Vec::new();
    match language {
        "python" => {
            if !main.is_empty() {
                reports.push(compose(project_root, &mut RequirementsTxt::main(), &main)?);
            }
            if !dev.is_empty() {
                reports.push(compose(project_root, &mut RequirementsTxt::dev(), &dev)?);
            }
        }
        "typescript" | "javascript" => {
            reports.push(compose(project_root, &mut PackageJson::default(), deps)?);
        }
        other => {
            tracing::warn!(language = %other, "no dependency adapter for language");
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dep(name: &str, version: &str) -> DependencySpec {
        DependencySpec {
            name: name.into(),
            version: version.into(),
            source: None,
            group: None,
        }
    }

    #[test]
    fn test_spec_floor() {
        assert_eq!(spec_floor(">=1.2").unwrap().to_string(), "1.2.0");
        assert_eq!(spec_floor("^3.0.1").unwrap().to_string(), "3.0.1");
        assert_eq!(spec_floor("==2.0,<3").unwrap().to_string(), "2.0.0");
        assert!(spec_floor("*").is_none());
        assert!(spec_floor("latest").is_none());
    }

    #[test]
    fn test_collect_walks_chain_and_keeps_highest() {
        let manifest: ModuleManifest = serde_yaml::from_str(
            r#"
name: logging
version: 1.0.0
status: stable
profile_inherits:
  fastapi/ddd: fastapi/standard
dependencies:
  fastapi/standard:
    - {name: structlog, version: ">=23.0"}
    - {name: rich}
  fastapi/ddd:
    - {name: structlog, version: ">=24.1"}
  nestjs/standard:
    - {name: pino, version: "^9.0.0"}
"#,
        )
        .unwrap();
        let deps = collect(&manifest, Some("fastapi/ddd"), &[dep("rich", "13.0")]);
        let names: Vec<(&str, &str)> = deps
            .iter()
            .map(|d| (d.name.as_str(), d.version.as_str()))
            .collect();
        assert_eq!(names, vec![("rich", "13.0"), ("structlog", ">=24.1")]);
    }

    #[test]
    fn test_compose_never_downgrades() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("requirements.txt"),
            "fastapi>=0.110\nstructlog>=25.0\n",
        )
        .unwrap();

        let report = compose(
            tmp.path(),
            &mut RequirementsTxt::main(),
            &[dep("structlog", ">=24.1"), dep("fastapi", ">=0.115"), dep("rich", "*")],
        )
        .unwrap();
        assert_eq!(report.added, vec!["rich"]);
        assert_eq!(report.upgraded, vec!["fastapi"]);
        assert_eq!(report.kept, vec!["structlog"]);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("requirements.txt")).unwrap(),
            "fastapi>=0.115\nstructlog>=25.0\nrich\n"
        );

        let again = compose(
            tmp.path(),
            &mut RequirementsTxt::main(),
            &[dep("structlog", ">=24.1"), dep("fastapi", ">=0.115"), dep("rich", "*")],
        )
        .unwrap();
        assert!(!again.changed());
        assert!(!again.written);
    }

    #[test]
    fn test_compose_for_language_splits_dev() {
        let tmp = TempDir::new().unwrap();
        let mut pytest = dep("pytest", ">=8");
        pytest.group = Some(DEV_GROUP.into());
        let deps = [dep("structlog", ">=24"), pytest];
        let reports = compose_for_language(tmp.path(), "python", &deps).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(tmp.path().join("requirements-dev.txt").is_file());
        assert!(compose_for_language(tmp.path(), "cobol", &[dep("x", "1")])
            .unwrap()
            .is_empty());
    }
}
