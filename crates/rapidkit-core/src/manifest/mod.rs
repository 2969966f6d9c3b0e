//! Module manifest types and parsing
//!
//! This module provides:
//! - `module.yaml` types (ModuleManifest and its sections)
//! - Module discovery and slug resolution
//! - Dependency ordering (Kahn's algorithm)

pub mod order;
pub mod resolver;

use crate::error::{Error, ManifestError, Result};
use crate::overrides::OverrideRecord;
use crate::render::case;
use crate::snippets::{ConflictResolution, PatchMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

pub use order::{compute_install_order, topological_sort};
pub use resolver::{
    find_manifest, load_all_manifests, load_manifest, resolve_module_directory,
    resolve_modules_root, select_test_modules, LoadedModule,
};

/// File name of a module manifest
pub const MANIFEST_FILE: &str = "module.yaml";

/// Lifecycle status of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleStatus {
    Active,
    Stable,
    Beta,
    Draft,
    Experimental,
    Deprecated,
}

impl ModuleStatus {
    pub const ALL: [ModuleStatus; 6] = [
        ModuleStatus::Active,
        ModuleStatus::Stable,
        ModuleStatus::Beta,
        ModuleStatus::Draft,
        ModuleStatus::Experimental,
        ModuleStatus::Deprecated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Active => "active",
            ModuleStatus::Stable => "stable",
            ModuleStatus::Beta => "beta",
            ModuleStatus::Draft => "draft",
            ModuleStatus::Experimental => "experimental",
            ModuleStatus::Deprecated => "deprecated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `depends_on`: a flat list, or a mapping from profile to list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    List(Vec<String>),
    ByProfile(BTreeMap<String, Vec<String>>),
}

impl Default for DependsOn {
    fn default() -> Self {
        DependsOn::List(Vec::new())
    }
}

impl DependsOn {
    fn is_empty(&self) -> bool {
        match self {
            DependsOn::List(list) => list.is_empty(),
            DependsOn::ByProfile(map) => map.values().all(Vec::is_empty),
        }
    }

    /// Every dependency regardless of profile
    pub fn all(&self) -> BTreeSet<String> {
        match self {
            DependsOn::List(list) => list.iter().cloned().collect(),
            DependsOn::ByProfile(map) => map.values().flatten().cloned().collect(),
        }
    }

    /// Dependencies for a profile inheritance chain (child first)
    pub fn for_chain(&self, chain: &[String]) -> BTreeSet<String> {
        match self {
            DependsOn::List(list) => list.iter().cloned().collect(),
            DependsOn::ByProfile(map) => chain
                .iter()
                .filter_map(|profile| map.get(profile))
                .flatten()
                .cloned()
                .collect(),
        }
    }
}

/// A toggleable module feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Profiles the feature applies to (empty means all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// A vendor file: rendered under `.rapidkit/vendor/<module>/<version>/<relative>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorFile {
    pub template: String,
    pub relative: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorSpec {
    /// Vendor destination override (relative to the project root)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    #[serde(default)]
    pub files: Vec<VendorFile>,
}

/// A variant file: rendered into the project tree at `output`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantFile {
    pub template: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    #[serde(default)]
    pub files: Vec<VariantFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    #[serde(default)]
    pub vendor: VendorSpec,

    #[serde(default)]
    pub variants: BTreeMap<String, VariantSpec>,
}

impl Generation {
    fn is_empty(&self) -> bool {
        self.vendor.files.is_empty() && self.vendor.root.is_none() && self.variants.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Testing {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unit_tests: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Testing {
    fn is_empty(&self) -> bool {
        self.unit_tests.is_empty() && self.extra.is_empty()
    }
}

/// One `changelog[]` entry in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub version: String,

    #[serde(default)]
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A fragment injected at an anchor in an existing project file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetDecl {
    pub id: String,

    /// Template path relative to the template root
    pub template: String,

    /// Target file relative to the project root
    pub target: String,

    /// Anchor line or bare anchor name
    pub anchor: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_mode: Option<PatchMode>,

    #[serde(default)]
    pub conflict_resolution: ConflictResolution,

    /// Profiles the snippet applies to (empty means all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,

    /// When false a missing anchor aborts generation
    #[serde(default = "default_true")]
    pub lenient: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

/// A package dependency contributed by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,

    #[serde(default = "default_wildcard")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Dependency group (e.g. `dev`); `None` is the main group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

fn default_wildcard() -> String {
    "*".to_string()
}

/// Manifest-supplied data for a framework plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameworkSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Role -> template path (relative to the template root)
    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    /// Role -> output path (relative to the project root)
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dev_dependencies: Vec<DependencySpec>,
}

/// Per-module manifest (`<module>/module.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique module slug
    #[serde(default)]
    pub name: String,

    /// Semver version of the module
    #[serde(default)]
    pub version: String,

    /// One of active, stable, beta, draft, experimental, deprecated
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "DependsOn::is_empty")]
    pub depends_on: DependsOn,

    /// Supported profiles (e.g. `fastapi/standard`)
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Child profile -> parent profile
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profile_inherits: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, Feature>,

    #[serde(default, skip_serializing_if = "Generation::is_empty")]
    pub generation: Generation,

    /// Module-specific defaults exposed to templates as `<name>_defaults`
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub defaults: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snippets: Vec<SnippetDecl>,

    /// Profile -> dependencies merged into the project manifest
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Vec<DependencySpec>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub frameworks: BTreeMap<String, FrameworkSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<OverrideRecord>,

    /// Alternative template directory, relative to the module directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub documentation: Value,

    #[serde(default, skip_serializing_if = "Testing::is_empty")]
    pub testing: Testing,

    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,

    /// Keys this version of the engine does not know; preserved on rewrite
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ModuleManifest {
    /// Parse a manifest from YAML text
    pub fn from_yaml(path: &Path, text: &str) -> std::result::Result<Self, ManifestError> {
        serde_yaml::from_str(text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self, path: &Path) -> Result<String> {
        serde_yaml::to_string(self).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn status_kind(&self) -> Option<ModuleStatus> {
        ModuleStatus::parse(&self.status)
    }

    pub fn semver(&self) -> Result<semver::Version> {
        crate::versioning::parse_version(&self.version)
    }

    pub fn snake_name(&self) -> String {
        case::snake(&self.name)
    }

    /// `profile` followed by its ancestors from `profile_inherits`
    pub fn profile_chain(&self, profile: &str) -> Vec<String> {
        let mut chain = vec![profile.to_string()];
        let mut current = profile;
        while let Some(parent) = self.profile_inherits.get(current) {
            if chain.contains(parent) {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// Whether the profile (or one of its ancestors) is declared
    pub fn supports_profile(&self, profile: &str) -> bool {
        self.profiles.is_empty()
            || self
                .profile_chain(profile)
                .iter()
                .any(|p| self.profiles.contains(p))
    }

    /// Module dependencies that apply to a profile
    pub fn dependencies_for(&self, profile: Option<&str>) -> BTreeSet<String> {
        match profile {
            Some(profile) => self.depends_on.for_chain(&self.profile_chain(profile)),
            None => self.depends_on.all(),
        }
    }

    /// Feature flags as seen by a profile
    pub fn features_for(&self, profile: Option<&str>) -> BTreeMap<String, bool> {
        let chain = profile.map(|p| self.profile_chain(p)).unwrap_or_default();
        self.features
            .iter()
            .map(|(name, feature)| {
                let applies = feature.profiles.is_empty()
                    || chain.iter().any(|p| feature.profiles.contains(p));
                (name.clone(), feature.enabled && applies)
            })
            .collect()
    }

    /// Every template path the manifest references
    pub fn referenced_templates(&self) -> Vec<&str> {
        let mut templates: Vec<&str> = Vec::new();
        templates.extend(self.generation.vendor.files.iter().map(|f| f.template.as_str()));
        for variant in self.generation.variants.values() {
            templates.extend(variant.files.iter().map(|f| f.template.as_str()));
        }
        templates.extend(self.snippets.iter().map(|s| s.template.as_str()));
        for framework in self.frameworks.values() {
            templates.extend(framework.templates.values().map(String::as_str));
        }
        templates
    }

    /// Check required fields, status, version, and template existence
    pub fn validate(&self, manifest_path: &Path, template_root: &Path) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::MissingField {
                path: manifest_path.to_path_buf(),
                field: "name",
            }
            .into());
        }
        if self.version.trim().is_empty() {
            return Err(ManifestError::MissingField {
                path: manifest_path.to_path_buf(),
                field: "version",
            }
            .into());
        }
        if self.status_kind().is_none() {
            return Err(ManifestError::InvalidStatus {
                module: self.name.clone(),
                status: self.status.clone(),
                allowed: ModuleStatus::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into());
        }
        if let Err(e) = self.semver() {
            return Err(ManifestError::InvalidVersion {
                module: self.name.clone(),
                version: self.version.clone(),
                reason: e.to_string(),
            }
            .into());
        }
        for template in self.referenced_templates() {
            if !template_root.join(template).is_file() {
                return Err(ManifestError::MissingTemplate {
                    module: self.name.clone(),
                    template: template.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: logging
version: 1.2.0
status: stable
description: Structured logging
depends_on:
  fastapi/standard: [settings]
profiles: [fastapi/standard, nestjs/standard]
profile_inherits:
  fastapi/ddd: fastapi/standard
features:
  json_logs:
    enabled: true
    profiles: [fastapi/standard]
  otel:
    enabled: false
generation:
  vendor:
    files:
      - template: templates/base/logging.py.j2
        relative: src/logging.py
  variants:
    fastapi:
      files:
        - template: templates/variants/fastapi/logging.py.j2
          output: src/core/logging.py
changelog:
  - version: 1.2.0
    date: "2026-01-01"
maintainer: platform-team
"#;

    fn sample() -> ModuleManifest {
        ModuleManifest::from_yaml(Path::new("module.yaml"), SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_sample_manifest() {
        let manifest = sample();
        assert_eq!(manifest.name, "logging");
        assert_eq!(manifest.status_kind(), Some(ModuleStatus::Stable));
        assert_eq!(manifest.generation.vendor.files.len(), 1);
        assert_eq!(
            manifest.extra.get("maintainer"),
            Some(&Value::String("platform-team".into()))
        );
    }

    #[test]
    fn test_profile_chain_and_dependencies() {
        let manifest = sample();
        assert_eq!(
            manifest.profile_chain("fastapi/ddd"),
            vec!["fastapi/ddd".to_string(), "fastapi/standard".to_string()]
        );
        assert!(manifest.supports_profile("fastapi/ddd"));
        assert!(!manifest.supports_profile("django/standard"));
        let deps = manifest.dependencies_for(Some("fastapi/ddd"));
        assert!(deps.contains("settings"));
        assert!(manifest.dependencies_for(Some("nestjs/standard")).is_empty());
    }

    #[test]
    fn test_features_for_profile() {
        let manifest = sample();
        let features = manifest.features_for(Some("fastapi/standard"));
        assert_eq!(features.get("json_logs"), Some(&true));
        assert_eq!(features.get("otel"), Some(&false));
        let features = manifest.features_for(Some("nestjs/standard"));
        assert_eq!(features.get("json_logs"), Some(&false));
    }

    #[test]
    fn test_json_round_trip_is_semantically_equal() {
        let manifest = sample();
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: ModuleManifest = serde_json::from_str(&json).unwrap();
        let again: ModuleManifest =
            serde_json::from_str(&serde_json::to_string(&parsed).unwrap()).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(again, parsed);
    }

    #[test]
    fn test_invalid_status_rejected() {
        let mut manifest = sample();
        manifest.status = "retired".into();
        let tmp = tempfile::TempDir::new().unwrap();
        let err = manifest
            .validate(&tmp.path().join("module.yaml"), tmp.path())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Manifest(ManifestError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_missing_template_rejected() {
        let manifest = sample();
        let tmp = tempfile::TempDir::new().unwrap();
        let err = manifest
            .validate(&tmp.path().join("module.yaml"), tmp.path())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Manifest(ManifestError::MissingTemplate { .. })
        ));
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(ModuleStatus::parse("Beta"), Some(ModuleStatus::Beta));
        assert_eq!(ModuleStatus::parse("gone"), None);
    }
}
