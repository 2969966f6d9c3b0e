//! Installed-module bookkeeping at the project root

use super::now_rfc3339;
use crate::error::Result;
use crate::fsutil;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const REGISTRY_FILE: &str = "registry.json";
pub const LOCK_FILE: &str = "modules.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModule {
    pub slug: String,
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    pub installed_at: String,
}

/// `registry.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRegistry {
    #[serde(default)]
    pub installed_modules: Vec<InstalledModule>,

    /// Keys written by other tools
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InstallRegistry {
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join(REGISTRY_FILE)
    }

    pub fn load(project_root: &Path) -> Result<Self> {
        fsutil::load_json_or_default(&Self::path(project_root))
    }

    pub fn save(&self, project_root: &Path) -> Result<bool> {
        fsutil::save_json(&Self::path(project_root), self)
    }

    pub fn get(&self, name: &str) -> Option<&InstalledModule> {
        self.installed_modules.iter().find(|m| m.name == name)
    }

    /// Insert or update an entry; an identical install keeps its timestamp
    pub fn upsert(&mut self, slug: &str, name: &str, version: &str, profile: Option<&str>) {
        let profile = profile.map(str::to_string);
        if let Some(existing) = self.installed_modules.iter_mut().find(|m| m.name == name) {
            if existing.slug == slug && existing.version == version && existing.profile == profile {
                return;
            }
            existing.slug = slug.to_string();
            existing.version = version.to_string();
            existing.profile = profile;
            existing.installed_at = now_rfc3339();
            return;
        }
        self.installed_modules.push(InstalledModule {
            slug: slug.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            profile,
            installed_at: now_rfc3339(),
        });
        self.installed_modules.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.installed_modules.len();
        self.installed_modules.retain(|m| m.name != name);
        before != self.installed_modules.len()
    }
}

/// `modules.lock`: module name -> installed version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulesLock(pub BTreeMap<String, String>);

impl ModulesLock {
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join(LOCK_FILE)
    }

    pub fn load(project_root: &Path) -> Result<Self> {
        fsutil::load_json_or_default(&Self::path(project_root))
    }

    pub fn save(&self, project_root: &Path) -> Result<bool> {
        fsutil::save_json(&Self::path(project_root), self)
    }

    pub fn set(&mut self, name: &str, version: &str) {
        self.0.insert(name.to_string(), version.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn version(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_upsert_keeps_timestamp_for_identical_install() {
        let mut registry = InstallRegistry::default();
        registry.upsert("free/essentials/logging", "logging", "1.0.0", Some("fastapi/standard"));
        let first = registry.get("logging").unwrap().installed_at.clone();
        registry.upsert("free/essentials/logging", "logging", "1.0.0", Some("fastapi/standard"));
        assert_eq!(registry.installed_modules.len(), 1);
        assert_eq!(registry.get("logging").unwrap().installed_at, first);
    }

    #[test]
    fn test_registry_preserves_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            InstallRegistry::path(tmp.path()),
            r#"{"kit": "fastapi.standard", "installed_modules": []}"#,
        )
        .unwrap();
        let mut registry = InstallRegistry::load(tmp.path()).unwrap();
        registry.upsert("logging", "logging", "1.0.0", None);
        registry.save(tmp.path()).unwrap();

        let text = std::fs::read_to_string(InstallRegistry::path(tmp.path())).unwrap();
        assert!(text.contains("\"kit\": \"fastapi.standard\""));
        assert!(text.contains("\"name\": \"logging\""));
    }

    #[test]
    fn test_modules_lock_format() {
        let tmp = TempDir::new().unwrap();
        let mut lock = ModulesLock::default();
        lock.set("logging", "1.0.0");
        lock.save(tmp.path()).unwrap();
        let text = std::fs::read_to_string(ModulesLock::path(tmp.path())).unwrap();
        assert_eq!(text, "{\n  \"logging\": \"1.0.0\"\n}\n");
        assert_eq!(ModulesLock::load(tmp.path()).unwrap().version("logging"), Some("1.0.0"));
    }
}
