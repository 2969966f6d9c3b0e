//! Module discovery: locating the modules root and resolving slugs

use super::{ModuleManifest, MANIFEST_FILE};
use crate::config::EngineConfig;
use crate::error::{Error, ManifestError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Optional catalog at the modules root mapping names to template paths
const CATALOG_FILE: &str = "modules.yaml";

/// Directories never searched for manifests
const SKIP_DIRS: &[&str] = &[".git", ".rapidkit", "__pycache__", "node_modules", "templates"];

/// A manifest together with where it was loaded from
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub manifest: ModuleManifest,

    /// Directory containing `module.yaml`
    pub dir: PathBuf,

    pub manifest_path: PathBuf,

    /// Directory template paths are resolved against
    pub template_root: PathBuf,
}

impl LoadedModule {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Absolute path of a manifest-relative template
    pub fn template_path(&self, template: &str) -> PathBuf {
        self.template_root.join(template)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    modules: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    templates_path: String,
}

/// Locate the modules root starting from the current directory
pub fn resolve_modules_root(config: &EngineConfig) -> Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
    resolve_modules_root_from(config, &[cwd])
}

/// Locate the modules root: env override, then `src/modules` or `modules` found by
/// walking upward from each anchor, then the installed-package location.
pub fn resolve_modules_root_from(config: &EngineConfig, anchors: &[PathBuf]) -> Result<PathBuf> {
    if let Some(root) = &config.modules_root {
        if root.is_dir() {
            return Ok(root.clone());
        }
        tracing::warn!(root = %root.display(), "configured modules root does not exist");
    }

    for anchor in anchors {
        for dir in anchor.ancestors() {
            for candidate in [dir.join("src").join("modules"), dir.join("modules")] {
                if candidate.is_dir() {
                    return Ok(candidate);
                }
            }
        }
    }

    if let Some(installed) = installed_modules_root() {
        return Ok(installed);
    }

    Err(ManifestError::ModulesRootNotFound.into())
}

fn installed_modules_root() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let bin_dir = exe.parent()?;
    [
        bin_dir.join("../share/rapidkit/modules"),
        bin_dir.join("modules"),
    ]
    .into_iter()
    .find(|p| p.is_dir())
}

/// Resolve a slug (`name`, `tier/category/name`, or catalog entry) to a module directory
pub fn resolve_module_directory(root: &Path, slug: &str) -> Result<PathBuf> {
    let slug = slug.trim().trim_matches('/');

    let direct = root.join(slug);
    if direct.join(MANIFEST_FILE).is_file() {
        return Ok(direct);
    }

    let catalog = load_catalog(root)?;
    if let Some(path) = catalog.get(slug) {
        if path.join(MANIFEST_FILE).is_file() {
            return Ok(path.clone());
        }
        tracing::warn!(slug, path = %path.display(), "catalog entry has no module.yaml");
    }

    let leaf = slug.rsplit('/').next().unwrap_or(slug);
    for manifest_path in manifest_paths(root) {
        let Some(dir) = manifest_path.parent() else {
            continue;
        };
        if dir.file_name().is_some_and(|n| n == leaf) {
            return Ok(dir.to_path_buf());
        }
        if let Ok(text) = fs::read_to_string(&manifest_path) {
            if let Ok(manifest) = ModuleManifest::from_yaml(&manifest_path, &text) {
                if manifest.name == slug || manifest.name == leaf {
                    return Ok(dir.to_path_buf());
                }
            }
        }
    }

    Err(ManifestError::ModuleNotFound {
        slug: slug.to_string(),
        root: root.to_path_buf(),
    }
    .into())
}

fn load_catalog(root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let path = root.join(CATALOG_FILE);
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let catalog: Catalog = serde_yaml::from_str(&text).map_err(|source| Error::Yaml {
        path: path.clone(),
        source,
    })?;
    Ok(catalog
        .modules
        .into_iter()
        .map(|entry| {
            let templates_path = PathBuf::from(&entry.templates_path);
            let resolved = if templates_path.is_absolute() {
                templates_path
            } else {
                root.join(templates_path)
            };
            (entry.name, resolved)
        })
        .collect())
}

/// Every `module.yaml` under `root`, in a stable order
fn manifest_paths(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .max_depth(6)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name)))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE)
        .map(|entry| entry.into_path())
        .collect()
}

/// Load and validate a manifest. `path` may be the module directory or the yaml file.
pub fn load_manifest(path: &Path) -> Result<LoadedModule> {
    let manifest_path = if path.is_dir() {
        path.join(MANIFEST_FILE)
    } else {
        path.to_path_buf()
    };
    let dir = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let text = fs::read_to_string(&manifest_path).map_err(|source| ManifestError::Read {
        path: manifest_path.clone(),
        source,
    })?;
    let manifest = ModuleManifest::from_yaml(&manifest_path, &text)?;

    let template_root = match &manifest.templates_path {
        Some(rel) => dir.join(rel),
        None => dir.clone(),
    };
    manifest.validate(&manifest_path, &template_root)?;

    Ok(LoadedModule {
        manifest,
        dir,
        manifest_path,
        template_root,
    })
}

/// Resolve a slug and load its manifest
pub fn find_manifest(root: &Path, slug: &str) -> Result<LoadedModule> {
    let dir = resolve_module_directory(root, slug)?;
    load_manifest(&dir)
}

/// Load every manifest under the modules root, sorted by module name
pub fn load_all_manifests(root: &Path) -> Result<Vec<LoadedModule>> {
    let mut modules: BTreeMap<String, LoadedModule> = BTreeMap::new();
    for path in manifest_paths(root) {
        let loaded = load_manifest(&path)?;
        if let Some(existing) = modules.get(loaded.name()) {
            tracing::warn!(
                module = loaded.name(),
                kept = %existing.dir.display(),
                ignored = %loaded.dir.display(),
                "duplicate module name"
            );
            continue;
        }
        modules.insert(loaded.name().to_string(), loaded);
    }
    Ok(modules.into_values().collect())
}

/// Filter modules for the test matrix using the configured status and exclusion lists
pub fn select_test_modules<'a>(
    modules: &'a [LoadedModule],
    config: &EngineConfig,
) -> Vec<&'a LoadedModule> {
    modules
        .iter()
        .filter(|m| {
            config.test_allowed_statuses.is_empty()
                || config
                    .test_allowed_statuses
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(&m.manifest.status))
        })
        .filter(|m| !config.test_excluded_modules.contains(&m.manifest.name))
        .collect()
}
