//! Lifecycle operations on installed modules
//!
//! Each operation returns a serializable report carrying a `schema_version`
//! so the CLI can print either JSON or a human summary from the same data.

pub mod checkpoint;
pub mod diff;
pub mod merge;
pub mod rollback;
pub mod uninstall;

pub use checkpoint::{checkpoint_module, CheckpointEntry, CheckpointOptions, CheckpointReport};
pub use diff::{diff_module, DiffEntry, DiffReport};
pub use merge::{
    merge_module, KeepCurrentPrompter, MergeAction, MergeDecision, MergeOptions, MergePrompter,
    MergeReport, MergeStrategy,
};
pub use rollback::{rollback_module, RollbackEntry, RollbackOptions, RollbackReport, RollbackSource};
pub use uninstall::{uninstall_module, UninstallOptions, UninstallReport};

use crate::error::Result;
use crate::fsutil;
use crate::generator::{GenerateOptions, ModuleGenerator};
use crate::manifest::LoadedModule;
use crate::state::InstallRegistry;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DIFF_SCHEMA: &str = "diff-v1";
pub const MERGE_SCHEMA: &str = "merge-v1";
pub const UNINSTALL_SCHEMA: &str = "uninstall-v1";
pub const ROLLBACK_SCHEMA: &str = "rollback-v1";
pub const CHECKPOINT_SCHEMA: &str = "checkpoint-v1";

/// A file an operation left alone, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

impl SkippedFile {
    pub fn new(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// The module behind a slug. Operations on modules whose sources are gone
/// still work from the registry, so a failed load is not an error here.
pub(crate) struct Target {
    pub name: String,
    pub module: Option<LoadedModule>,
}

pub(crate) fn resolve_target(generator: &ModuleGenerator, slug: &str) -> Target {
    match generator.load(slug) {
        Ok(module) => Target {
            name: module.name().to_string(),
            module: Some(module),
        },
        Err(err) => {
            tracing::debug!(slug, error = %err, "module sources unavailable, using registry only");
            Target {
                name: slug.rsplit('/').next().unwrap_or(slug).to_string(),
                module: None,
            }
        }
    }
}

/// Generation options matching how the module was installed
pub(crate) fn installed_options(project_root: &Path, module: &str) -> Result<GenerateOptions> {
    let installs = InstallRegistry::load(project_root)?;
    Ok(GenerateOptions {
        profile: installs.get(module).and_then(|m| m.profile.clone()),
        ..GenerateOptions::default()
    })
}

/// `<vendor_root>/<module>` for a project
pub(crate) fn module_vendor_dir(
    generator: &ModuleGenerator,
    project_root: &Path,
    target: &Target,
) -> PathBuf {
    let manifest_root = target
        .module
        .as_ref()
        .and_then(|m| m.manifest.generation.vendor.root.as_deref());
    generator
        .config()
        .vendor_root_for(project_root, manifest_root)
        .join(&target.name)
}

/// Find a file under the module's vendor tree whose content hash is `hash`
pub(crate) fn find_in_vendor(vendor_dir: &Path, hash: &str) -> Result<Option<Vec<u8>>> {
    if !vendor_dir.is_dir() {
        return Ok(None);
    }
    for entry in WalkDir::new(vendor_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if let Some(bytes) = fsutil::read_optional(entry.path())? {
            if fsutil::sha256_hex(&bytes) == hash {
                return Ok(Some(bytes));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_in_vendor_matches_by_hash() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("logging/1.0.0/src");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.py"), "A = 1\n").unwrap();
        std::fs::write(dir.join("b.py"), "B = 1\n").unwrap();

        let hash = fsutil::sha256_hex(b"B = 1\n");
        assert_eq!(
            find_in_vendor(&tmp.path().join("logging"), &hash).unwrap(),
            Some(b"B = 1\n".to_vec())
        );
        assert_eq!(find_in_vendor(&tmp.path().join("logging"), "0000").unwrap(), None);
        assert_eq!(find_in_vendor(&tmp.path().join("missing"), &hash).unwrap(), None);
    }
}
