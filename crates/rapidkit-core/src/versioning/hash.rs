//! Content hash of a module directory

use super::changelog::{CHANGELOG_MD, PENDING_FILE};
use super::STATE_FILE;
use crate::error::{Error, Result};
use crate::fsutil::normalize_rel;
use crate::manifest::MANIFEST_FILE;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

const SKIP_DIRS: &[&str] = &[".git", "__pycache__", ".rapidkit", "node_modules", ".pytest_cache"];

/// Files that the versioner itself writes
const SKIP_FILES: &[&str] = &[STATE_FILE, PENDING_FILE, CHANGELOG_MD];

/// Hash every input file of a module in path order.
///
/// `module.yaml` contributes with `version` and `changelog` removed.
pub fn module_content_hash(module_dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();

    let walker = WalkDir::new(module_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name)))
        });

    for entry in walker {
        let entry = entry.map_err(|e| Error::Other(format!("failed to walk module: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = normalize_rel(entry.path().strip_prefix(module_dir).unwrap_or(entry.path()));
        if SKIP_FILES.contains(&rel.as_str()) || rel.ends_with(".pyc") {
            continue;
        }

        let bytes = if rel == MANIFEST_FILE {
            normalized_manifest(entry.path())?
        } else {
            fs::read(entry.path()).map_err(|e| Error::io(entry.path(), e))?
        };

        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn normalized_manifest(path: &Path) -> Result<Vec<u8>> {
    let raw = fs::read(path).map_err(|e| Error::io(path, e))?;
    let Ok(mut doc) = serde_yaml::from_slice::<serde_yaml::Value>(&raw) else {
        return Ok(raw);
    };
    if let Some(mapping) = doc.as_mapping_mut() {
        mapping.remove("version");
        mapping.remove("changelog");
    }
    serde_yaml::to_string(&doc)
        .map(String::into_bytes)
        .map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn module() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            "name: logging\nversion: 1.0.0\nstatus: stable\n",
        )
        .unwrap();
        fs::create_dir_all(tmp.path().join("templates")).unwrap();
        fs::write(tmp.path().join("templates/a.j2"), "a").unwrap();
        tmp
    }

    #[test]
    fn test_hash_ignores_version_and_state_files() {
        let tmp = module();
        let before = module_content_hash(tmp.path()).unwrap();

        fs::write(
            tmp.path().join(MANIFEST_FILE),
            "name: logging\nversion: 1.1.0\nstatus: stable\nchangelog:\n  - version: 1.1.0\n",
        )
        .unwrap();
        fs::write(tmp.path().join(STATE_FILE), "{}").unwrap();
        fs::write(tmp.path().join(PENDING_FILE), "changes: [x]").unwrap();
        fs::create_dir_all(tmp.path().join("__pycache__")).unwrap();
        fs::write(tmp.path().join("__pycache__/x.pyc"), "junk").unwrap();

        assert_eq!(module_content_hash(tmp.path()).unwrap(), before);
    }

    #[test]
    fn test_hash_tracks_template_changes() {
        let tmp = module();
        let before = module_content_hash(tmp.path()).unwrap();
        fs::write(tmp.path().join("templates/a.j2"), "b").unwrap();
        assert_ne!(module_content_hash(tmp.path()).unwrap(), before);
    }
}
