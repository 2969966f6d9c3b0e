//! Filesystem helpers shared by every component
//!
//! All engine writes go through [`atomic_write`]: the bytes land in a temp file
//! next to the destination, get fsynced, then replace the destination with a
//! rename.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Hex-encoded SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a file on disk, returning `None` when it does not exist
pub fn hash_file(path: &Path) -> Result<Option<String>> {
    Ok(read_optional(path)?.map(|bytes| sha256_hex(&bytes)))
}

/// Read a file, treating "not found" as `None`
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Create the parent directory of `path` if needed
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
    }
    Ok(())
}

/// Write bytes atomically: temp file in the same directory, fsync, rename
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Atomically write only when the content differs from what is on disk.
/// Returns `true` when a write happened.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<bool> {
    if read_optional(path)?.as_deref() == Some(bytes) {
        return Ok(false);
    }
    atomic_write(path, bytes)?;
    Ok(true)
}

/// Load a JSON document, returning `T::default()` when the file is absent
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match read_optional(path)? {
        Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
            serde_json::from_slice(&bytes).map_err(|source| Error::Json {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Ok(T::default()),
    }
}

/// Serialize as pretty JSON with a trailing newline and write it if changed
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    text.push('\n');
    write_if_changed(path, text.as_bytes())
}

/// Normalize a project-relative path to forward slashes without `.` segments
pub fn normalize_rel(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    parts.join("/")
}

/// Express `path` relative to `root` (falls back to the path itself)
pub fn relative_to(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => normalize_rel(rel),
        Err(_) => normalize_rel(path),
    }
}

/// Join a normalized relative path onto a root
pub fn join_rel(root: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |acc, seg| acc.join(seg))
}

/// Remove a file and prune directories that became empty, up to `stop_at`
pub fn remove_file_and_prune(path: &Path, stop_at: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(path, e)),
    }
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == stop_at || !current.starts_with(stop_at) {
            break;
        }
        let is_empty = fs::read_dir(current)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty || fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_atomic_write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.txt");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_write_if_changed_skips_identical() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.txt");
        assert!(write_if_changed(&path, b"x").unwrap());
        assert!(!write_if_changed(&path, b"x").unwrap());
        assert!(write_if_changed(&path, b"y").unwrap());
    }

    #[test]
    fn test_normalize_rel() {
        assert_eq!(normalize_rel(Path::new("./src/../backend/core.py")), "backend/core.py");
        assert_eq!(relative_to(Path::new("/p"), Path::new("/p/a/b.py")), "a/b.py");
    }

    #[test]
    fn test_remove_file_and_prune() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x/y/z.txt");
        atomic_write(&path, b"z").unwrap();
        remove_file_and_prune(&path, tmp.path()).unwrap();
        assert!(!tmp.path().join("x").exists());
        assert!(tmp.path().exists());
    }
}
