//! `.rapidkit/hashes.json` and content-addressed snapshots

use super::{now_rfc3339, FileAction, FileEntry, STATE_DIR};
use crate::error::{Error, Result};
use crate::fsutil;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const HASHES_FILE: &str = "hashes.json";
pub const BACKUP_FILE: &str = "hashes.json.bak";
pub const SNAPSHOTS_DIR: &str = "snapshots";

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HashesDocument {
    schema_version: u32,

    #[serde(default)]
    files: BTreeMap<String, FileEntry>,
}

impl Default for HashesDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            files: BTreeMap::new(),
        }
    }
}

/// Input for [`FileStateStore::record`]
#[derive(Debug, Clone)]
pub struct FileRecord<'a> {
    pub module: &'a str,
    pub module_version: &'a str,
    pub hash: &'a str,
    pub action: FileAction,

    /// Snapshot of the content this write replaced
    pub snapshot: Option<String>,
}

/// Per-project file registry
#[derive(Debug, Clone)]
pub struct FileStateStore {
    project_root: PathBuf,
    doc: HashesDocument,
    dirty: bool,
}

impl FileStateStore {
    /// Load the registry for a project (empty when absent)
    pub fn load(project_root: &Path) -> Result<Self> {
        let doc = fsutil::load_json_or_default(&Self::hashes_path(project_root))?;
        Ok(Self {
            project_root: project_root.to_path_buf(),
            doc,
            dirty: false,
        })
    }

    pub fn hashes_path(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join(HASHES_FILE)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR).join(SNAPSHOTS_DIR)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Persist the registry if anything changed. Returns whether a write happened.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let written = fsutil::save_json(&Self::hashes_path(&self.project_root), &self.doc)?;
        self.dirty = false;
        Ok(written)
    }

    /// Copy the current `hashes.json` to `hashes.json.bak`
    pub fn backup(&self) -> Result<()> {
        let src = Self::hashes_path(&self.project_root);
        if let Some(bytes) = fsutil::read_optional(&src)? {
            let dest = self.project_root.join(STATE_DIR).join(BACKUP_FILE);
            fsutil::write_if_changed(&dest, &bytes)?;
        }
        Ok(())
    }

    pub fn entry(&self, rel: &str) -> Option<&FileEntry> {
        self.doc.files.get(rel)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.doc.files.iter()
    }

    /// Entries owned by a module, in path order
    pub fn entries_for_module<'a>(
        &'a self,
        module: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a FileEntry)> + 'a {
        self.doc.files.iter().filter(move |(_, e)| e.module == module)
    }

    /// Record an engine write. An entry whose module, version and hash are
    /// unchanged is left alone; returns whether the entry changed.
    pub fn record(&mut self, rel: &str, record: FileRecord<'_>) -> bool {
        if let Some(existing) = self.doc.files.get(rel) {
            if existing.module == record.module
                && existing.module_version == record.module_version
                && existing.current_hash == record.hash
                && record.snapshot.is_none()
            {
                return false;
            }
        }

        let existing = self.doc.files.get(rel);
        let (previous_hash, snapshot_hash) = match (record.snapshot, existing) {
            (Some(snapshot), _) => (Some(snapshot.clone()), Some(snapshot)),
            (None, Some(old)) if old.current_hash != record.hash => {
                (Some(old.current_hash.clone()), None)
            }
            (None, Some(old)) => (old.previous_hash.clone(), old.snapshot_hash.clone()),
            (None, None) => (None, None),
        };

        self.doc.files.insert(
            rel.to_string(),
            FileEntry {
                module: record.module.to_string(),
                module_version: record.module_version.to_string(),
                current_hash: record.hash.to_string(),
                previous_hash,
                snapshot_hash,
                last_action: record.action,
                updated_at: now_rfc3339(),
            },
        );
        self.dirty = true;
        true
    }

    /// Replace an entry wholesale
    pub fn put(&mut self, rel: &str, entry: FileEntry) {
        if self.doc.files.get(rel) != Some(&entry) {
            self.doc.files.insert(rel.to_string(), entry);
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, rel: &str) -> Option<FileEntry> {
        let removed = self.doc.files.remove(rel);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Store bytes as an immutable snapshot, returning its hash
    pub fn store_snapshot(&self, bytes: &[u8]) -> Result<String> {
        let hash = fsutil::sha256_hex(bytes);
        let path = self.snapshots_dir().join(&hash);
        if !path.is_file() {
            fsutil::atomic_write(&path, bytes)?;
            tracing::debug!(snapshot = %hash, "stored snapshot");
        }
        Ok(hash)
    }

    /// Load a snapshot, verifying its content hash
    pub fn load_snapshot(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let path = self.snapshots_dir().join(hash);
        let Some(bytes) = fsutil::read_optional(&path)? else {
            return Ok(None);
        };
        if fsutil::sha256_hex(&bytes) != hash {
            return Err(Error::Other(format!(
                "snapshot {} is corrupt (content hash mismatch)",
                path.display()
            )));
        }
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record<'a>(hash: &'a str, action: FileAction) -> FileRecord<'a> {
        FileRecord {
            module: "logging",
            module_version: "1.0.0",
            hash,
            action,
            snapshot: None,
        }
    }

    #[test]
    fn test_record_is_noop_when_unchanged() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        assert!(store.record("a.py", record("h1", FileAction::Create)));
        assert!(store.save().unwrap());
        let bytes = std::fs::read(FileStateStore::hashes_path(tmp.path())).unwrap();

        let mut store = FileStateStore::load(tmp.path()).unwrap();
        assert!(!store.record("a.py", record("h1", FileAction::Update)));
        assert!(!store.save().unwrap());
        assert_eq!(
            std::fs::read(FileStateStore::hashes_path(tmp.path())).unwrap(),
            bytes
        );
    }

    #[test]
    fn test_record_tracks_previous_hash() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        store.record("a.py", record("h1", FileAction::Create));
        store.record("a.py", record("h2", FileAction::Update));
        let entry = store.entry("a.py").unwrap();
        assert_eq!(entry.previous_hash.as_deref(), Some("h1"));
        assert_eq!(entry.snapshot_hash, None);
        assert_eq!(entry.last_action, FileAction::Update);
    }

    #[test]
    fn test_snapshots_are_content_addressed() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        let hash = store.store_snapshot(b"original\n").unwrap();
        assert_eq!(hash, fsutil::sha256_hex(b"original\n"));
        assert_eq!(
            store.load_snapshot(&hash).unwrap().as_deref(),
            Some(&b"original\n"[..])
        );
        assert!(store.load_snapshot("0000").unwrap().is_none());

        store.record(
            "a.py",
            FileRecord {
                snapshot: Some(hash.clone()),
                ..record("h2", FileAction::Merge)
            },
        );
        let entry = store.entry("a.py").unwrap();
        assert_eq!(entry.snapshot_hash.as_deref(), Some(hash.as_str()));
        assert_eq!(entry.previous_hash.as_deref(), Some(hash.as_str()));
    }

    #[test]
    fn test_backup_copies_hashes() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        store.record("a.py", record("h1", FileAction::Create));
        store.save().unwrap();
        store.backup().unwrap();
        assert!(tmp.path().join(STATE_DIR).join(BACKUP_FILE).is_file());
    }
}
