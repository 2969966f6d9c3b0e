//! Writing planned files into the project and recording them

use super::PlannedFile;
use crate::error::Result;
use crate::fsutil;
use crate::state::{FileAction, FileRecord, FileStateStore};
use serde::Serialize;

/// What emission did with one planned file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitAction {
    Created,
    Updated,
    /// Disk already held the rendered bytes; only the registry was touched
    Adopted,
    Unchanged,
    ForceOverwritten,
    /// Local edits were found and left alone
    SkippedModified,
}

impl EmitAction {
    pub fn wrote(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::ForceOverwritten)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmitOutcome {
    pub file: String,
    pub action: EmitAction,
}

/// Writes files for one module and keeps the file-state registry in step
pub(crate) struct Emitter<'a> {
    pub store: &'a mut FileStateStore,
    pub module: &'a str,
    pub version: &'a str,
    pub force: bool,
    backed_up: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(
        store: &'a mut FileStateStore,
        module: &'a str,
        version: &'a str,
        force: bool,
    ) -> Self {
        Self {
            store,
            module,
            version,
            force,
            backed_up: false,
        }
    }

    /// Back up `hashes.json` once, before anything changes
    fn checkpoint(&mut self) -> Result<()> {
        if !self.backed_up {
            self.store.backup()?;
            self.backed_up = true;
        }
        Ok(())
    }

    fn record(
        &mut self,
        rel: &str,
        hash: &str,
        action: FileAction,
        snapshot: Option<String>,
    ) -> Result<()> {
        let unchanged = self.store.entry(rel).is_some_and(|e| {
            e.module == self.module && e.module_version == self.version && e.current_hash == hash
        }) && snapshot.is_none();
        if !unchanged {
            self.checkpoint()?;
        }
        self.store.record(
            rel,
            FileRecord {
                module: self.module,
                module_version: self.version,
                hash,
                action,
                snapshot,
            },
        );
        Ok(())
    }

    pub fn emit(&mut self, file: &PlannedFile) -> Result<EmitOutcome> {
        let path = fsutil::join_rel(self.store.project_root(), &file.rel);
        let disk = fsutil::read_optional(&path)?;
        let outcome = |action| EmitOutcome {
            file: file.rel.clone(),
            action,
        };

        let Some(disk) = disk else {
            self.checkpoint()?;
            fsutil::atomic_write(&path, file.content.as_bytes())?;
            self.record(&file.rel, &file.hash, FileAction::Create, None)?;
            tracing::debug!(file = %file.rel, "created");
            return Ok(outcome(EmitAction::Created));
        };

        if disk == file.content.as_bytes() {
            let tracked = self.store.entry(&file.rel).is_some_and(|e| {
                e.module == self.module
                    && e.module_version == self.version
                    && e.current_hash == file.hash
            });
            if tracked {
                return Ok(outcome(EmitAction::Unchanged));
            }
            self.record(&file.rel, &file.hash, FileAction::Adopt, None)?;
            tracing::debug!(file = %file.rel, "adopted existing file");
            return Ok(outcome(EmitAction::Adopted));
        }

        let disk_hash = fsutil::sha256_hex(&disk);
        let pristine = self
            .store
            .entry(&file.rel)
            .is_some_and(|e| e.current_hash == disk_hash);
        if !pristine && !self.force {
            tracing::warn!(
                file = %file.rel,
                "locally modified, skipping (use --force to overwrite)"
            );
            return Ok(outcome(EmitAction::SkippedModified));
        }

        self.checkpoint()?;
        let snapshot = self.store.store_snapshot(&disk)?;
        fsutil::atomic_write(&path, file.content.as_bytes())?;
        let (action, emitted) = if pristine {
            (FileAction::Update, EmitAction::Updated)
        } else {
            (FileAction::ForceOverwrite, EmitAction::ForceOverwritten)
        };
        self.record(&file.rel, &file.hash, action, Some(snapshot))?;
        tracing::debug!(file = %file.rel, action = ?emitted, "wrote file");
        Ok(outcome(emitted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FileKind;
    use tempfile::TempDir;

    fn planned(rel: &str, content: &str) -> PlannedFile {
        PlannedFile {
            rel: rel.into(),
            kind: FileKind::Variant,
            template: "templates/x.j2".into(),
            hash: fsutil::sha256_hex(content.as_bytes()),
            content: content.into(),
        }
    }

    #[test]
    fn test_create_then_unchanged() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        let file = planned("backend/core/config.py", "A = 1\n");

        let mut emitter = Emitter::new(&mut store, "logging", "1.0.0", false);
        assert_eq!(emitter.emit(&file).unwrap().action, EmitAction::Created);
        assert_eq!(emitter.emit(&file).unwrap().action, EmitAction::Unchanged);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("backend/core/config.py")).unwrap(),
            "A = 1\n"
        );
    }

    #[test]
    fn test_adopts_identical_untracked_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "A = 1\n").unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        let mut emitter = Emitter::new(&mut store, "logging", "1.0.0", false);
        assert_eq!(
            emitter.emit(&planned("a.py", "A = 1\n")).unwrap().action,
            EmitAction::Adopted
        );
        assert_eq!(store.entry("a.py").unwrap().last_action, FileAction::Adopt);
    }

    #[test]
    fn test_updates_pristine_and_skips_modified() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        {
            let mut emitter = Emitter::new(&mut store, "logging", "1.0.0", false);
            emitter.emit(&planned("a.py", "A = 1\n")).unwrap();
            emitter.emit(&planned("b.py", "B = 1\n")).unwrap();
        }
        std::fs::write(tmp.path().join("b.py"), "B = 99\n").unwrap();

        let mut emitter = Emitter::new(&mut store, "logging", "1.1.0", false);
        assert_eq!(
            emitter.emit(&planned("a.py", "A = 2\n")).unwrap().action,
            EmitAction::Updated
        );
        assert_eq!(
            emitter.emit(&planned("b.py", "B = 2\n")).unwrap().action,
            EmitAction::SkippedModified
        );
        assert_eq!(std::fs::read_to_string(tmp.path().join("b.py")).unwrap(), "B = 99\n");

        let entry = store.entry("a.py").unwrap();
        let snapshot = entry.snapshot_hash.clone().unwrap();
        assert_eq!(
            store.load_snapshot(&snapshot).unwrap().unwrap(),
            b"A = 1\n".to_vec()
        );
    }

    #[test]
    fn test_force_snapshots_local_edits() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "mine\n").unwrap();
        let mut store = FileStateStore::load(tmp.path()).unwrap();
        let mut emitter = Emitter::new(&mut store, "logging", "1.0.0", true);
        assert_eq!(
            emitter.emit(&planned("a.py", "theirs\n")).unwrap().action,
            EmitAction::ForceOverwritten
        );
        let snapshot = store.entry("a.py").unwrap().snapshot_hash.clone().unwrap();
        assert_eq!(store.load_snapshot(&snapshot).unwrap().unwrap(), b"mine\n".to_vec());
    }
}
