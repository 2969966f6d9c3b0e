//! `checkpoint module`: accept the current disk content as the new baseline

use super::{resolve_target, SkippedFile, CHECKPOINT_SCHEMA};
use crate::error::Result;
use crate::fsutil;
use crate::generator::ModuleGenerator;
use crate::lock::ProjectLock;
use crate::state::{compute_state, FileAction, FileRecord, FileState, FileStateStore};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointOptions {
    /// Snapshot files that match the registry as well
    pub include_clean: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointEntry {
    pub file: String,
    pub status_before: FileState,
    pub snapshot_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointReport {
    pub schema_version: &'static str,
    pub module: String,
    pub files: Vec<CheckpointEntry>,
    pub skipped: Vec<SkippedFile>,
}

pub fn checkpoint_module(
    generator: &ModuleGenerator,
    slug: &str,
    project_root: &Path,
    options: &CheckpointOptions,
) -> Result<CheckpointReport> {
    let target = resolve_target(generator, slug);
    let _lock = ProjectLock::acquire(project_root)?;

    let mut store = FileStateStore::load(project_root)?;
    let owned: Vec<(String, crate::state::FileEntry)> = store
        .entries_for_module(&target.name)
        .map(|(rel, entry)| (rel.clone(), entry.clone()))
        .collect();

    let mut report = CheckpointReport {
        schema_version: CHECKPOINT_SCHEMA,
        module: target.name.clone(),
        files: Vec::new(),
        skipped: Vec::new(),
    };
    let mut backed_up = false;

    for (rel, entry) in owned {
        let Some(bytes) = fsutil::read_optional(&fsutil::join_rel(project_root, &rel))? else {
            report.skipped.push(SkippedFile::new(&rel, "missing"));
            continue;
        };
        let hash = fsutil::sha256_hex(&bytes);
        let status = compute_state(Some(&entry), Some(&hash), None);
        if status == FileState::Clean && !options.include_clean {
            report.skipped.push(SkippedFile::new(&rel, "clean"));
            continue;
        }

        if !backed_up {
            store.backup()?;
            backed_up = true;
        }
        let snapshot = store.store_snapshot(&bytes)?;
        store.record(
            &rel,
            FileRecord {
                module: &entry.module,
                module_version: &entry.module_version,
                hash: &hash,
                action: FileAction::Checkpoint,
                snapshot: Some(snapshot.clone()),
            },
        );
        tracing::debug!(file = %rel, status = %status, "checkpointed");
        report.files.push(CheckpointEntry {
            file: rel,
            status_before: status,
            snapshot_hash: snapshot,
        });
    }

    store.save()?;
    tracing::info!(
        module = %report.module,
        files = report.files.len(),
        "checkpoint finished"
    );
    Ok(report)
}
