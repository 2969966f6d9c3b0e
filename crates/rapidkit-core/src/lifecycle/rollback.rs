//! `rollback module`: restore each file to the content before its last engine write

use super::{
    find_in_vendor, installed_options, module_vendor_dir, resolve_target, SkippedFile,
    ROLLBACK_SCHEMA,
};
use crate::error::Result;
use crate::fsutil;
use crate::generator::{GenerationPlan, ModuleGenerator};
use crate::lock::ProjectLock;
use crate::state::{now_rfc3339, FileAction, FileEntry, FileStateStore};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Re-render the installed version's template when no snapshot bytes are left
    pub template_reset: bool,
    /// Roll back files even when they were edited since the last write
    pub force: bool,
    pub dry_run: bool,
}

/// Where restored bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackSource {
    Snapshot,
    Vendor,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackEntry {
    pub file: String,
    pub source: RollbackSource,
    pub restored_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub schema_version: &'static str,
    pub module: String,
    pub dry_run: bool,
    pub restored: Vec<RollbackEntry>,
    /// Already at the rollback target
    pub unchanged: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

pub fn rollback_module(
    generator: &ModuleGenerator,
    slug: &str,
    project_root: &Path,
    options: &RollbackOptions,
) -> Result<RollbackReport> {
    let target = resolve_target(generator, slug);
    let _lock = if options.dry_run {
        None
    } else {
        Some(ProjectLock::acquire(project_root)?)
    };

    let plan = if options.template_reset && target.module.is_some() {
        installed_plan(generator, slug, project_root, &target.name)
    } else {
        None
    };
    let vendor_dir = module_vendor_dir(generator, project_root, &target);

    let mut store = FileStateStore::load(project_root)?;
    let entries: Vec<(String, FileEntry)> = store
        .entries_for_module(&target.name)
        .map(|(rel, entry)| (rel.clone(), entry.clone()))
        .collect();

    let mut report = RollbackReport {
        schema_version: ROLLBACK_SCHEMA,
        module: target.name.clone(),
        dry_run: options.dry_run,
        restored: Vec::new(),
        unchanged: Vec::new(),
        skipped: Vec::new(),
    };
    let mut backed_up = false;

    for (rel, entry) in entries {
        let path = fsutil::join_rel(project_root, &rel);
        let disk = fsutil::read_optional(&path)?;
        let disk_hash = disk.as_deref().map(fsutil::sha256_hex);

        if let Some(hash) = &disk_hash {
            if *hash != entry.current_hash && !options.force {
                report.skipped.push(SkippedFile::new(&rel, "modified"));
                continue;
            }
        }

        let wanted = entry.snapshot_hash.clone().or_else(|| entry.previous_hash.clone());
        let Some(wanted) = wanted else {
            report.skipped.push(SkippedFile::new(&rel, "no_previous"));
            continue;
        };
        if disk_hash.as_deref() == Some(wanted.as_str()) {
            report.unchanged.push(rel);
            continue;
        }

        let from_snapshot = match &entry.snapshot_hash {
            Some(snapshot) => store.load_snapshot(snapshot)?,
            None => None,
        };
        let restored = match from_snapshot {
            Some(bytes) => Some((bytes, RollbackSource::Snapshot)),
            None => match find_in_vendor(&vendor_dir, &wanted)? {
                Some(bytes) => Some((bytes, RollbackSource::Vendor)),
                // only a render of the version that wrote the file is a valid baseline
                None => plan
                    .as_ref()
                    .filter(|p| p.version == entry.module_version)
                    .and_then(|p| p.file(&rel))
                    .map(|file| (file.content.as_bytes().to_vec(), RollbackSource::Template)),
            },
        };

        let Some((bytes, source)) = restored else {
            report.skipped.push(SkippedFile::new(&rel, "snapshot_missing"));
            continue;
        };
        let restored_hash = fsutil::sha256_hex(&bytes);
        if disk_hash.as_deref() == Some(restored_hash.as_str()) {
            report.unchanged.push(rel);
            continue;
        }

        if !options.dry_run {
            if !backed_up {
                store.backup()?;
                backed_up = true;
            }
            // keep what we overwrite so the rollback itself can be undone
            let replaced = match &disk {
                Some(bytes) => Some(store.store_snapshot(bytes)?),
                None => None,
            };
            fsutil::atomic_write(&path, &bytes)?;
            store.put(
                &rel,
                FileEntry {
                    current_hash: restored_hash.clone(),
                    previous_hash: Some(entry.current_hash.clone()),
                    snapshot_hash: replaced,
                    last_action: FileAction::Rollback,
                    updated_at: now_rfc3339(),
                    ..entry
                },
            );
        }
        tracing::debug!(file = %rel, source = ?source, dry_run = options.dry_run, "rolled back");
        report.restored.push(RollbackEntry {
            file: rel,
            source,
            restored_hash,
        });
    }

    if !options.dry_run {
        store.save()?;
    }
    tracing::info!(
        module = %report.module,
        restored = report.restored.len(),
        skipped = report.skipped.len(),
        "rollback finished"
    );
    Ok(report)
}

/// Plan at the installed profile, or `None` when the module no longer renders
fn installed_plan(
    generator: &ModuleGenerator,
    slug: &str,
    project_root: &Path,
    module: &str,
) -> Option<GenerationPlan> {
    let options = match installed_options(project_root, module) {
        Ok(options) => options,
        Err(err) => {
            tracing::warn!(module, error = %err, "cannot read installed profile");
            return None;
        }
    };
    match generator.plan(slug, project_root, &options) {
        Ok(plan) => Some(plan),
        Err(err) => {
            tracing::warn!(module, error = %err, "module sources do not render, no template reset");
            None
        }
    }
}
