//! `uninstall module`: remove files the engine wrote and nobody edited since

use super::{module_vendor_dir, resolve_target, SkippedFile, UNINSTALL_SCHEMA};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::generator::ModuleGenerator;
use crate::lock::ProjectLock;
use crate::snippets::{RollbackResult, SnippetInjector};
use crate::state::{FileStateStore, InstallRegistry, ModulesLock};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UninstallOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UninstallReport {
    pub schema_version: &'static str,
    pub module: String,
    pub dry_run: bool,
    pub removed: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    pub snippets: Vec<RollbackResult>,
    /// `registry.json` / `modules.lock` entries were dropped
    pub unregistered: bool,
}

pub fn uninstall_module(
    generator: &ModuleGenerator,
    slug: &str,
    project_root: &Path,
    options: &UninstallOptions,
) -> Result<UninstallReport> {
    let target = resolve_target(generator, slug);
    let _lock = if options.dry_run {
        None
    } else {
        Some(ProjectLock::acquire(project_root)?)
    };

    let mut store = FileStateStore::load(project_root)?;
    let owned: Vec<(String, String)> = store
        .entries_for_module(&target.name)
        .map(|(rel, entry)| (rel.clone(), entry.current_hash.clone()))
        .collect();

    let mut removed = Vec::new();
    let mut skipped = Vec::new();
    let mut backed_up = false;
    for (rel, current_hash) in owned {
        let path = fsutil::join_rel(project_root, &rel);
        match fsutil::hash_file(&path)? {
            None => {
                skipped.push(SkippedFile::new(&rel, "missing"));
                if !options.dry_run {
                    store.remove(&rel);
                }
            }
            Some(disk) if disk == current_hash => {
                if !options.dry_run {
                    if !backed_up {
                        store.backup()?;
                        backed_up = true;
                    }
                    fsutil::remove_file_and_prune(&path, project_root)?;
                    store.remove(&rel);
                }
                tracing::debug!(file = %rel, dry_run = options.dry_run, "removing");
                removed.push(rel);
            }
            Some(_) => {
                tracing::warn!(file = %rel, "locally modified, keeping");
                skipped.push(SkippedFile::new(&rel, "modified"));
            }
        }
    }
    if !options.dry_run {
        store.save()?;
    }

    let injector = SnippetInjector::new(project_root, generator.config());
    let snippets = injector.rollback_module(&target.name, options.dry_run)?;

    let blocked = skipped.iter().any(|s| s.reason == "modified");
    let mut unregistered = false;
    if !blocked && !options.dry_run {
        let vendor_dir = module_vendor_dir(generator, project_root, &target);
        if vendor_dir.is_dir() {
            std::fs::remove_dir_all(&vendor_dir).map_err(|e| Error::io(&vendor_dir, e))?;
        }
        let mut installs = InstallRegistry::load(project_root)?;
        installs.remove(&target.name);
        installs.save(project_root)?;
        let mut lock = ModulesLock::load(project_root)?;
        lock.remove(&target.name);
        lock.save(project_root)?;
        unregistered = true;
    }

    let report = UninstallReport {
        schema_version: UNINSTALL_SCHEMA,
        module: target.name,
        dry_run: options.dry_run,
        removed,
        skipped,
        snippets,
        unregistered,
    };
    tracing::info!(
        module = %report.module,
        removed = report.removed.len(),
        skipped = report.skipped.len(),
        dry_run = report.dry_run,
        "uninstall finished"
    );
    Ok(report)
}
