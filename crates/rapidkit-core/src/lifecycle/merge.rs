//! `merge module`: reconcile files whose disk and template versions diverged

use super::{installed_options, resolve_target, MERGE_SCHEMA};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::generator::ModuleGenerator;
use crate::lock::ProjectLock;
use crate::state::{compute_state, FileAction, FileRecord, FileState, FileStateStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    #[default]
    PreferCurrent,
    PreferTemplate,
    Prompt,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreferCurrent => "prefer-current",
            Self::PreferTemplate => "prefer-template",
            Self::Prompt => "prompt",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    KeepCurrent,
    ApplyTemplate,
}

/// Asks the user how to resolve one file
pub trait MergePrompter {
    fn decide(
        &mut self,
        file: &str,
        status: FileState,
        current: Option<&str>,
        template: &str,
    ) -> Result<MergeDecision>;
}

/// Non-interactive prompter: always keeps the current content
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepCurrentPrompter;

impl MergePrompter for KeepCurrentPrompter {
    fn decide(&mut self, _: &str, _: FileState, _: Option<&str>, _: &str) -> Result<MergeDecision> {
        Ok(MergeDecision::KeepCurrent)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub strategy: MergeStrategy,
    /// Files only the template changed are updated regardless of strategy
    pub auto_apply_template_updated: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeAction {
    pub file: String,
    pub decision: MergeDecision,
    pub status_before: FileState,
    pub status_after: FileState,
    pub will_update: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub schema_version: &'static str,
    pub module: String,
    pub strategy: MergeStrategy,
    pub dry_run: bool,
    pub actions: Vec<MergeAction>,
}

impl MergeReport {
    pub fn updated(&self) -> usize {
        self.actions.iter().filter(|a| a.will_update).count()
    }
}

pub fn merge_module(
    generator: &ModuleGenerator,
    slug: &str,
    project_root: &Path,
    options: &MergeOptions,
    prompter: &mut dyn MergePrompter,
) -> Result<MergeReport> {
    let target = resolve_target(generator, slug);
    if target.module.is_none() {
        return Err(Error::Other(format!(
            "cannot merge '{}': module sources not found under {}",
            slug,
            generator.modules_root().display()
        )));
    }
    let _lock = if options.dry_run {
        None
    } else {
        Some(ProjectLock::acquire(project_root)?)
    };

    let installed = installed_options(project_root, &target.name)?;
    let plan = generator.plan(slug, project_root, &installed)?;
    let mut store = FileStateStore::load(project_root)?;
    let mut backed_up = false;
    let mut actions = Vec::new();

    for file in &plan.files {
        let path = fsutil::join_rel(project_root, &file.rel);
        let disk = fsutil::read_optional(&path)?;
        let disk_hash = disk.as_deref().map(fsutil::sha256_hex);
        let entry = store.entry(&file.rel).filter(|e| e.module == plan.module);
        let status = compute_state(entry, disk_hash.as_deref(), Some(file.hash.as_str()));
        if status == FileState::Clean {
            continue;
        }

        // new outputs have no current content to keep
        let decision = if status == FileState::NewTemplate
            || (status == FileState::TemplateUpdated && options.auto_apply_template_updated)
        {
            MergeDecision::ApplyTemplate
        } else {
            match options.strategy {
                MergeStrategy::PreferCurrent => MergeDecision::KeepCurrent,
                MergeStrategy::PreferTemplate => MergeDecision::ApplyTemplate,
                MergeStrategy::Prompt => {
                    let current = disk.as_deref().map(String::from_utf8_lossy);
                    prompter.decide(&file.rel, status, current.as_deref(), &file.content)?
                }
            }
        };

        let will_update = decision == MergeDecision::ApplyTemplate
            && disk_hash.as_deref() != Some(file.hash.as_str());
        let status_after = match decision {
            MergeDecision::ApplyTemplate => FileState::Clean,
            MergeDecision::KeepCurrent => status,
        };

        if decision == MergeDecision::ApplyTemplate && !options.dry_run {
            if !backed_up {
                store.backup()?;
                backed_up = true;
            }
            let snapshot = match &disk {
                Some(bytes) if will_update => Some(store.store_snapshot(bytes)?),
                _ => None,
            };
            if will_update {
                fsutil::atomic_write(&path, file.content.as_bytes())?;
            }
            store.record(
                &file.rel,
                FileRecord {
                    module: &plan.module,
                    module_version: &plan.version,
                    hash: &file.hash,
                    action: FileAction::Merge,
                    snapshot,
                },
            );
        }

        tracing::debug!(file = %file.rel, status = %status, decision = ?decision, "merge decision");
        actions.push(MergeAction {
            file: file.rel.clone(),
            decision,
            status_before: status,
            status_after,
            will_update,
        });
    }

    if !options.dry_run {
        store.save()?;
    }

    let report = MergeReport {
        schema_version: MERGE_SCHEMA,
        module: plan.module,
        strategy: options.strategy,
        dry_run: options.dry_run,
        actions,
    };
    tracing::info!(
        module = %report.module,
        actions = report.actions.len(),
        updated = report.updated(),
        dry_run = report.dry_run,
        "merge finished"
    );
    Ok(report)
}
