//! `diff module`: compare the project against the registry and a fresh render

use super::{installed_options, resolve_target, DIFF_SCHEMA};
use crate::error::Result;
use crate::fsutil;
use crate::generator::{FileKind, ModuleGenerator};
use crate::state::{compute_state, FileState, FileStateStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub file: String,
    pub status: FileState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FileKind>,

    /// Content before the last engine write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,

    /// Content the registry expects on disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,

    /// Fresh render at the installed profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub schema_version: &'static str,
    pub module: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub files: Vec<DiffEntry>,

    /// Count per status
    pub summary: BTreeMap<FileState, usize>,
}

impl DiffReport {
    /// Whether every file is clean (or not yet generated)
    pub fn is_clean(&self) -> bool {
        self.files
            .iter()
            .all(|f| matches!(f.status, FileState::Clean | FileState::NewTemplate))
    }

    pub fn entry(&self, file: &str) -> Option<&DiffEntry> {
        self.files.iter().find(|f| f.file == file)
    }
}

/// Diff a module's files. Without module sources only disk and registry are compared.
pub fn diff_module(
    generator: &ModuleGenerator,
    slug: &str,
    project_root: &Path,
) -> Result<DiffReport> {
    let target = resolve_target(generator, slug);
    let store = FileStateStore::load(project_root)?;

    let plan = match &target.module {
        Some(_) => {
            let options = installed_options(project_root, &target.name)?;
            Some(generator.plan(slug, project_root, &options)?)
        }
        None => None,
    };

    let mut paths: BTreeSet<String> = store
        .entries_for_module(&target.name)
        .map(|(rel, _)| rel.clone())
        .collect();
    if let Some(plan) = &plan {
        paths.extend(plan.files.iter().map(|f| f.rel.clone()));
    }

    let mut files = Vec::with_capacity(paths.len());
    let mut summary: BTreeMap<FileState, usize> = BTreeMap::new();
    for rel in paths {
        let entry = store.entry(&rel).filter(|e| e.module == target.name);
        let disk_hash = fsutil::hash_file(&fsutil::join_rel(project_root, &rel))?;
        let planned = plan.as_ref().and_then(|p| p.file(&rel));
        let rendered_hash = planned.map(|f| f.hash.clone());
        let status = compute_state(entry, disk_hash.as_deref(), rendered_hash.as_deref());
        *summary.entry(status).or_default() += 1;
        files.push(DiffEntry {
            file: rel,
            status,
            kind: planned.map(|f| f.kind),
            previous_hash: entry.and_then(|e| e.previous_hash.clone()),
            current_hash: entry.map(|e| e.current_hash.clone()),
            rendered_hash,
            disk_hash,
        });
    }

    tracing::info!(module = %target.name, files = files.len(), "computed diff");
    Ok(DiffReport {
        schema_version: DIFF_SCHEMA,
        module: target.name,
        version: plan.map(|p| p.version),
        files,
        summary,
    })
}
