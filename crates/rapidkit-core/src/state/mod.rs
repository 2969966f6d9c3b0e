//! File-state tracking for engine-written files
//!
//! This module provides:
//! - The per-file hash registry (`.rapidkit/hashes.json`) and its snapshots
//! - Lifecycle state derivation (clean, locally modified, ...)
//! - Installed-module bookkeeping (`registry.json`, `modules.lock`)

pub mod install;
pub mod registry;

pub use install::{InstallRegistry, InstalledModule, ModulesLock};
pub use registry::{FileRecord, FileStateStore};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory holding all engine state inside a project
pub const STATE_DIR: &str = ".rapidkit";

/// What the engine last did to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
    /// Existing bytes already matched the render
    Adopt,
    /// Locally modified file overwritten with `--force`
    ForceOverwrite,
    Merge,
    Rollback,
    Checkpoint,
}

/// Registry entry for one engine-owned file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub module: String,
    pub module_version: String,

    /// SHA-256 of the bytes the engine last wrote
    pub current_hash: String,

    /// Hash of the content before the last engine write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,

    /// Snapshot holding the previous content, when one was stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_hash: Option<String>,

    pub last_action: FileAction,
    pub updated_at: String,
}

/// Lifecycle state of a tracked path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Clean,
    LocallyModified,
    TemplateUpdated,
    BothModified,
    NewTemplate,
    Missing,
    Untracked,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Clean => "clean",
            FileState::LocallyModified => "locally_modified",
            FileState::TemplateUpdated => "template_updated",
            FileState::BothModified => "both_modified",
            FileState::NewTemplate => "new_template",
            FileState::Missing => "missing",
            FileState::Untracked => "untracked",
        }
    }

    /// Whether the on-disk bytes diverge from what the engine recorded
    pub fn is_locally_changed(&self) -> bool {
        matches!(self, FileState::LocallyModified | FileState::BothModified)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive a file's state from its registry entry, on-disk hash, and re-render hash.
///
/// A missing re-render (the template is gone in the current module version)
/// compares disk against the registry only.
pub fn compute_state(
    entry: Option<&FileEntry>,
    disk_hash: Option<&str>,
    render_hash: Option<&str>,
) -> FileState {
    let Some(entry) = entry else {
        return match (disk_hash, render_hash) {
            (Some(_), _) => FileState::Untracked,
            (None, Some(_)) => FileState::NewTemplate,
            (None, None) => FileState::Missing,
        };
    };
    let Some(disk_hash) = disk_hash else {
        return FileState::Missing;
    };

    let disk_matches = disk_hash == entry.current_hash;
    let render_matches = render_hash.map_or(true, |h| h == entry.current_hash);
    match (disk_matches, render_matches) {
        (true, true) => FileState::Clean,
        (true, false) => FileState::TemplateUpdated,
        (false, true) => FileState::LocallyModified,
        (false, false) => FileState::BothModified,
    }
}

/// Timestamp format used across state files
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
