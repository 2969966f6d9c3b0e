//! Auto-versioning of module sources
//!
//! The versioner hashes a module directory and compares the result with the
//! hash persisted in `.module_state.json`. When the inputs changed, or a
//! `pending_changelog.yaml` is waiting, the module version is bumped, a
//! changelog entry is prepended to `module.yaml`, and `docs/changelog.md` is
//! materialized from the payload.

pub mod bump;
pub mod changelog;
pub mod hash;

pub use bump::{bump, parse_version, BumpLevel};
pub use changelog::{ChangeItem, PendingChangelog, CHANGELOG_MD, PENDING_FILE};
pub use hash::module_content_hash;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::manifest::MANIFEST_FILE;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::path::{Path, PathBuf};

/// Per-module verification state
pub const STATE_FILE: &str = ".module_state.json";

const PENDING_NOTES: &str = "See docs/changelog.md";
const CONTENT_NOTES: &str = "Module content changed";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModuleState {
    pub fn load(module_dir: &Path) -> Result<Self> {
        fsutil::load_json_or_default(&module_dir.join(STATE_FILE))
    }

    pub fn save(&self, module_dir: &Path) -> Result<bool> {
        fsutil::save_json(&module_dir.join(STATE_FILE), self)
    }
}

#[derive(Debug, Clone)]
pub struct VersionOptions {
    /// Delete `pending_changelog.yaml` after it was consumed
    pub clear_pending_changelog: bool,

    /// Do not persist the content hash
    pub skip_verification_write: bool,

    /// Date stamped on new entries (today when unset)
    pub today: Option<NaiveDate>,
}

impl Default for VersionOptions {
    fn default() -> Self {
        Self {
            clear_pending_changelog: true,
            skip_verification_write: false,
            today: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BumpReport {
    pub module: String,
    pub old_version: String,
    pub new_version: String,
    pub level: BumpLevel,
    pub pending_consumed: bool,

    /// Files rewritten or removed by the bump
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VersionOutcome {
    /// Hash matched and nothing was pending
    Unchanged,
    /// First run: the current hash became the reference
    Baseline { content_hash: String },
    Bumped(BumpReport),
}

/// Detects module changes and bumps the manifest version
#[derive(Debug, Clone)]
pub struct AutoVersioner {
    module_dir: PathBuf,
    options: VersionOptions,
}

impl AutoVersioner {
    pub fn new(module_dir: impl Into<PathBuf>, options: VersionOptions) -> Self {
        Self {
            module_dir: module_dir.into(),
            options,
        }
    }

    pub fn content_hash(&self) -> Result<String> {
        module_content_hash(&self.module_dir)
    }

    /// Check the module and bump it if needed
    pub fn run(&self) -> Result<VersionOutcome> {
        let current = self.content_hash()?;
        let state = ModuleState::load(&self.module_dir)?;
        let pending = PendingChangelog::load(&self.module_dir)?;

        match (&state.content_hash, &pending) {
            (Some(recorded), None) if *recorded == current => {
                tracing::debug!(module = %self.module_dir.display(), "module unchanged");
                return Ok(VersionOutcome::Unchanged);
            }
            (None, None) => {
                let version = self.read_manifest()?.1;
                self.persist(&current, &version)?;
                tracing::debug!(module = %self.module_dir.display(), "recorded baseline hash");
                return Ok(VersionOutcome::Baseline {
                    content_hash: current,
                });
            }
            _ => {}
        }

        let report = self.bump(pending.as_ref())?;
        let rehashed = self.content_hash()?;
        self.persist(&rehashed, &report.new_version)?;
        tracing::info!(
            module = %report.module,
            from = %report.old_version,
            to = %report.new_version,
            level = %report.level,
            "bumped module version"
        );
        Ok(VersionOutcome::Bumped(report))
    }

    fn bump(&self, pending: Option<&PendingChangelog>) -> Result<BumpReport> {
        let (mut doc, old_version) = self.read_manifest()?;
        let level = pending.map_or(BumpLevel::Patch, PendingChangelog::bump_level);
        let old = parse_version(&old_version)?;
        let new = bump(&old, level);
        let new_version = new.to_string();
        let date = self
            .options
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();

        let mapping = doc
            .as_mapping_mut()
            .ok_or_else(|| Error::Other("module.yaml is not a mapping".to_string()))?;
        mapping.insert("version".into(), new_version.clone().into());

        let mut entry = Mapping::new();
        entry.insert("version".into(), new_version.clone().into());
        entry.insert("date".into(), date.clone().into());
        entry.insert(
            "notes".into(),
            if pending.is_some() { PENDING_NOTES } else { CONTENT_NOTES }.into(),
        );
        let mut changelog = match mapping.remove("changelog") {
            Some(YamlValue::Sequence(entries)) => entries,
            _ => Vec::new(),
        };
        changelog.insert(0, YamlValue::Mapping(entry));
        mapping.insert("changelog".into(), YamlValue::Sequence(changelog));

        let manifest_path = self.module_dir.join(MANIFEST_FILE);
        let text = serde_yaml::to_string(&doc).map_err(|source| Error::Yaml {
            path: manifest_path.clone(),
            source,
        })?;
        fsutil::atomic_write(&manifest_path, text.as_bytes())?;
        let mut files = vec![manifest_path];

        let module = mapping_name(&doc);
        if let Some(pending) = pending {
            let section = pending.render_section(&new_version, &date);
            files.push(changelog::prepend_section(&self.module_dir, &section)?);
            if self.options.clear_pending_changelog {
                let path = self.module_dir.join(PENDING_FILE);
                std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
                files.push(path);
            }
        }

        Ok(BumpReport {
            module,
            old_version,
            new_version,
            level,
            pending_consumed: pending.is_some(),
            files,
        })
    }

    fn read_manifest(&self) -> Result<(YamlValue, String)> {
        let path = self.module_dir.join(MANIFEST_FILE);
        let raw = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let doc: YamlValue = serde_yaml::from_slice(&raw).map_err(|source| Error::Yaml {
            path: path.clone(),
            source,
        })?;
        let version = doc
            .get("version")
            .and_then(YamlValue::as_str)
            .unwrap_or("0.0.0")
            .to_string();
        Ok((doc, version))
    }

    fn persist(&self, content_hash: &str, version: &str) -> Result<()> {
        if self.options.skip_verification_write {
            tracing::debug!("skipping verification write");
            return Ok(());
        }
        ModuleState {
            content_hash: Some(content_hash.to_string()),
            version: Some(version.to_string()),
        }
        .save(&self.module_dir)?;
        Ok(())
    }
}

fn mapping_name(doc: &YamlValue) -> String {
    doc.get("name")
        .and_then(YamlValue::as_str)
        .unwrap_or_default()
        .to_string()
}
