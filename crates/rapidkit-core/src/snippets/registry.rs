//! Snippet registry and audit trail

use super::{PatchMode, SnippetStatus};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::state::{now_rfc3339, STATE_DIR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const REGISTRY_FILE: &str = "snippet_registry.json";
pub const AUDIT_FILE: &str = "audit/snippet_injections.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetEntry {
    pub status: SnippetStatus,
    pub version: String,

    /// Destination relative to the project root
    pub file: String,

    pub priority: i32,
    pub patch_mode: PatchMode,
    pub module: String,
    pub anchor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<String>,

    /// Hash of the block body as it sits in the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Hash of the rendered snippet before formatting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RegistryDocument {
    schema_version: u32,

    #[serde(default)]
    snippets: BTreeMap<String, SnippetEntry>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            schema_version: 1,
            snippets: BTreeMap::new(),
        }
    }
}

/// `.rapidkit/snippet_registry.json`
#[derive(Debug, Clone)]
pub struct SnippetRegistry {
    path: PathBuf,
    doc: RegistryDocument,
}

impl SnippetRegistry {
    pub fn path_for(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join(REGISTRY_FILE)
    }

    pub fn load(project_root: &Path) -> Result<Self> {
        let path = Self::path_for(project_root);
        let doc = fsutil::load_json_or_default(&path)?;
        Ok(Self { path, doc })
    }

    /// Atomically persist; unchanged content is not rewritten
    pub fn save(&self) -> Result<bool> {
        fsutil::save_json(&self.path, &self.doc)
    }

    pub fn get(&self, key: &str) -> Option<&SnippetEntry> {
        self.doc.snippets.get(key)
    }

    pub fn insert(&mut self, key: &str, entry: SnippetEntry) {
        self.doc.snippets.insert(key.to_string(), entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &SnippetEntry)> {
        self.doc.snippets.iter()
    }

    /// Keys of snippets a module currently has applied
    pub fn applied_for_module(&self, module: &str) -> Vec<String> {
        self.doc
            .snippets
            .iter()
            .filter(|(_, e)| e.module == module && e.status == SnippetStatus::Applied)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// One line of the audit trail
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub timestamp: String,
    pub event: &'a str,
    pub key: &'a str,
    pub file: &'a str,
    pub module: &'a str,
    pub status: SnippetStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<&'a str>,
}

impl<'a> AuditEvent<'a> {
    pub fn new(event: &'a str, key: &'a str, entry: &'a SnippetEntry) -> Self {
        Self {
            timestamp: now_rfc3339(),
            event,
            key,
            file: &entry.file,
            module: &entry.module,
            status: entry.status,
            reason: entry.reason.as_deref(),
            content_hash: entry.content_hash.as_deref(),
        }
    }
}

/// Append one JSON line to the audit trail
pub fn append_audit(project_root: &Path, event: &AuditEvent<'_>) -> Result<()> {
    let path = project_root.join(STATE_DIR).join(AUDIT_FILE);
    fsutil::ensure_parent(&path)?;
    let mut line = serde_json::to_string(event).map_err(|source| Error::Json {
        path: path.clone(),
        source,
    })?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::io(&path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| Error::io(&path, e))?;
    Ok(())
}
