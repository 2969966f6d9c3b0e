//! Anchor-based snippet injection
//!
//! A snippet is a rendered fragment placed after an anchor comment such as
//! `# <<<inject:module-dependencies>>>` and bracketed by start/end markers
//! carrying the snippet id. Every applied snippet is tracked in
//! `.rapidkit/snippet_registry.json` and every non-noop outcome is appended
//! to `.rapidkit/audit/snippet_injections.jsonl`.

pub mod anchor;
pub mod format;
pub mod injector;
pub mod python;
pub mod registry;

pub use anchor::{Anchor, CommentStyle};
pub use injector::{RollbackResult, SnippetInjector};
pub use registry::{SnippetEntry, SnippetRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How the injected file is post-processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    /// Insert, then run a formatter when one is available
    Default,
    /// Insert only
    NoTouch,
    /// Python: the result must parse and the anchor must be a comment
    AstPy,
}

impl PatchMode {
    /// Default mode for a destination: `ast_py` for Python, `default` otherwise
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") => PatchMode::AstPy,
            _ => PatchMode::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchMode::Default => "default",
            PatchMode::NoTouch => "no_touch",
            PatchMode::AstPy => "ast_py",
        }
    }
}

/// What to do when the snippet block already exists with other content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Replace the block with the new render
    #[default]
    Override,
    /// Append new lines; refuse when the block was edited by hand
    Merge,
    /// Leave the existing block alone
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetStatus {
    Applied,
    Pending,
    Conflicted,
    RolledBack,
}

impl fmt::Display for SnippetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnippetStatus::Applied => "applied",
            SnippetStatus::Pending => "pending",
            SnippetStatus::Conflicted => "conflicted",
            SnippetStatus::RolledBack => "rolled_back",
        })
    }
}

/// Identity and policy of one snippet
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetMetadata {
    pub id: String,
    pub module: String,
    pub version: String,
    pub priority: i32,

    /// Explicit patch mode; derived from the destination when unset
    pub patch_mode: Option<PatchMode>,

    pub conflict_resolution: ConflictResolution,
}

impl SnippetMetadata {
    pub fn new(
        id: impl Into<String>,
        module: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            version: version.into(),
            priority: 0,
            patch_mode: None,
            conflict_resolution: ConflictResolution::default(),
        }
    }
}

/// What the injector did to the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectAction {
    Inserted,
    Replaced,
    Merged,
    Noop,
    Skipped,
    Blocked,
    Conflicted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionResult {
    /// Registry key `<snippet_id>::<relative_path>`
    pub key: String,
    pub file: String,
    pub action: InjectAction,
    pub status: SnippetStatus,

    /// The file was changed
    pub injected: bool,

    /// A non-lenient snippet could not be placed
    pub blocked: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Registry key for a snippet in a file
pub fn registry_key(id: &str, rel: &str) -> String {
    format!("{}::{}", id, rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_mode_defaults_by_extension() {
        assert_eq!(PatchMode::for_path(Path::new("a/b.py")), PatchMode::AstPy);
        assert_eq!(PatchMode::for_path(Path::new("a/b.ts")), PatchMode::Default);
    }

    #[test]
    fn test_manifest_spelling() {
        let mode: PatchMode = serde_yaml::from_str("no_touch").unwrap();
        assert_eq!(mode, PatchMode::NoTouch);
        let strategy: ConflictResolution = serde_yaml::from_str("merge").unwrap();
        assert_eq!(strategy, ConflictResolution::Merge);
        assert_eq!(registry_key("deps", "requirements.txt"), "deps::requirements.txt");
    }
}
