//! Pending changelog payloads and `docs/changelog.md` materialization

use super::bump::BumpLevel;
use crate::error::{Error, Result};
use crate::fsutil;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the one-shot payload consumed by the next bump
pub const PENDING_FILE: &str = "pending_changelog.yaml";

/// Module-relative path of the rendered changelog
pub const CHANGELOG_MD: &str = "docs/changelog.md";

const CHANGELOG_TITLE: &str = "# Changelog";

/// A change entry: plain text, or a structured record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeItem {
    Text(String),
    Detailed {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,

        description: String,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tickets: Vec<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,

        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
}

impl ChangeItem {
    pub fn kind(&self) -> Option<&str> {
        match self {
            ChangeItem::Text(_) => None,
            ChangeItem::Detailed { kind, .. } => kind.as_deref(),
        }
    }

    fn line(&self) -> String {
        match self {
            ChangeItem::Text(text) => format!("- {}", text.trim()),
            ChangeItem::Detailed {
                description,
                tickets,
                scope,
                ..
            } => {
                let mut line = String::from("- ");
                if let Some(scope) = scope {
                    line.push_str(&format!("**{}**: ", scope));
                }
                line.push_str(description.trim());
                if !tickets.is_empty() {
                    line.push_str(&format!(" ({})", tickets.join(", ")));
                }
                line
            }
        }
    }
}

/// `pending_changelog.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingChangelog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub changes: Vec<ChangeItem>,

    #[serde(default)]
    pub breaking_changes: Vec<ChangeItem>,

    #[serde(default)]
    pub deprecations: Vec<ChangeItem>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl PendingChangelog {
    /// Load the payload from a module directory, if present
    pub fn load(module_dir: &Path) -> Result<Option<Self>> {
        let path = module_dir.join(PENDING_FILE);
        let Some(bytes) = fsutil::read_optional(&path)? else {
            return Ok(None);
        };
        let pending = serde_yaml::from_slice(&bytes).map_err(|source| Error::Yaml {
            path: path.clone(),
            source,
        })?;
        Ok(Some(pending))
    }

    /// Breaking changes bump major, features bump minor, anything else patch
    pub fn bump_level(&self) -> BumpLevel {
        let is_breaking = |kind: &str| matches!(kind, "breaking" | "major");
        let is_feature = |kind: &str| matches!(kind, "feature" | "feat" | "added" | "minor");

        if !self.breaking_changes.is_empty()
            || self.changes.iter().filter_map(ChangeItem::kind).any(is_breaking)
        {
            BumpLevel::Major
        } else if self.changes.iter().filter_map(ChangeItem::kind).any(is_feature) {
            BumpLevel::Minor
        } else {
            BumpLevel::Patch
        }
    }

    /// Markdown section for one release
    pub fn render_section(&self, version: &str, date: &str) -> String {
        let mut out = format!("## [{}] - {}\n", version, date);
        if let Some(description) = self.description.as_deref().map(str::trim) {
            if !description.is_empty() {
                out.push('\n');
                out.push_str(description);
                out.push('\n');
            }
        }

        let mut groups: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for change in &self.changes {
            let heading = match change.kind() {
                Some("feature" | "feat" | "added" | "minor") => "Added",
                Some("fix" | "fixed" | "bugfix") => "Fixed",
                Some("security") => "Security",
                Some("removed") => "Removed",
                _ => "Changed",
            };
            groups.entry(heading).or_default().push(change.line());
        }
        if !self.breaking_changes.is_empty() {
            groups.insert(
                "Breaking Changes",
                self.breaking_changes.iter().map(ChangeItem::line).collect(),
            );
        }
        if !self.deprecations.is_empty() {
            groups.insert(
                "Deprecated",
                self.deprecations.iter().map(ChangeItem::line).collect(),
            );
        }

        for (heading, lines) in groups {
            out.push_str(&format!("\n### {}\n\n", heading));
            for line in lines {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

/// Insert a release section at the top of `docs/changelog.md`, below its title.
/// Returns the path that was written.
pub fn prepend_section(module_dir: &Path, section: &str) -> Result<std::path::PathBuf> {
    let path = module_dir.join(CHANGELOG_MD);
    let existing = fsutil::read_optional(&path)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();

    let (header, body) = split_header(&existing);
    let mut out = String::with_capacity(existing.len() + section.len() + 32);
    let header = header.trim_end();
    out.push_str(if header.is_empty() { CHANGELOG_TITLE } else { header });
    out.push_str("\n\n");
    out.push_str(section.trim_end());
    out.push('\n');
    let body = body.trim_start_matches('\n');
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
    }

    fsutil::atomic_write(&path, out.as_bytes())?;
    Ok(path)
}

/// Everything before the first release heading, and the rest
fn split_header(text: &str) -> (&str, &str) {
    if text.starts_with("## ") {
        return ("", text);
    }
    match text.find("\n## ") {
        Some(idx) => (&text[..=idx], &text[idx + 1..]),
        None => (text, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAYLOAD: &str = r#"
description: Structured output for every handler
changes:
  - type: feature
    description: JSON formatter
    tickets: [RK-12]
    scope: logging
  - Tidy defaults
"#;

    fn pending(text: &str) -> PendingChangelog {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_bump_level_from_payload() {
        assert_eq!(pending(PAYLOAD).bump_level(), BumpLevel::Minor);
        assert_eq!(pending("changes: [typo]").bump_level(), BumpLevel::Patch);
        assert_eq!(
            pending("breaking_changes: [drop py3.8]").bump_level(),
            BumpLevel::Major
        );
    }

    #[test]
    fn test_render_section() {
        let section = pending(PAYLOAD).render_section("1.3.0", "2026-10-18");
        assert!(section.starts_with("## [1.3.0] - 2026-10-18\n"));
        assert!(section.contains("### Added\n\n- **logging**: JSON formatter (RK-12)\n"));
        assert!(section.contains("### Changed\n\n- Tidy defaults\n"));
    }

    #[test]
    fn test_prepend_keeps_previous_releases() {
        let tmp = TempDir::new().unwrap();
        let first = prepend_section(tmp.path(), "## [1.0.1] - 2026-01-01\n\n- a\n").unwrap();
        prepend_section(tmp.path(), "## [1.1.0] - 2026-02-01\n\n- b\n").unwrap();

        let text = std::fs::read_to_string(first).unwrap();
        assert!(text.starts_with("# Changelog\n\n## [1.1.0]"));
        let newer = text.find("[1.1.0]").unwrap();
        let older = text.find("[1.0.1]").unwrap();
        assert!(newer < older);
    }

    #[test]
    fn test_load_missing_payload() {
        let tmp = TempDir::new().unwrap();
        assert!(PendingChangelog::load(tmp.path()).unwrap().is_none());
    }
}
