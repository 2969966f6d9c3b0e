//! The snippet injector

use super::anchor::{parse_marker, Anchor, CommentStyle, MarkerKind};
use super::registry::{append_audit, AuditEvent, SnippetEntry, SnippetRegistry};
use super::{
    format, python, registry_key, ConflictResolution, InjectAction, InjectionResult, PatchMode,
    SnippetMetadata, SnippetStatus,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fsutil;
use crate::render::{Context, TemplateRenderer};
use crate::state::now_rfc3339;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Inserts rendered fragments at anchors and tracks them per project
#[derive(Debug, Clone)]
pub struct SnippetInjector {
    project_root: PathBuf,
    renderer: TemplateRenderer,
    run_formatters: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackResult {
    pub key: String,
    pub file: String,
    pub removed: bool,
    pub dry_run: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

enum BlockLookup {
    Absent,
    Found { start: usize, end: usize },
    Malformed(String),
}

/// Everything needed to write one registry entry
struct Outcome<'a> {
    key: &'a str,
    rel: &'a str,
    anchor: &'a str,
    metadata: &'a SnippetMetadata,
    patch_mode: PatchMode,
}

impl SnippetInjector {
    pub fn new(project_root: impl Into<PathBuf>, config: &EngineConfig) -> Self {
        Self {
            project_root: project_root.into(),
            renderer: TemplateRenderer::default(),
            run_formatters: config.run_formatters,
        }
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Render `template` with `variables` and inject it at `anchor` in `destination`
    pub fn inject(
        &self,
        destination: &Path,
        template: &Path,
        anchor: &str,
        variables: &Context,
        metadata: &SnippetMetadata,
        lenient: bool,
    ) -> Result<InjectionResult> {
        let rendered = self.renderer.render_file(template, variables)?;
        self.inject_rendered(destination, &rendered, anchor, metadata, lenient)
    }

    /// Inject already-rendered snippet content
    pub fn inject_rendered(
        &self,
        destination: &Path,
        rendered: &str,
        anchor_arg: &str,
        metadata: &SnippetMetadata,
        lenient: bool,
    ) -> Result<InjectionResult> {
        let destination = if destination.is_absolute() {
            destination.to_path_buf()
        } else {
            self.project_root.join(destination)
        };
        let rel = fsutil::relative_to(&self.project_root, &destination);
        let key = registry_key(&metadata.id, &rel);
        let style = CommentStyle::for_path(&destination);
        let anchor = Anchor::parse(anchor_arg, style)
            .ok_or_else(|| Error::Other(format!("invalid snippet anchor '{}'", anchor_arg)))?;
        let patch_mode = metadata
            .patch_mode
            .unwrap_or_else(|| PatchMode::for_path(&destination));

        let mut registry = SnippetRegistry::load(&self.project_root)?;
        let outcome = Outcome {
            key: &key,
            rel: &rel,
            anchor: &anchor.name,
            metadata,
            patch_mode,
        };

        let body = normalize_body(rendered);
        let template_hash = fsutil::sha256_hex(body.as_bytes());

        let Some(bytes) = fsutil::read_optional(&destination)? else {
            tracing::warn!(snippet = %key, "snippet destination does not exist");
            return self.not_applied(
                &mut registry,
                &outcome,
                SnippetStatus::Pending,
                InjectAction::Blocked,
                "missing_file",
            );
        };
        let Ok(original) = String::from_utf8(bytes) else {
            return self.not_applied(
                &mut registry,
                &outcome,
                SnippetStatus::Conflicted,
                InjectAction::Conflicted,
                "encoding",
            );
        };

        let mut lines = split_lines(&original);
        let anchor_row = find_anchor(&lines, &anchor).map(|(row, _)| row);

        let action = match find_block(&lines, &anchor.name, &metadata.id) {
            BlockLookup::Malformed(detail) => {
                tracing::warn!(snippet = %key, %detail, "malformed snippet block");
                return self.not_applied(
                    &mut registry,
                    &outcome,
                    SnippetStatus::Conflicted,
                    InjectAction::Conflicted,
                    "malformed_block",
                );
            }
            BlockLookup::Found { start, end } => {
                let indent = leading_whitespace(&lines[start]).to_string();
                let existing = deindent(&lines[start + 1..end], &indent);
                let existing_hash = fsutil::sha256_hex(existing.as_bytes());
                let entry = registry.get(&key);

                if let Some(entry) = entry {
                    if entry.status == SnippetStatus::Applied
                        && entry.template_hash.as_deref() == Some(template_hash.as_str())
                        && entry.content_hash.as_deref() == Some(existing_hash.as_str())
                    {
                        let status = SnippetStatus::Applied;
                        return Ok(result(&outcome, InjectAction::Noop, status, false, None));
                    }
                } else if existing == body {
                    // block already present from an earlier run without registry state
                    let entry = applied_entry(&outcome, &existing_hash, &template_hash, None);
                    registry.insert(&key, entry);
                    registry.save()?;
                    let status = SnippetStatus::Applied;
                    return Ok(result(&outcome, InjectAction::Noop, status, false, None));
                }

                let new_body = match metadata.conflict_resolution {
                    ConflictResolution::Skip => {
                        tracing::debug!(snippet = %key, "existing block kept (skip)");
                        // an untracked block was never applied by us
                        let status = entry.map_or(SnippetStatus::Pending, |e| e.status);
                        if let Some(entry) = entry {
                            let event = AuditEvent::new("skip", &key, entry);
                            append_audit(&self.project_root, &event)?;
                        }
                        let action = InjectAction::Skipped;
                        return Ok(result(&outcome, action, status, false, Some("skip")));
                    }
                    ConflictResolution::Override => body.clone(),
                    ConflictResolution::Merge => {
                        let edited = entry
                            .and_then(|e| e.content_hash.as_deref())
                            .is_some_and(|recorded| recorded != existing_hash);
                        if edited {
                            return self.not_applied(
                                &mut registry,
                                &outcome,
                                SnippetStatus::Conflicted,
                                InjectAction::Conflicted,
                                "merge_conflict",
                            );
                        }
                        merge_lines(&existing, &body)
                    }
                };

                let replacement = indent_body(&new_body, &indent);
                lines.splice(start + 1..end, replacement);
                if metadata.conflict_resolution == ConflictResolution::Merge {
                    InjectAction::Merged
                } else {
                    InjectAction::Replaced
                }
            }
            BlockLookup::Absent => {
                let Some((row, indent)) = find_anchor(&lines, &anchor) else {
                    tracing::warn!(
                        snippet = %key,
                        anchor = %anchor.line(),
                        lenient,
                        "anchor not found"
                    );
                    let action = if lenient {
                        InjectAction::Skipped
                    } else {
                        InjectAction::Blocked
                    };
                    return self.not_applied(
                        &mut registry,
                        &outcome,
                        SnippetStatus::Pending,
                        action,
                        "anchor",
                    );
                };
                let at = insertion_index(&lines, row, &anchor.name);
                if at == lines.len() {
                    if let Some(last) = lines.last_mut() {
                        if !last.ends_with('\n') {
                            last.push('\n');
                        }
                    }
                }
                let mut block = vec![format!("{}{}\n", indent, anchor.start_marker(&metadata.id))];
                block.extend(indent_body(&body, &indent));
                block.push(format!("{}{}\n", indent, anchor.end_marker(&metadata.id)));
                lines.splice(at..at, block);
                InjectAction::Inserted
            }
        };

        let mut updated = lines.concat();
        match patch_mode {
            PatchMode::AstPy => {
                if let Err(detail) = python::check_injection(&original, anchor_row, &updated) {
                    tracing::warn!(snippet = %key, %detail, "ast_py check failed");
                    return self.not_applied(
                        &mut registry,
                        &outcome,
                        SnippetStatus::Conflicted,
                        InjectAction::Conflicted,
                        "parse",
                    );
                }
            }
            PatchMode::Default if self.run_formatters => {
                let formatted = format::format_source(&destination, updated.clone());
                if block_hash(&formatted, &anchor.name, &metadata.id).is_some() {
                    updated = formatted;
                }
            }
            PatchMode::Default | PatchMode::NoTouch => {}
        }

        let content_hash = block_hash(&updated, &anchor.name, &metadata.id)
            .unwrap_or_else(|| template_hash.clone());
        let changed = fsutil::write_if_changed(&destination, updated.as_bytes())?;

        let previous = registry.get(&key).cloned();
        let entry = applied_entry(&outcome, &content_hash, &template_hash, previous.as_ref());
        registry.insert(&key, entry);
        registry.save()?;
        if let Some(entry) = registry.get(&key) {
            append_audit(&self.project_root, &AuditEvent::new("inject", &key, entry))?;
        }

        tracing::debug!(snippet = %key, ?action, changed, "snippet injected");
        Ok(result(&outcome, action, SnippetStatus::Applied, changed, None))
    }

    /// Record a snippet that could not be applied. The file is untouched.
    fn not_applied(
        &self,
        registry: &mut SnippetRegistry,
        outcome: &Outcome<'_>,
        status: SnippetStatus,
        action: InjectAction,
        reason: &str,
    ) -> Result<InjectionResult> {
        let previous = registry.get(outcome.key).cloned();
        let entry = SnippetEntry {
            status,
            version: outcome.metadata.version.clone(),
            file: outcome.rel.to_string(),
            priority: outcome.metadata.priority,
            patch_mode: outcome.patch_mode,
            module: outcome.metadata.module.clone(),
            anchor: outcome.anchor.to_string(),
            applied_at: previous.as_ref().and_then(|p| p.applied_at.clone()),
            rolled_back_at: previous.as_ref().and_then(|p| p.rolled_back_at.clone()),
            content_hash: previous.as_ref().and_then(|p| p.content_hash.clone()),
            template_hash: None,
            reason: Some(reason.to_string()),
        };
        registry.insert(outcome.key, entry.clone());
        registry.save()?;
        append_audit(
            &self.project_root,
            &AuditEvent::new("blocked", outcome.key, &entry),
        )?;
        Ok(result(outcome, action, status, false, Some(reason)))
    }

    /// Remove a snippet block, keeping its anchor. `dry_run` changes nothing.
    pub fn rollback(&self, key: &str, dry_run: bool) -> Result<RollbackResult> {
        let mut registry = SnippetRegistry::load(&self.project_root)?;
        let mut entry = registry
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Other(format!("unknown snippet '{}'", key)))?;
        let id = key.split("::").next().unwrap_or(key);
        let path = fsutil::join_rel(&self.project_root, &entry.file);

        let mut report = RollbackResult {
            key: key.to_string(),
            file: entry.file.clone(),
            removed: false,
            dry_run,
            reason: None,
        };

        let Some(bytes) = fsutil::read_optional(&path)? else {
            report.reason = Some("missing_file".to_string());
            return Ok(report);
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let mut lines = split_lines(&content);

        match find_block(&lines, &entry.anchor, id) {
            BlockLookup::Found { start, end } => {
                lines.drain(start..=end);
                report.removed = true;
            }
            BlockLookup::Absent => report.reason = Some("not_present".to_string()),
            BlockLookup::Malformed(_) => {
                report.reason = Some("malformed_block".to_string());
                return Ok(report);
            }
        }
        if dry_run {
            return Ok(report);
        }

        if report.removed {
            fsutil::atomic_write(&path, lines.concat().as_bytes())?;
        }
        entry.status = SnippetStatus::Pending;
        entry.rolled_back_at = Some(now_rfc3339());
        entry.content_hash = None;
        entry.template_hash = None;
        entry.reason = None;
        registry.insert(key, entry);
        registry.save()?;
        if let Some(entry) = registry.get(key) {
            append_audit(&self.project_root, &AuditEvent::new("rollback", key, entry))?;
        }
        tracing::info!(snippet = key, removed = report.removed, "snippet rolled back");
        Ok(report)
    }

    /// Roll back every applied snippet of a module
    pub fn rollback_module(&self, module: &str, dry_run: bool) -> Result<Vec<RollbackResult>> {
        let registry = SnippetRegistry::load(&self.project_root)?;
        registry
            .applied_for_module(module)
            .iter()
            .map(|key| self.rollback(key, dry_run))
            .collect()
    }
}

fn result(
    outcome: &Outcome<'_>,
    action: InjectAction,
    status: SnippetStatus,
    injected: bool,
    reason: Option<&str>,
) -> InjectionResult {
    InjectionResult {
        key: outcome.key.to_string(),
        file: outcome.rel.to_string(),
        action,
        status,
        injected,
        blocked: action == InjectAction::Blocked,
        reason: reason.map(str::to_string),
    }
}

fn applied_entry(
    outcome: &Outcome<'_>,
    content_hash: &str,
    template_hash: &str,
    previous: Option<&SnippetEntry>,
) -> SnippetEntry {
    SnippetEntry {
        status: SnippetStatus::Applied,
        version: outcome.metadata.version.clone(),
        file: outcome.rel.to_string(),
        priority: outcome.metadata.priority,
        patch_mode: outcome.patch_mode,
        module: outcome.metadata.module.clone(),
        anchor: outcome.anchor.to_string(),
        applied_at: Some(now_rfc3339()),
        rolled_back_at: previous.and_then(|p| p.rolled_back_at.clone()),
        content_hash: Some(content_hash.to_string()),
        template_hash: Some(template_hash.to_string()),
        reason: None,
    }
}

/// Snippet text with a single trailing newline
fn normalize_body(rendered: &str) -> String {
    let trimmed = rendered.trim_end_matches(['\n', '\r']);
    if trimmed.trim().is_empty() {
        return String::new();
    }
    format!("{}\n", trimmed)
}

fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

fn line_text(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn leading_whitespace(line: &str) -> &str {
    let text = line_text(line);
    &text[..text.len() - text.trim_start().len()]
}

/// Row and indentation of the anchor line
fn find_anchor(lines: &[String], anchor: &Anchor) -> Option<(usize, String)> {
    let wanted = anchor.line();
    lines.iter().enumerate().find_map(|(row, line)| {
        let text = line_text(line);
        let trimmed = text.trim_start();
        (trimmed == wanted).then(|| (row, text[..text.len() - trimmed.len()].to_string()))
    })
}

fn find_block(lines: &[String], anchor: &str, id: &str) -> BlockLookup {
    let mut start: Option<usize> = None;
    let mut found: Option<(usize, usize)> = None;

    for (row, line) in lines.iter().enumerate() {
        let Some(marker) = parse_marker(line) else {
            continue;
        };
        if marker.anchor != anchor || marker.id != id {
            continue;
        }
        match (marker.kind, start) {
            (MarkerKind::Start, None) => {
                if found.is_some() {
                    return BlockLookup::Malformed("duplicate block".to_string());
                }
                start = Some(row);
            }
            (MarkerKind::Start, Some(_)) => {
                return BlockLookup::Malformed("nested start marker".to_string())
            }
            (MarkerKind::End, Some(s)) => {
                found = Some((s, row));
                start = None;
            }
            (MarkerKind::End, None) => {
                return BlockLookup::Malformed("end marker without start".to_string())
            }
        }
    }

    match (start, found) {
        (Some(_), _) => BlockLookup::Malformed("start marker without end".to_string()),
        (None, Some((start, end))) => BlockLookup::Found { start, end },
        (None, None) => BlockLookup::Absent,
    }
}

/// First row after the anchor and the blocks already attached to it
fn insertion_index(lines: &[String], anchor_row: usize, anchor: &str) -> usize {
    let mut at = anchor_row + 1;
    while let Some(marker) = lines.get(at).and_then(|l| parse_marker(l)) {
        if marker.anchor != anchor || marker.kind != MarkerKind::Start {
            break;
        }
        let end = lines[at + 1..].iter().position(|l| {
            parse_marker(l).is_some_and(|m| {
                m.anchor == anchor && m.id == marker.id && m.kind == MarkerKind::End
            })
        });
        match end {
            Some(offset) => at += offset + 2,
            None => break,
        }
    }
    at
}

fn indent_body(body: &str, indent: &str) -> Vec<String> {
    body.split_inclusive('\n')
        .map(|line| {
            if line_text(line).trim().is_empty() {
                line.trim_start_matches([' ', '\t']).to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect()
}

fn deindent(lines: &[String], indent: &str) -> String {
    lines
        .iter()
        .map(|line| line.strip_prefix(indent).unwrap_or(line))
        .collect()
}

fn block_hash(content: &str, anchor: &str, id: &str) -> Option<String> {
    let lines = split_lines(content);
    match find_block(&lines, anchor, id) {
        BlockLookup::Found { start, end } => {
            let indent = leading_whitespace(&lines[start]).to_string();
            Some(fsutil::sha256_hex(
                deindent(&lines[start + 1..end], &indent).as_bytes(),
            ))
        }
        _ => None,
    }
}

/// Existing block followed by the new lines it does not contain yet
fn merge_lines(existing: &str, incoming: &str) -> String {
    let present: BTreeSet<&str> = existing.lines().map(str::trim).collect();
    let mut merged = existing.to_string();
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    for line in incoming.lines() {
        if !line.trim().is_empty() && !present.contains(line.trim()) {
            merged.push_str(line);
            merged.push('\n');
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippets::registry::AUDIT_FILE;
    use crate::state::STATE_DIR;
    use std::fs;
    use tempfile::TempDir;

    const ANCHOR: &str = "# <<<inject:module-dependencies>>>";

    fn setup(content: &str) -> (TempDir, PathBuf, SnippetInjector) {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("pyproject.toml");
        fs::write(&file, content).unwrap();
        let injector = SnippetInjector::new(tmp.path(), &EngineConfig::default());
        (tmp, file, injector)
    }

    fn meta(id: &str) -> SnippetMetadata {
        SnippetMetadata::new(id, "logging", "1.0.0")
    }

    #[test]
    fn test_inject_is_idempotent() {
        let (tmp, file, injector) = setup("[deps]\n# <<<inject:module-dependencies>>>\n");
        let first = injector
            .inject_rendered(&file, "gamma = \"0.1.0\"\n", ANCHOR, &meta("gamma"), true)
            .unwrap();
        assert!(first.injected);
        assert_eq!(first.action, InjectAction::Inserted);

        let after_first = fs::read(&file).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&after_first),
            "[deps]\n# <<<inject:module-dependencies>>>\n\
             # <<<inject:module-dependencies:gamma:start>>>\n\
             gamma = \"0.1.0\"\n\
             # <<<inject:module-dependencies:gamma:end>>>\n"
        );
        let registry_first = fs::read(SnippetRegistry::path_for(tmp.path())).unwrap();

        let second = injector
            .inject_rendered(&file, "gamma = \"0.1.0\"\n", ANCHOR, &meta("gamma"), true)
            .unwrap();
        assert!(!second.injected);
        assert_eq!(second.action, InjectAction::Noop);
        assert_eq!(fs::read(&file).unwrap(), after_first);
        assert_eq!(
            fs::read(SnippetRegistry::path_for(tmp.path())).unwrap(),
            registry_first
        );
    }

    #[test]
    fn test_changed_snippet_replaces_block() {
        let (_tmp, file, injector) = setup("# <<<inject:module-dependencies>>>\n");
        injector
            .inject_rendered(&file, "a = 1\n", ANCHOR, &meta("x"), true)
            .unwrap();
        let second = injector
            .inject_rendered(&file, "a = 2\n", ANCHOR, &meta("x"), true)
            .unwrap();
        assert_eq!(second.action, InjectAction::Replaced);
        let text = fs::read_to_string(&file).unwrap();
        assert!(text.contains("a = 2\n"));
        assert!(!text.contains("a = 1\n"));
    }

    #[test]
    fn test_blocks_keep_priority_order_and_indentation() {
        let (_tmp, file, injector) = setup("def main():\n    # <<<inject:body>>>\n    return 0\n");
        let mut first = meta("first");
        first.patch_mode = Some(PatchMode::NoTouch);
        let mut second = meta("second");
        second.patch_mode = Some(PatchMode::NoTouch);
        injector.inject_rendered(&file, "a = 1\n", "body", &first, true).unwrap();
        injector.inject_rendered(&file, "b = 2\n", "body", &second, true).unwrap();

        let text = fs::read_to_string(&file).unwrap();
        let a = text.find("    a = 1\n").unwrap();
        let b = text.find("    b = 2\n").unwrap();
        assert!(a < b);
        assert!(text.contains("    # <<<inject:body:second:start>>>\n"));
        assert!(text.ends_with("    return 0\n"));
    }

    #[test]
    fn test_missing_anchor_lenient_and_strict() {
        let (tmp, file, injector) = setup("nothing here\n");
        let lenient = injector
            .inject_rendered(&file, "x\n", ANCHOR, &meta("a"), true)
            .unwrap();
        assert!(!lenient.blocked);
        assert_eq!(lenient.status, SnippetStatus::Pending);

        let strict = injector
            .inject_rendered(&file, "x\n", ANCHOR, &meta("b"), false)
            .unwrap();
        assert!(strict.blocked);
        assert_eq!(strict.reason.as_deref(), Some("anchor"));
        assert_eq!(fs::read_to_string(&file).unwrap(), "nothing here\n");

        let registry = SnippetRegistry::load(tmp.path()).unwrap();
        assert!(registry
            .entries()
            .all(|(_, e)| e.status != SnippetStatus::Applied));
    }

    #[test]
    fn test_missing_file_is_blocked() {
        let tmp = TempDir::new().unwrap();
        let injector = SnippetInjector::new(tmp.path(), &EngineConfig::default());
        let result = injector
            .inject_rendered(&tmp.path().join("nope.txt"), "x\n", ANCHOR, &meta("a"), true)
            .unwrap();
        assert!(result.blocked);
        assert_eq!(result.reason.as_deref(), Some("missing_file"));
    }

    #[test]
    fn test_malformed_block_is_conflicted() {
        let (tmp, file, injector) = setup(
            "# <<<inject:module-dependencies>>>\n# <<<inject:module-dependencies:x:start>>>\nold\n",
        );
        let result = injector
            .inject_rendered(&file, "new\n", ANCHOR, &meta("x"), true)
            .unwrap();
        assert_eq!(result.status, SnippetStatus::Conflicted);
        let registry = SnippetRegistry::load(tmp.path()).unwrap();
        let entry = registry.get("x::pyproject.toml").unwrap();
        assert_eq!(entry.status, SnippetStatus::Conflicted);
    }

    #[test]
    fn test_ast_py_rejects_non_comment_anchor_and_broken_code() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("app.py");
        fs::write(&file, "x = 1\n# <<<inject:imports>>>\n").unwrap();
        let injector = SnippetInjector::new(tmp.path(), &EngineConfig::default());

        let ok = injector
            .inject_rendered(&file, "import os\n", "imports", &meta("os"), true)
            .unwrap();
        assert_eq!(ok.status, SnippetStatus::Applied);

        let broken = injector
            .inject_rendered(&file, "def (:\n", "imports", &meta("bad"), true)
            .unwrap();
        assert_eq!(broken.status, SnippetStatus::Conflicted);
        assert_eq!(broken.reason.as_deref(), Some("parse"));
        assert!(!fs::read_to_string(&file).unwrap().contains("def (:"));
    }

    #[test]
    fn test_merge_refuses_hand_edited_block() {
        let (_tmp, file, injector) = setup("# <<<inject:module-dependencies>>>\n");
        let mut m = meta("x");
        m.conflict_resolution = ConflictResolution::Merge;
        injector.inject_rendered(&file, "a\n", ANCHOR, &m, true).unwrap();

        let merged = injector.inject_rendered(&file, "a\nb\n", ANCHOR, &m, true).unwrap();
        assert_eq!(merged.action, InjectAction::Merged);
        assert!(fs::read_to_string(&file).unwrap().contains("a\nb\n"));

        let text = fs::read_to_string(&file).unwrap().replace("a\nb\n", "a\nmine\n");
        fs::write(&file, text).unwrap();
        let conflicted = injector
            .inject_rendered(&file, "a\nb\nc\n", ANCHOR, &m, true)
            .unwrap();
        assert_eq!(conflicted.status, SnippetStatus::Conflicted);
        assert_eq!(conflicted.reason.as_deref(), Some("merge_conflict"));
    }

    #[test]
    fn test_skip_keeps_existing_block() {
        let (_tmp, file, injector) = setup("# <<<inject:module-dependencies>>>\n");
        let mut m = meta("x");
        injector.inject_rendered(&file, "a\n", ANCHOR, &m, true).unwrap();
        m.conflict_resolution = ConflictResolution::Skip;
        let result = injector.inject_rendered(&file, "b\n", ANCHOR, &m, true).unwrap();
        assert_eq!(result.action, InjectAction::Skipped);
        assert!(fs::read_to_string(&file).unwrap().contains("\na\n"));
    }

    #[test]
    fn test_skip_untracked_block_is_pending() {
        let (tmp, file, injector) = setup(
            "# <<<inject:module-dependencies>>>\n\
             # <<<inject:module-dependencies:x:start>>>\n\
             hand = \"written\"\n\
             # <<<inject:module-dependencies:x:end>>>\n",
        );
        let mut m = meta("x");
        m.conflict_resolution = ConflictResolution::Skip;
        let result = injector.inject_rendered(&file, "b\n", ANCHOR, &m, true).unwrap();
        assert_eq!(result.action, InjectAction::Skipped);
        assert_eq!(result.status, SnippetStatus::Pending);
        assert!(!result.injected);
        assert!(fs::read_to_string(&file).unwrap().contains("hand = \"written\""));
        assert!(SnippetRegistry::load(tmp.path()).unwrap().get("x::pyproject.toml").is_none());
    }

    #[test]
    fn test_rollback_removes_block_and_keeps_anchor() {
        let original = "[deps]\n# <<<inject:module-dependencies>>>\ntail\n";
        let (tmp, file, injector) = setup(original);
        injector
            .inject_rendered(&file, "gamma\n", ANCHOR, &meta("g"), true)
            .unwrap();

        let dry = injector.rollback("g::pyproject.toml", true).unwrap();
        assert!(dry.removed);
        assert_ne!(fs::read_to_string(&file).unwrap(), original);

        let done = injector.rollback("g::pyproject.toml", false).unwrap();
        assert!(done.removed);
        assert_eq!(fs::read_to_string(&file).unwrap(), original);

        let registry = SnippetRegistry::load(tmp.path()).unwrap();
        let entry = registry.get("g::pyproject.toml").unwrap();
        assert_eq!(entry.status, SnippetStatus::Pending);
        assert!(entry.rolled_back_at.is_some());

        // inject -> rollback -> inject matches a single inject
        injector
            .inject_rendered(&file, "gamma\n", ANCHOR, &meta("g"), true)
            .unwrap();
        assert!(fs::read_to_string(&file).unwrap().contains("gamma\n"));
        let audit = fs::read_to_string(tmp.path().join(STATE_DIR).join(AUDIT_FILE)).unwrap();
        assert_eq!(audit.lines().count(), 3);
    }

    #[test]
    fn test_anchor_on_last_line_without_newline() {
        let (_tmp, file, injector) = setup("# <<<inject:module-dependencies>>>");
        injector
            .inject_rendered(&file, "x = 1", ANCHOR, &meta("x"), true)
            .unwrap();
        let text = fs::read_to_string(&file).unwrap();
        assert!(text.starts_with("# <<<inject:module-dependencies>>>\n# <<<inject:"));
        assert!(text.ends_with(":x:end>>>\n"));
    }

    #[test]
    fn test_xml_comment_style() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("index.html");
        fs::write(&file, "<head>\n  <!-- <<<inject:head>>> -->\n</head>\n").unwrap();
        let injector = SnippetInjector::new(tmp.path(), &EngineConfig::default());
        injector
            .inject_rendered(&file, "<meta charset=\"utf-8\">\n", "head", &meta("charset"), true)
            .unwrap();
        let text = fs::read_to_string(&file).unwrap();
        assert!(text.contains(concat!(
            "  <!-- <<<inject:head:charset:start>>> -->\n",
            "  <meta charset=\"utf-8\">\n",
        )));
    }
}
