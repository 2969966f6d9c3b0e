//! Anchor and block-marker syntax

use std::path::Path;

const TOKEN_OPEN: &str = "<<<inject:";
const TOKEN_CLOSE: &str = ">>>";

/// Line-comment syntax of a file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentStyle {
    pub prefix: &'static str,
    /// Closing token for paired comments (`-->`), empty otherwise
    pub suffix: &'static str,
}

impl CommentStyle {
    pub const HASH: CommentStyle = CommentStyle { prefix: "#", suffix: "" };
    pub const SLASH: CommentStyle = CommentStyle { prefix: "//", suffix: "" };
    pub const DASH: CommentStyle = CommentStyle { prefix: "--", suffix: "" };
    pub const XML: CommentStyle = CommentStyle { prefix: "<!--", suffix: "-->" };

    /// Comment style by file name and extension; `#` when unknown
    pub fn for_path(path: &Path) -> Self {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name == "Dockerfile" || file_name.starts_with(".env") {
            return Self::HASH;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "java" | "go" | "rs" | "c" | "h"
            | "cpp" | "kt" | "swift" | "scss") => Self::SLASH,
            Some("sql") => Self::DASH,
            Some("xml" | "html" | "htm" | "md" | "vue" | "svg") => Self::XML,
            _ => Self::HASH,
        }
    }
}

/// An anchor line and the comment tokens around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub name: String,
    prefix: String,
    suffix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
}

/// A parsed `<<<inject:<anchor>:<id>:start|end>>>` marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub anchor: String,
    pub id: String,
    pub kind: MarkerKind,
}

impl Anchor {
    /// Parse a full anchor line (`# <<<inject:name>>>`) or expand a bare
    /// anchor name with the destination's comment style.
    pub fn parse(arg: &str, style: CommentStyle) -> Option<Self> {
        let arg = arg.trim();
        if let Some(open) = arg.find(TOKEN_OPEN) {
            let after = &arg[open + TOKEN_OPEN.len()..];
            let close = after.find(TOKEN_CLOSE)?;
            let name = &after[..close];
            if name.is_empty() || name.contains(':') {
                return None;
            }
            return Some(Self {
                name: name.to_string(),
                prefix: arg[..open].trim().to_string(),
                suffix: after[close + TOKEN_CLOSE.len()..].trim().to_string(),
            });
        }
        if arg.is_empty() || arg.contains(':') || arg.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            name: arg.to_string(),
            prefix: style.prefix.to_string(),
            suffix: style.suffix.to_string(),
        })
    }

    /// The anchor line without indentation
    pub fn line(&self) -> String {
        self.wrap(&self.name)
    }

    pub fn start_marker(&self, id: &str) -> String {
        self.wrap(&format!("{}:{}:start", self.name, id))
    }

    pub fn end_marker(&self, id: &str) -> String {
        self.wrap(&format!("{}:{}:end", self.name, id))
    }

    fn wrap(&self, inner: &str) -> String {
        let mut line = String::new();
        if !self.prefix.is_empty() {
            line.push_str(&self.prefix);
            line.push(' ');
        }
        line.push_str(TOKEN_OPEN);
        line.push_str(inner);
        line.push_str(TOKEN_CLOSE);
        if !self.suffix.is_empty() {
            line.push(' ');
            line.push_str(&self.suffix);
        }
        line
    }
}

/// Parse a block marker from a line, ignoring indentation and comment tokens
pub fn parse_marker(line: &str) -> Option<Marker> {
    let open = line.find(TOKEN_OPEN)?;
    let after = &line[open + TOKEN_OPEN.len()..];
    let inner = &after[..after.find(TOKEN_CLOSE)?];
    let mut parts = inner.splitn(3, ':');
    let anchor = parts.next()?;
    let id = parts.next()?;
    let kind = match parts.next()? {
        "start" => MarkerKind::Start,
        "end" => MarkerKind::End,
        _ => return None,
    };
    Some(Marker {
        anchor: anchor.to_string(),
        id: id.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_uses_file_style() {
        let style = CommentStyle::for_path(Path::new("main.ts"));
        let anchor = Anchor::parse("imports", style).unwrap();
        assert_eq!(anchor.line(), "// <<<inject:imports>>>");
        assert_eq!(anchor.start_marker("x"), "// <<<inject:imports:x:start>>>");

        let style = CommentStyle::for_path(Path::new("index.html"));
        let anchor = Anchor::parse("head", style).unwrap();
        assert_eq!(anchor.line(), "<!-- <<<inject:head>>> -->");
        assert_eq!(anchor.end_marker("x"), "<!-- <<<inject:head:x:end>>> -->");

        let anchor = Anchor::parse("seed", CommentStyle::for_path(Path::new("init.sql"))).unwrap();
        assert_eq!(anchor.line(), "-- <<<inject:seed>>>");
    }

    #[test]
    fn test_full_line_keeps_its_tokens() {
        let anchor = Anchor::parse(
            "# <<<inject:module-dependencies>>>",
            CommentStyle::SLASH,
        )
        .unwrap();
        assert_eq!(anchor.name, "module-dependencies");
        assert_eq!(anchor.line(), "# <<<inject:module-dependencies>>>");
    }

    #[test]
    fn test_invalid_anchors() {
        assert!(Anchor::parse("", CommentStyle::HASH).is_none());
        assert!(Anchor::parse("a:b", CommentStyle::HASH).is_none());
        assert!(Anchor::parse("# <<<inject:>>>", CommentStyle::HASH).is_none());
    }

    #[test]
    fn test_parse_marker() {
        let marker = parse_marker("    # <<<inject:deps:logging-req:start>>>").unwrap();
        assert_eq!(marker.anchor, "deps");
        assert_eq!(marker.id, "logging-req");
        assert_eq!(marker.kind, MarkerKind::Start);
        assert!(parse_marker("# <<<inject:deps>>>").is_none());
    }
}
