//! Optional code formatters run after a `default`-mode injection

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Languages with a known formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
}

impl Language {
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::TypeScript => "TypeScript",
            Language::JavaScript => "JavaScript",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())? {
            "py" => Some(Language::Python),
            "ts" | "tsx" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A formatter binary that reads source on stdin and writes it to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatter {
    pub name: &'static str,
    args: &'static [&'static str],
}

const RUFF: Formatter = Formatter {
    name: "ruff",
    args: &["format", "--quiet", "--stdin-filename"],
};

const PRETTIER: Formatter = Formatter {
    name: "prettier",
    args: &["--stdin-filepath"],
};

impl Formatter {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Python => RUFF,
            Language::TypeScript | Language::JavaScript => PRETTIER,
        }
    }

    /// Check if the formatter is on PATH
    pub fn is_available(&self) -> bool {
        matches!(
            Command::new(self.name).arg("--version").output(),
            Ok(out) if out.status.success()
        )
    }

    /// Format `source` as if it were `path`. Returns `None` when the tool fails.
    pub fn format(&self, path: &Path, source: &str) -> Option<String> {
        let mut child = Command::new(self.name)
            .args(self.args)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .ok()?;

        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(source.as_bytes()).is_err() {
                let _ = child.kill();
                return None;
            }
        }

        let output = child.wait_with_output().ok()?;
        if !output.status.success() {
            tracing::debug!(
                formatter = self.name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "formatter failed"
            );
            return None;
        }
        String::from_utf8(output.stdout).ok()
    }
}

/// Run the formatter for `path` over `source` if one is installed.
/// Falls back to the input when no formatter applies or it fails.
pub fn format_source(path: &Path, source: String) -> String {
    let Some(language) = Language::from_path(path) else {
        return source;
    };
    let formatter = Formatter::for_language(language);
    if !formatter.is_available() {
        tracing::debug!(formatter = formatter.name, "formatter not found, skipping");
        return source;
    }
    match formatter.format(path, &source) {
        Some(formatted) if !formatted.trim().is_empty() => formatted,
        _ => {
            tracing::warn!(
                file = %path.display(),
                formatter = formatter.name,
                "formatter failed; keeping unformatted output"
            );
            source
        }
    }
}
