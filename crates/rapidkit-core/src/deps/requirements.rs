//! pip `requirements.txt` adapter

use super::DependencyAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Comments, blank lines, options (`-r`, `--index-url`) kept verbatim
    Raw(String),
    Requirement { name: String, spec: String },
}

#[derive(Debug, Clone)]
pub struct RequirementsTxt {
    file_name: &'static str,
    lines: Vec<Line>,
}

impl RequirementsTxt {
    pub fn main() -> Self {
        Self {
            file_name: "requirements.txt",
            lines: Vec::new(),
        }
    }

    pub fn dev() -> Self {
        Self {
            file_name: "requirements-dev.txt",
            lines: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.lines.iter().position(|line| match line {
            Line::Requirement { name: n, .. } => canonical(n) == canonical(name),
            Line::Raw(_) => false,
        })
    }
}

/// PEP 503 style comparison key
fn canonical(name: &str) -> String {
    name.to_ascii_lowercase().replace(['_', '.'], "-")
}

fn parse_line(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
        return Line::Raw(line.to_string());
    }
    let split = trimmed
        .find(|c: char| matches!(c, '<' | '>' | '=' | '!' | '~' | ';' | '@' | ' '))
        .unwrap_or(trimmed.len());
    Line::Requirement {
        name: trimmed[..split].to_string(),
        spec: trimmed[split..].trim().to_string(),
    }
}

/// `1.2.3` becomes `==1.2.3`; `*` becomes no specifier
fn normalize_spec(version: &str) -> String {
    let version = version.trim();
    if version.is_empty() || version == "*" {
        String::new()
    } else if version.starts_with(|c: char| c.is_ascii_digit()) {
        format!("=={}", version)
    } else {
        version.to_string()
    }
}

impl DependencyAdapter for RequirementsTxt {
    fn file_name(&self) -> &str {
        self.file_name
    }

    fn parse(&mut self, text: &str) -> Result<(), String> {
        self.lines = text.lines().map(parse_line).collect();
        Ok(())
    }

    fn pinned(&self, name: &str, _group: Option<&str>) -> Option<String> {
        self.position(name).and_then(|i| match &self.lines[i] {
            Line::Requirement { spec, .. } => Some(if spec.is_empty() {
                "*".to_string()
            } else {
                spec.clone()
            }),
            Line::Raw(_) => None,
        })
    }

    fn upsert(&mut self, name: &str, version: &str, _group: Option<&str>) {
        let line = Line::Requirement {
            name: name.to_string(),
            spec: normalize_spec(version),
        };
        match self.position(name) {
            Some(i) => self.lines[i] = line,
            None => self.lines.push(line),
        }
    }

    fn write(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Raw(text) => out.push_str(text),
                Line::Requirement { name, spec } => {
                    out.push_str(name);
                    out.push_str(spec);
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_comments_and_normalizes_names() {
        let mut reqs = RequirementsTxt::main();
        reqs.parse("# core\n--index-url https://pypi.org/simple\nPyYAML==6.0\n").unwrap();
        assert_eq!(reqs.pinned("pyyaml", None).as_deref(), Some("==6.0"));
        reqs.upsert("pyyaml", "6.0.2", None);
        reqs.upsert("structlog", "*", None);
        assert_eq!(
            reqs.write(),
            "# core\n--index-url https://pypi.org/simple\npyyaml==6.0.2\nstructlog\n"
        );
    }

    #[test]
    fn test_markers_are_not_part_of_name() {
        let mut reqs = RequirementsTxt::main();
        reqs.parse("uvloop>=0.19; sys_platform != 'win32'\n").unwrap();
        assert_eq!(
            reqs.pinned("uvloop", None).as_deref(),
            Some(">=0.19; sys_platform != 'win32'")
        );
    }
}
