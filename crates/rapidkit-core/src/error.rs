//! Error types for the composition engine
//!
//! Each concern has its own enum so callers can match on behaviour; [`Error`]
//! wraps them for the public API.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Malformed or unresolvable module manifests
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("manifest {path} is missing required field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("module '{module}' has invalid status '{status}' (allowed: {allowed})")]
    InvalidStatus {
        module: String,
        status: String,
        allowed: String,
    },

    #[error("module '{module}' has invalid version '{version}': {reason}")]
    InvalidVersion {
        module: String,
        version: String,
        reason: String,
    },

    #[error("module '{module}' references missing template '{template}'")]
    MissingTemplate { module: String, template: String },

    #[error("module '{module}' does not support profile '{profile}' (supported: {supported})")]
    UnsupportedProfile {
        module: String,
        profile: String,
        supported: String,
    },

    #[error("module '{slug}' not found under {root}")]
    ModuleNotFound { slug: String, root: PathBuf },

    #[error("could not locate a modules root (set RAPIDKIT_MODULES_ROOT)")]
    ModulesRootNotFound,

    #[error("module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },
}

/// Raised by topological sorting when `depends_on` forms a cycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency cycle detected between modules: {}", modules.join(", "))]
pub struct DependencyCycleError {
    /// Modules that could not be ordered
    pub modules: Vec<String>,
}

/// Failures while rendering a template
#[derive(Debug, thiserror::Error)]
pub enum TemplateRenderError {
    #[error("template not found: {path}")]
    Missing { path: PathBuf },

    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("template '{template}' uses control tag '{tag}' but the primary engine is unavailable")]
    UnsupportedTag { template: String, tag: String },

    #[error("template '{template}' uses filter '{filter}', unsupported by the fallback engine")]
    UnsupportedFilter { template: String, filter: String },

    #[error("template '{template}' references undefined variable '{name}'")]
    Undefined { template: String, name: String },

    #[error("template '{template}' has a syntax error: {detail}")]
    Syntax { template: String, detail: String },

    #[error("failed to render template '{template}': {detail}")]
    Render { template: String, detail: String },
}

/// Aggregated generation failure with a free-form detail map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorError {
    pub context: String,
    pub detail: BTreeMap<String, String>,
}

impl GeneratorError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            detail: BTreeMap::new(),
        }
    }

    /// Add a detail entry
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.detail.insert(key.into(), value.to_string());
        self
    }

    /// Wrap a lower-level error under the given context
    pub fn wrap(context: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::new(context).with("error", error)
    }
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation failed ({})", self.context)?;
        for (key, value) in &self.detail {
            write!(f, "\n  {}: {}", key, value)?;
        }
        Ok(())
    }
}

impl std::error::Error for GeneratorError {}

/// Framework plugin registration failures
#[derive(Debug, thiserror::Error)]
pub enum PluginRegistryError {
    #[error("framework plugin '{name}' is already registered")]
    Duplicate { name: String },

    #[error("framework plugin '{name}' failed to load: {reason}")]
    Instantiation { name: String, reason: String },

    #[error("unknown framework variant '{name}' (available: {available})")]
    Unknown { name: String, available: String },
}

/// Override registration and application failures
#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("safe override target {class}.{method} does not exist")]
    MissingTarget { class: String, method: String },

    #[error("override hook '{name}' is not registered")]
    UnknownHook { name: String },

    #[error("invalid override target '{target}'")]
    InvalidTarget { target: String },

    #[error("override '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Project lock acquisition failures
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("project is locked by another rapidkit process (pid {pid}); remove {path} if stale")]
    Held { path: PathBuf, pid: String },

    #[error("failed to acquire project lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors that can occur during engine operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Cycle(#[from] DependencyCycleError),

    #[error(transparent)]
    Render(#[from] TemplateRenderError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Plugin(#[from] PluginRegistryError),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid version '{version}': {source}")]
    Version {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_error_lists_details() {
        let err = GeneratorError::new("template")
            .with("template", "templates/a.j2")
            .with("module", "logging");
        let text = err.to_string();
        assert!(text.contains("generation failed (template)"));
        assert!(text.contains("module: logging"));
        assert!(text.contains("template: templates/a.j2"));
    }

    #[test]
    fn test_cycle_error_names_modules() {
        let err = DependencyCycleError {
            modules: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected between modules: a, b"
        );
    }
}
