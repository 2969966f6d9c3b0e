//! Engine configuration gathered from the environment

use std::path::{Path, PathBuf};

/// Overrides where vendor snapshots are written
pub const ENV_VENDOR_ROOT: &str = "RAPIDKIT_VENDOR_ROOT";
/// Skip persisting verification state (module hashes) - used in CI
pub const ENV_SKIP_VERIFICATION_WRITE: &str = "RAPIDKIT_SKIP_VERIFICATION_WRITE";
/// Overrides module discovery
pub const ENV_MODULES_ROOT: &str = "RAPIDKIT_MODULES_ROOT";
/// Comma-separated statuses admitted into the module test matrix
pub const ENV_TEST_ALLOWED_STATUSES: &str = "RAPIDKIT_TEST_ALLOWED_STATUSES";
/// Comma-separated module names excluded from the module test matrix
pub const ENV_TEST_EXCLUDED_MODULES: &str = "RAPIDKIT_TEST_EXCLUDED_MODULES";
/// Set to `0` to disable code formatters after snippet injection
pub const ENV_SNIPPET_FORMAT: &str = "RAPIDKIT_SNIPPET_FORMAT";

/// Default vendor destination relative to the project root
pub const DEFAULT_VENDOR_ROOT: &str = ".rapidkit/vendor";

/// Runtime switches for the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub vendor_root: Option<PathBuf>,
    pub modules_root: Option<PathBuf>,
    pub skip_verification_write: bool,
    pub run_formatters: bool,
    pub test_allowed_statuses: Vec<String>,
    pub test_excluded_modules: Vec<String>,
}

impl EngineConfig {
    /// Read every `RAPIDKIT_*` switch from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            vendor_root: non_empty(ENV_VENDOR_ROOT).map(PathBuf::from),
            modules_root: non_empty(ENV_MODULES_ROOT).map(PathBuf::from),
            skip_verification_write: non_empty(ENV_SKIP_VERIFICATION_WRITE)
                .is_some_and(|v| is_truthy(&v)),
            run_formatters: non_empty(ENV_SNIPPET_FORMAT).map_or(true, |v| is_truthy(&v)),
            test_allowed_statuses: non_empty(ENV_TEST_ALLOWED_STATUSES)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            test_excluded_modules: non_empty(ENV_TEST_EXCLUDED_MODULES)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        }
    }

    pub fn with_modules_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.modules_root = Some(root.into());
        self
    }

    pub fn with_vendor_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.vendor_root = Some(root.into());
        self
    }

    pub fn with_formatters(mut self, enabled: bool) -> Self {
        self.run_formatters = enabled;
        self
    }

    pub fn with_skip_verification_write(mut self, skip: bool) -> Self {
        self.skip_verification_write = skip;
        self
    }

    /// Vendor root for a project: env override, then manifest value, then default.
    /// Relative values are resolved against the project root.
    pub fn vendor_root_for(&self, project_root: &Path, manifest_root: Option<&str>) -> PathBuf {
        let chosen = self
            .vendor_root
            .clone()
            .or_else(|| manifest_root.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VENDOR_ROOT));
        if chosen.is_absolute() {
            chosen
        } else {
            project_root.join(chosen)
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> EngineConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        let config = config_from(&[]);
        assert!(config.vendor_root.is_none());
        assert!(!config.skip_verification_write);
        assert!(config.run_formatters);
        assert!(config.test_allowed_statuses.is_empty());
    }

    #[test]
    fn test_lists_and_flags_parsed() {
        let config = config_from(&[
            (ENV_SKIP_VERIFICATION_WRITE, "1"),
            (ENV_TEST_ALLOWED_STATUSES, "stable, beta"),
            (ENV_TEST_EXCLUDED_MODULES, "auth,,db"),
            (ENV_SNIPPET_FORMAT, "0"),
        ]);
        assert!(config.skip_verification_write);
        assert!(!config.run_formatters);
        assert_eq!(config.test_allowed_statuses, vec!["stable", "beta"]);
        assert_eq!(config.test_excluded_modules, vec!["auth", "db"]);
    }

    #[test]
    fn test_vendor_root_precedence() {
        let project = Path::new("/proj");
        let config = EngineConfig::default();
        assert_eq!(
            config.vendor_root_for(project, None),
            PathBuf::from("/proj/.rapidkit/vendor")
        );
        assert_eq!(
            config.vendor_root_for(project, Some("vendor")),
            PathBuf::from("/proj/vendor")
        );
        let config = config.with_vendor_root("/elsewhere");
        assert_eq!(
            config.vendor_root_for(project, Some("vendor")),
            PathBuf::from("/elsewhere")
        );
    }
}
