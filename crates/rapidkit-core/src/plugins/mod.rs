//! Framework plugins
//!
//! A plugin adapts a module to one framework variant: it contributes template
//! and output tables, context keys, lifecycle hooks, and package dependencies.
//!
//! Each module gets its own [`PluginRegistry`] holding the built-in plugins
//! (`fastapi`, `nestjs`) plus any declarative plugins found under the
//! module's `plugins/` directory.

mod declarative;
mod fastapi;
mod nestjs;

pub use declarative::{DeclarativePlugin, PluginDescriptor};
pub use fastapi::FastApiPlugin;
pub use nestjs::NestJsPlugin;

use crate::error::{PluginRegistryError, Result};
use crate::manifest::{DependencySpec, FrameworkSpec};
use crate::render::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory inside a module holding declarative plugin descriptors
pub const PLUGIN_DIR: &str = "plugins";

/// Interface each framework adapter implements
///
/// `spec` is the module's `frameworks.<name>` section (empty when absent).
pub trait FrameworkPlugin: Send + Sync {
    /// Variant name, e.g. `fastapi`
    fn name(&self) -> &str;

    /// Language of the emitted code
    fn language(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str;

    /// Role -> template path (relative to the module's template root)
    fn get_template_mappings(&self, spec: &FrameworkSpec) -> BTreeMap<String, String> {
        spec.templates.clone()
    }

    /// Role -> output path (relative to the project root)
    fn get_output_paths(&self, spec: &FrameworkSpec) -> BTreeMap<String, String> {
        spec.outputs.clone()
    }

    /// Keys added to the base context to form the variant context
    fn get_context_enrichments(&self, base: &Context, spec: &FrameworkSpec) -> Context {
        let mut extra = Context::new();
        extra.insert("framework".into(), Value::from(self.name()));
        extra.insert(
            "framework_display_name".into(),
            Value::from(spec.display_name.as_deref().unwrap_or(self.display_name())),
        );
        extra.insert(
            "language".into(),
            Value::from(spec.language.as_deref().unwrap_or(self.language())),
        );
        let module = base
            .get("module_snake")
            .and_then(Value::as_str)
            .unwrap_or("module");
        extra.insert(
            "integration_test_relative".into(),
            Value::from(self.integration_test_path(module)),
        );
        extra.extend(spec.context.clone());
        extra
    }

    /// Where the module's integration test lives in a generated project
    fn integration_test_path(&self, module_snake: &str) -> String {
        format!("tests/modules/{}/test_{}_integration", module_snake, module_snake)
    }

    /// Missing prerequisites, as human-readable warnings
    fn validate_requirements(&self) -> Vec<String> {
        Vec::new()
    }

    fn pre_generation_hook(&self, _target_dir: &Path) -> Result<()> {
        Ok(())
    }

    /// Called with the variant files written during this run
    fn post_generation_hook(&self, _target_dir: &Path, _written: &[PathBuf]) -> Result<()> {
        Ok(())
    }

    fn get_dependencies(&self, spec: &FrameworkSpec) -> Vec<DependencySpec> {
        spec.dependencies.clone()
    }

    fn get_dev_dependencies(&self, spec: &FrameworkSpec) -> Vec<DependencySpec> {
        spec.dev_dependencies.clone()
    }
}

/// Plugins available to one module, by name
#[derive(Clone)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn FrameworkPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PluginRegistry {
    /// Registry containing only the built-in plugins
    pub fn with_builtins() -> Self {
        let mut plugins: BTreeMap<String, Arc<dyn FrameworkPlugin>> = BTreeMap::new();
        plugins.insert("fastapi".into(), Arc::new(FastApiPlugin));
        plugins.insert("nestjs".into(), Arc::new(NestJsPlugin));
        Self { plugins }
    }

    /// Registry seeded with built-ins plus the module's declarative plugins
    pub fn for_module(module_dir: &Path) -> Self {
        let mut registry = Self::with_builtins();
        registry.discover(module_dir);
        registry
    }

    /// Restore the built-in set
    pub fn reset(&mut self) {
        *self = Self::with_builtins();
    }

    pub fn register(
        &mut self,
        plugin: Arc<dyn FrameworkPlugin>,
    ) -> std::result::Result<(), PluginRegistryError> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(PluginRegistryError::Duplicate { name });
        }
        tracing::debug!(plugin = %name, "registered framework plugin");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Register a plugin built by `factory`; a failing factory is an error
    pub fn register_with<F>(
        &mut self,
        name: &str,
        factory: F,
    ) -> std::result::Result<(), PluginRegistryError>
    where
        F: FnOnce() -> std::result::Result<Arc<dyn FrameworkPlugin>, String>,
    {
        if self.plugins.contains_key(name) {
            return Err(PluginRegistryError::Duplicate {
                name: name.to_string(),
            });
        }
        let plugin = factory().map_err(|reason| PluginRegistryError::Instantiation {
            name: name.to_string(),
            reason,
        })?;
        self.register(plugin)
    }

    /// Load `plugins/*.yaml` descriptors. Failures are logged and skipped.
    /// Returns the names that were registered.
    pub fn discover(&mut self, module_dir: &Path) -> Vec<String> {
        let dir = module_dir.join(PLUGIN_DIR);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")))
            .collect();
        paths.sort();

        let mut loaded = Vec::new();
        for path in paths {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let result = self.register_with(&name, || {
                DeclarativePlugin::load(&path)
                    .map(|p| Arc::new(p) as Arc<dyn FrameworkPlugin>)
                    .map_err(|e| e.to_string())
            });
            match result {
                Ok(()) => loaded.push(name),
                Err(err) => tracing::warn!(
                    plugin = %path.display(),
                    error = %err,
                    "skipping framework plugin"
                ),
            }
        }
        loaded
    }

    pub fn get(
        &self,
        name: &str,
    ) -> std::result::Result<Arc<dyn FrameworkPlugin>, PluginRegistryError> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| PluginRegistryError::Unknown {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Dummy;

    impl FrameworkPlugin for Dummy {
        fn name(&self) -> &str {
            "fastapi"
        }
        fn language(&self) -> &str {
            "python"
        }
        fn display_name(&self) -> &str {
            "Dummy"
        }
    }

    #[test]
    fn test_builtins_present_and_duplicates_rejected() {
        let mut registry = PluginRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["fastapi", "nestjs"]);
        let err = registry.register(Arc::new(Dummy)).unwrap_err();
        assert!(matches!(err, PluginRegistryError::Duplicate { .. }));
    }

    #[test]
    fn test_failing_factory_is_instantiation_error() {
        let mut registry = PluginRegistry::with_builtins();
        let err = registry
            .register_with("broken", || Err("boom".to_string()))
            .unwrap_err();
        assert!(matches!(err, PluginRegistryError::Instantiation { .. }));
    }

    #[test]
    fn test_discover_skips_broken_descriptors_and_reset_restores() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(PLUGIN_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("flask.yaml"),
            "name: flask\nlanguage: python\ndisplay_name: Flask\n",
        )
        .unwrap();
        fs::write(dir.join("broken.yaml"), ": not yaml: [").unwrap();

        let mut registry = PluginRegistry::with_builtins();
        let loaded = registry.discover(tmp.path());
        assert_eq!(loaded, vec!["flask"]);
        assert!(registry.get("flask").is_ok());

        registry.reset();
        assert!(matches!(
            registry.get("flask"),
            Err(PluginRegistryError::Unknown { .. })
        ));
    }

    #[test]
    fn test_default_enrichments() {
        let registry = PluginRegistry::with_builtins();
        let plugin = registry.get("fastapi").unwrap();
        let mut base = Context::new();
        base.insert("module_snake".into(), Value::from("logging"));
        let spec = FrameworkSpec {
            context: [("uses_json".to_string(), Value::from(true))].into(),
            ..FrameworkSpec::default()
        };
        let extra = plugin.get_context_enrichments(&base, &spec);
        assert_eq!(extra["framework"], "fastapi");
        assert_eq!(extra["language"], "python");
        assert_eq!(extra["uses_json"], true);
        assert!(extra["integration_test_relative"]
            .as_str()
            .unwrap()
            .contains("logging"));
    }
}
