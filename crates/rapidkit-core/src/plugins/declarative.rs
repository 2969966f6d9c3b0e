//! Plugins described by a YAML file instead of code

use super::FrameworkPlugin;
use crate::error::{Error, Result};
use crate::manifest::{DependencySpec, FrameworkSpec};
use crate::render::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

/// `plugins/<name>.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub language: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    #[serde(default)]
    pub context: BTreeMap<String, Value>,

    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    #[serde(default)]
    pub dev_dependencies: Vec<DependencySpec>,

    /// Binaries that must be on PATH
    #[serde(default)]
    pub requires: Vec<String>,

    /// Integration test path; `{module}` is replaced with the snake name
    #[serde(default)]
    pub integration_test: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeclarativePlugin {
    descriptor: PluginDescriptor,
}

impl DeclarativePlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let descriptor: PluginDescriptor =
            serde_yaml::from_str(&text).map_err(|source| Error::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        if descriptor.name.trim().is_empty() {
            return Err(Error::Other(format!(
                "plugin descriptor {} has an empty name",
                path.display()
            )));
        }
        Ok(Self::new(descriptor))
    }
}

/// Descriptor table first, then the manifest's entries on top
fn layered<T: Clone>(base: &BTreeMap<String, T>, top: &BTreeMap<String, T>) -> BTreeMap<String, T> {
    let mut merged = base.clone();
    merged.extend(top.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

impl FrameworkPlugin for DeclarativePlugin {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn language(&self) -> &str {
        &self.descriptor.language
    }

    fn display_name(&self) -> &str {
        self.descriptor
            .display_name
            .as_deref()
            .unwrap_or(&self.descriptor.name)
    }

    fn get_template_mappings(&self, spec: &FrameworkSpec) -> BTreeMap<String, String> {
        layered(&self.descriptor.templates, &spec.templates)
    }

    fn get_output_paths(&self, spec: &FrameworkSpec) -> BTreeMap<String, String> {
        layered(&self.descriptor.outputs, &spec.outputs)
    }

    fn get_context_enrichments(&self, base: &Context, spec: &FrameworkSpec) -> Context {
        let module = base
            .get("module_snake")
            .and_then(Value::as_str)
            .unwrap_or("module");
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
        extra.insert(
            "integration_test_relative".into(),
            Value::from(self.integration_test_path(module)),
        );
        extra.extend(layered(&self.descriptor.context, &spec.context));
        extra
    }

    fn integration_test_path(&self, module_snake: &str) -> String {
        match &self.descriptor.integration_test {
            Some(pattern) => pattern.replace("{module}", module_snake),
            None => format!("tests/modules/{}/test_{}_integration", module_snake, module_snake),
        }
    }

    fn validate_requirements(&self) -> Vec<String> {
        self.descriptor
            .requires
            .iter()
            .filter(|bin| {
                !Command::new(bin.as_str())
                    .arg("--version")
                    .output()
                    .is_ok_and(|o| o.status.success())
            })
            .map(|bin| format!("{} not found on PATH", bin))
            .collect()
    }

    fn get_dependencies(&self, spec: &FrameworkSpec) -> Vec<DependencySpec> {
        let mut deps = self.descriptor.dependencies.clone();
        deps.extend(spec.dependencies.iter().cloned());
        deps
    }

    fn get_dev_dependencies(&self, spec: &FrameworkSpec) -> Vec<DependencySpec> {
        let mut deps = self.descriptor.dev_dependencies.clone();
        deps.extend(spec.dev_dependencies.iter().cloned());
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLASK: &str = r#"
name: flask
language: python
display_name: Flask
templates:
  app: templates/variants/flask/app.py.j2
outputs:
  app: src/app.py
context:
  wsgi: true
integration_test: "tests/{module}/test_flask.py"
dependencies:
  - name: flask
    version: ">=3.0"
"#;

    fn plugin() -> DeclarativePlugin {
        DeclarativePlugin::new(serde_yaml::from_str(FLASK).unwrap())
    }

    #[test]
    fn test_manifest_tables_override_descriptor() {
        let spec = FrameworkSpec {
            outputs: [("app".to_string(), "backend/app.py".to_string())].into(),
            ..FrameworkSpec::default()
        };
        let p = plugin();
        assert_eq!(p.get_output_paths(&spec)["app"], "backend/app.py");
        assert_eq!(
            p.get_template_mappings(&spec)["app"],
            "templates/variants/flask/app.py.j2"
        );
        assert_eq!(p.get_dependencies(&spec).len(), 1);
    }

    #[test]
    fn test_enrichments() {
        let mut base = Context::new();
        base.insert("module_snake".into(), Value::from("logging"));
        let extra = plugin().get_context_enrichments(&base, &FrameworkSpec::default());
        assert_eq!(extra["framework_display_name"], "Flask");
        assert_eq!(extra["wsgi"], true);
        assert_eq!(extra["integration_test_relative"], "tests/logging/test_flask.py");
    }
}
