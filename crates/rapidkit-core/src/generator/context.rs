//! Render contexts handed to module templates

use crate::manifest::ModuleManifest;
use crate::plugins::FrameworkPlugin;
use crate::render::{case, Context};
use serde_json::{json, Map, Value};

/// Context shared by every template of a module
pub fn base_context(
    manifest: &ModuleManifest,
    profile: Option<&str>,
    vendor_root: &str,
) -> Context {
    let snake = manifest.snake_name();
    let features: Map<String, Value> = manifest
        .features_for(profile)
        .into_iter()
        .map(|(name, enabled)| (name, Value::Bool(enabled)))
        .collect();
    let defaults = match &manifest.defaults {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };

    let mut ctx = Context::new();
    ctx.insert("module_name".into(), json!(manifest.name));
    ctx.insert("module_class_name".into(), json!(case::pascal(&manifest.name)));
    ctx.insert("module_kebab".into(), json!(case::kebab(&manifest.name)));
    ctx.insert("module_snake".into(), json!(snake));
    ctx.insert("module_version".into(), json!(manifest.version));
    ctx.insert("module_description".into(), json!(manifest.description));
    ctx.insert("module_status".into(), json!(manifest.status));
    ctx.insert("profile".into(), profile.map_or(Value::Null, Value::from));
    ctx.insert("features".into(), Value::Object(features));
    ctx.insert("rapidkit_vendor_module".into(), json!(manifest.name));
    ctx.insert("rapidkit_vendor_version".into(), json!(manifest.version));
    ctx.insert("rapidkit_vendor_root".into(), json!(vendor_root));
    ctx.insert(format!("{}_defaults", snake), defaults);
    ctx
}

/// Base context enriched by the framework plugin
pub fn variant_context(
    base: &Context,
    manifest: &ModuleManifest,
    plugin: &dyn FrameworkPlugin,
) -> Context {
    let spec = manifest
        .frameworks
        .get(plugin.name())
        .cloned()
        .unwrap_or_default();
    let mut ctx = base.clone();
    ctx.extend(plugin.get_context_enrichments(base, &spec));
    ctx
}
