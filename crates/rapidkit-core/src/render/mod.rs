//! Template rendering
//!
//! Two engines sit behind [`TemplateRenderer`]:
//! - the primary engine (minijinja, cargo feature `jinja`) with `if`/`for`
//!   control tags and the full filter set
//! - a fallback that only understands `{{ path | default(...) }}` interpolation
//!
//! Templates that need control tags fail loudly on the fallback instead of
//! rendering something subtly wrong.

pub mod case;
mod fallback;
#[cfg(feature = "jinja")]
mod jinja;

use crate::error::TemplateRenderError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Render context. Keys are kept sorted so output never depends on insertion order.
pub type Context = BTreeMap<String, Value>;

/// Which engine produced (or will produce) the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Jinja,
    Fallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Undefined variables are errors instead of empty strings
    pub strict: bool,

    /// Use the fallback engine even when the primary is compiled in
    pub force_fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    options: RenderOptions,
}

impl TemplateRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn strict() -> Self {
        Self::new(RenderOptions {
            strict: true,
            ..RenderOptions::default()
        })
    }

    pub fn engine(&self) -> EngineKind {
        if cfg!(feature = "jinja") && !self.options.force_fallback {
            EngineKind::Jinja
        } else {
            EngineKind::Fallback
        }
    }

    /// Render a template file
    pub fn render_file(
        &self,
        path: &Path,
        context: &Context,
    ) -> Result<String, TemplateRenderError> {
        if !path.is_file() {
            return Err(TemplateRenderError::Missing {
                path: path.to_path_buf(),
            });
        }
        let source = std::fs::read_to_string(path).map_err(|source| TemplateRenderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.render_str(&path.display().to_string(), &source, context)
    }

    /// Render template source under a display name used in errors
    pub fn render_str(
        &self,
        name: &str,
        source: &str,
        context: &Context,
    ) -> Result<String, TemplateRenderError> {
        match self.engine() {
            #[cfg(feature = "jinja")]
            EngineKind::Jinja => jinja::render(name, source, context, self.options.strict),
            _ => fallback::render(name, source, context, self.options.strict),
        }
    }
}

/// Jinja `default` semantics shared by both engines:
/// undefined, or falsy when `boolean` is set, yields the substitute.
pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_template_file() {
        let renderer = TemplateRenderer::default();
        let err = renderer
            .render_file(Path::new("/definitely/not/here.j2"), &Context::new())
            .unwrap_err();
        assert!(matches!(err, TemplateRenderError::Missing { .. }));
    }

    #[test]
    fn test_context_is_not_mutated() {
        let renderer = TemplateRenderer::default();
        let context = ctx(json!({"name": "logging"}));
        let before = context.clone();
        renderer
            .render_str("t", "{{ name }} {{ other | default('x') }}", &context)
            .unwrap();
        assert_eq!(context, before);
    }

    #[test]
    fn test_fallback_rejects_control_tags() {
        let renderer = TemplateRenderer::new(RenderOptions {
            force_fallback: true,
            ..RenderOptions::default()
        });
        let err = renderer
            .render_str("t", "{% if x %}y{% endif %}", &Context::new())
            .unwrap_err();
        assert!(matches!(err, TemplateRenderError::UnsupportedTag { .. }));
    }

    #[cfg(feature = "jinja")]
    #[test]
    fn test_primary_engine_control_flow_and_default() {
        let renderer = TemplateRenderer::default();
        let context = ctx(json!({
            "module_name": "logging",
            "handlers": ["console", "file"],
            "level": "",
            "json": true
        }));
        let out = renderer
            .render_str(
                "t",
                concat!(
                    "{% if json %}json{% endif %}|{% for h in handlers %}{{ h }},{% endfor %}|",
                    "{{ level | default('INFO', true) }}|{{ level | default('INFO') }}|",
                    "{{ missing | default('x') }}\n",
                ),
                &context,
            )
            .unwrap();
        assert_eq!(out, "json|console,file,|INFO||x\n");
    }

    #[cfg(feature = "jinja")]
    #[test]
    fn test_primary_case_filters() {
        let renderer = TemplateRenderer::default();
        let out = renderer
            .render_str(
                "t",
                "{{ n | pascal }} {{ n | kebab }} {{ 'AuthCore' | snake }}",
                &ctx(json!({"n": "auth_core"})),
            )
            .unwrap();
        assert_eq!(out, "AuthCore auth-core auth_core");
    }

    #[cfg(feature = "jinja")]
    #[test]
    fn test_strict_mode_rejects_undefined() {
        let renderer = TemplateRenderer::strict();
        assert!(renderer.render_str("t", "{{ nope }}", &Context::new()).is_err());
    }

    #[test]
    fn test_both_engines_agree_on_interpolation() {
        let context = ctx(json!({"module": {"name": "logging"}, "v": "1.0.0"}));
        let source = "name={{ module.name }} v={{ v }} d={{ absent | default('none') }}\n";
        let fallback = TemplateRenderer::new(RenderOptions {
            force_fallback: true,
            ..RenderOptions::default()
        })
        .render_str("t", source, &context)
        .unwrap();
        let primary = TemplateRenderer::default()
            .render_str("t", source, &context)
            .unwrap();
        assert_eq!(fallback, "name=logging v=1.0.0 d=none\n");
        assert_eq!(primary, fallback);
    }
}
