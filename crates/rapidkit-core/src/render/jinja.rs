//! Primary engine backed by minijinja

use super::{case, Context};
use crate::error::TemplateRenderError;
use minijinja::{Environment, ErrorKind, UndefinedBehavior, Value};

pub(super) fn render(
    name: &str,
    source: &str,
    context: &Context,
    strict: bool,
) -> Result<String, TemplateRenderError> {
    let env = environment(strict);
    env.render_named_str(name, source, context)
        .map_err(|err| map_error(name, err))
}

fn environment(strict: bool) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(if strict {
        UndefinedBehavior::Strict
    } else {
        UndefinedBehavior::Lenient
    });
    env.add_filter("default", default_filter);
    env.add_filter("d", default_filter);
    env.add_filter("snake", |value: String| case::snake(&value));
    env.add_filter("kebab", |value: String| case::kebab(&value));
    env.add_filter("pascal", |value: String| case::pascal(&value));
    env
}

/// `default(other, boolean=false)`: undefined, or falsy when `boolean` is set, yields `other`
fn default_filter(value: Value, other: Option<Value>, boolean: Option<bool>) -> Value {
    let substitute = value.is_undefined() || (boolean.unwrap_or(false) && !value.is_true());
    if substitute {
        other.unwrap_or_else(|| Value::from(""))
    } else {
        value
    }
}

fn map_error(name: &str, err: minijinja::Error) -> TemplateRenderError {
    let template = name.to_string();
    let detail = match err.detail() {
        Some(detail) => detail.to_string(),
        None => err.to_string(),
    };
    match err.kind() {
        ErrorKind::SyntaxError => TemplateRenderError::Syntax { template, detail },
        ErrorKind::UndefinedError => TemplateRenderError::Undefined {
            template,
            name: detail,
        },
        ErrorKind::UnknownFilter => TemplateRenderError::UnsupportedFilter {
            template,
            filter: detail,
        },
        _ => TemplateRenderError::Render { template, detail },
    }
}
