//! Interpolation-only engine used when the primary engine is not compiled in
//!
//! Understands `{{ path }}`, `{{ path | default(value, true) }}` (alias `d`),
//! `{# comments #}` and `-` whitespace control. Any `{% %}` tag is an error.

use super::{is_falsy, Context};
use crate::error::TemplateRenderError;
use serde_json::Value;

pub(super) fn render(
    name: &str,
    source: &str,
    context: &Context,
    strict: bool,
) -> Result<String, TemplateRenderError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find('{') {
        let (before, tail) = rest.split_at(start);
        out.push_str(before);

        if let Some(body) = tail.strip_prefix("{{") {
            let end = body
                .find("}}")
                .ok_or_else(|| syntax(name, "unclosed '{{'"))?;
            let (expr, trim_before, trim_after) = whitespace_control(&body[..end]);
            if trim_before {
                trim_end_in_place(&mut out);
            }
            out.push_str(&evaluate(name, expr, context, strict)?);
            rest = &body[end + 2..];
            if trim_after {
                rest = rest.trim_start();
            }
        } else if let Some(body) = tail.strip_prefix("{#") {
            let end = body.find("#}").ok_or_else(|| syntax(name, "unclosed '{#'"))?;
            rest = &body[end + 2..];
        } else if let Some(body) = tail.strip_prefix("{%") {
            let tag = body
                .trim_start_matches('-')
                .split_whitespace()
                .next()
                .unwrap_or("")
                .trim_end_matches(['-', '%'])
                .to_string();
            return Err(TemplateRenderError::UnsupportedTag {
                template: name.to_string(),
                tag,
            });
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn syntax(name: &str, detail: &str) -> TemplateRenderError {
    TemplateRenderError::Syntax {
        template: name.to_string(),
        detail: detail.to_string(),
    }
}

fn whitespace_control(raw: &str) -> (&str, bool, bool) {
    let trim_before = raw.starts_with('-');
    let trim_after = raw.ends_with('-');
    let mut expr = raw;
    if trim_before {
        expr = &expr[1..];
    }
    if trim_after && !expr.is_empty() {
        expr = &expr[..expr.len() - 1];
    }
    (expr.trim(), trim_before, trim_after)
}

fn trim_end_in_place(out: &mut String) {
    let len = out.trim_end().len();
    out.truncate(len);
}

fn evaluate(
    name: &str,
    expr: &str,
    context: &Context,
    strict: bool,
) -> Result<String, TemplateRenderError> {
    let mut segments = split_outside_quotes(expr, '|').into_iter();
    let head = segments.next().unwrap_or_default();
    let mut value = operand(head.trim(), context);

    for filter in segments {
        let filter = filter.trim();
        let (filter_name, args) = match filter.find('(') {
            Some(open) if filter.ends_with(')') => {
                (filter[..open].trim(), &filter[open + 1..filter.len() - 1])
            }
            _ => (filter, ""),
        };
        match filter_name {
            "default" | "d" => {
                let args = split_outside_quotes(args, ',');
                let substitute = args
                    .first()
                    .and_then(|a| operand(a.trim(), context))
                    .unwrap_or_else(|| Value::String(String::new()));
                let boolean = args.get(1).is_some_and(|a| {
                    let a = a.trim();
                    let a = a
                        .strip_prefix("boolean")
                        .map_or(a, |r| r.trim_start_matches([' ', '=']));
                    a.eq_ignore_ascii_case("true")
                });
                let replace = match &value {
                    None => true,
                    Some(v) => boolean && is_falsy(v),
                };
                if replace {
                    value = Some(substitute);
                }
            }
            other => {
                return Err(TemplateRenderError::UnsupportedFilter {
                    template: name.to_string(),
                    filter: other.to_string(),
                })
            }
        }
    }

    match value {
        Some(value) => Ok(display(&value)),
        None if strict => Err(TemplateRenderError::Undefined {
            template: name.to_string(),
            name: head.trim().to_string(),
        }),
        None => Ok(String::new()),
    }
}

/// A literal or a dotted context path; `None` means undefined
fn operand(token: &str, context: &Context) -> Option<Value> {
    if token.is_empty() {
        return None;
    }
    for quote in ['\'', '"'] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return Some(Value::String(token[1..token.len() - 1].to_string()));
        }
    }
    match token {
        "true" | "True" => return Some(Value::Bool(true)),
        "false" | "False" => return Some(Value::Bool(false)),
        "none" | "None" => return Some(Value::Null),
        _ => {}
    }
    if let Ok(number) = token.parse::<i64>() {
        return Some(Value::from(number));
    }
    if let Ok(number) = token.parse::<f64>() {
        return Some(Value::from(number));
    }

    let mut parts = token.split('.');
    let mut current = context.get(parts.next()?.trim())?;
    for part in parts {
        let part = part.trim();
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Split on `sep` while ignoring separators inside quotes or parentheses
fn split_outside_quotes(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in input.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                c if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
                c => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    parts
}
