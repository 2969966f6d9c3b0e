//! Override contracts
//!
//! Modules customize the generator through [`OverrideRecord`]s declared in
//! `module.yaml`. Each record targets one of:
//!
//! - `context.base`: the base render context
//! - `<Class>.<member>`: a method or setting of an [`OverridableClass`]
//! - `attr.<NAME>`: a setting on whichever class the records are applied to
//!
//! Method payloads name hooks from an [`OverrideRegistry`]. Applying an
//! override wraps the current method; the replaced one stays reachable as
//! `_original_<name>` and through [`MethodCall::call_original`].

use crate::error::OverrideError;
use crate::render::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix under which replaced members are preserved
pub const ORIGINAL_PREFIX: &str = "_original_";

/// Class name the generator exposes its overridable methods under
pub const GENERATOR_CLASS: &str = "ModuleGenerator";

pub const BASE_CONTEXT_TARGET: &str = "context.base";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    Method,
    Setting,
}

/// One declarative override from a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub target: String,
    pub kind: OverrideKind,

    /// Method overrides: a hook name or `{hook, args}`.
    /// Setting overrides: a value or `{provider, args}`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Parsed form of [`OverrideRecord::target`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideTarget {
    BaseContext,
    Member { class: String, member: String },
    Attr { name: String },
}

impl OverrideTarget {
    pub fn parse(target: &str) -> Result<Self, OverrideError> {
        let invalid = || OverrideError::InvalidTarget {
            target: target.to_string(),
        };
        if target == BASE_CONTEXT_TARGET {
            return Ok(Self::BaseContext);
        }
        let (head, tail) = target.rsplit_once('.').ok_or_else(invalid)?;
        if head.is_empty() || tail.is_empty() {
            return Err(invalid());
        }
        if head == "attr" {
            return Ok(Self::Attr {
                name: tail.to_string(),
            });
        }
        Ok(Self::Member {
            class: head.to_string(),
            member: tail.to_string(),
        })
    }
}

/// Per-invocation data handed to a method
pub struct MethodCall<'a> {
    pub class: &'a OverridableClass,
    pub method: &'a str,
    /// Project directory being generated into
    pub output_dir: &'a Path,
    /// Arguments from the override payload
    pub args: &'a Value,
    previous: Option<&'a Method>,
}

impl MethodCall<'_> {
    /// Run the implementation this override replaced
    pub fn call_original(&self, ctx: &mut Context) -> Result<(), OverrideError> {
        match self.previous {
            Some(previous) => {
                let call = MethodCall {
                    class: self.class,
                    method: self.method,
                    output_dir: self.output_dir,
                    args: &Value::Null,
                    previous: None,
                };
                previous.invoke(&call, ctx)
            }
            None => Ok(()),
        }
    }
}

pub type HookFn = dyn Fn(&MethodCall<'_>, &mut Context) -> Result<(), String> + Send + Sync;
pub type ProviderFn = dyn Fn(&Value, &Context) -> Result<Value, String> + Send + Sync;

/// A method body, possibly wrapping the one it replaced
#[derive(Clone)]
pub struct Method {
    name: String,
    body: Arc<HookFn>,
    args: Value,
    previous: Option<Box<Method>>,
}

impl Method {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&MethodCall<'_>, &mut Context) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Arc::new(body),
            args: Value::Null,
            previous: None,
        }
    }

    /// Method with no behaviour
    pub fn noop(name: impl Into<String>) -> Self {
        Self::new(name, |_, _| Ok(()))
    }

    fn invoke(&self, outer: &MethodCall<'_>, ctx: &mut Context) -> Result<(), OverrideError> {
        let call = MethodCall {
            class: outer.class,
            method: outer.method,
            output_dir: outer.output_dir,
            args: &self.args,
            previous: self.previous.as_deref(),
        };
        (self.body)(&call, ctx).map_err(|reason| OverrideError::Failed {
            name: self.name.clone(),
            reason,
        })
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("wraps", &self.previous.as_ref().map(|p| p.name.clone()))
            .finish()
    }
}

/// A setting value, either fixed or computed from the context when read
#[derive(Clone)]
pub enum Setting {
    Value(Value),
    Callable {
        provider: String,
        func: Arc<ProviderFn>,
        args: Value,
    },
}

impl std::fmt::Debug for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Callable { provider, args, .. } => f
                .debug_struct("Callable")
                .field("provider", provider)
                .field("args", args)
                .finish(),
        }
    }
}

/// Named table of methods and settings that overrides can replace
#[derive(Debug, Clone)]
pub struct OverridableClass {
    qualname: String,
    methods: BTreeMap<String, Method>,
    settings: BTreeMap<String, Setting>,
}

impl OverridableClass {
    pub fn new(qualname: impl Into<String>) -> Self {
        Self {
            qualname: qualname.into(),
            methods: BTreeMap::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn with_setting(mut self, name: impl Into<String>, value: Value) -> Self {
        self.settings.insert(name.into(), Setting::Value(value));
        self
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    /// Invoke a method; unknown methods do nothing
    pub fn call(
        &self,
        name: &str,
        output_dir: &Path,
        ctx: &mut Context,
    ) -> Result<(), OverrideError> {
        let Some(method) = self.methods.get(name) else {
            return Ok(());
        };
        let call = MethodCall {
            class: self,
            method: name,
            output_dir,
            args: &Value::Null,
            previous: None,
        };
        method.invoke(&call, ctx)
    }

    /// Read a setting, evaluating callable settings against `ctx`
    pub fn setting(&self, name: &str, ctx: &Context) -> Result<Option<Value>, OverrideError> {
        match self.settings.get(name) {
            None => Ok(None),
            Some(Setting::Value(v)) => Ok(Some(v.clone())),
            Some(Setting::Callable {
                provider,
                func,
                args,
            }) => func(args, ctx)
                .map(Some)
                .map_err(|reason| OverrideError::Failed {
                    name: provider.clone(),
                    reason,
                }),
        }
    }

    /// Replace `name` with `hook`, keeping the old body as `_original_<name>`
    fn wrap_method(&mut self, name: &str, mut hook: Method) -> Result<(), OverrideError> {
        let previous = self
            .methods
            .remove(name)
            .ok_or_else(|| OverrideError::MissingTarget {
                class: self.qualname.clone(),
                method: name.to_string(),
            })?;
        let original_key = format!("{}{}", ORIGINAL_PREFIX, name);
        self.methods
            .entry(original_key)
            .or_insert_with(|| previous.clone());
        hook.previous = Some(Box::new(previous));
        self.methods.insert(name.to_string(), hook);
        Ok(())
    }

    fn set(&mut self, name: &str, setting: Setting) {
        if let Some(previous) = self.settings.remove(name) {
            self.settings
                .entry(format!("{}{}", ORIGINAL_PREFIX, name))
                .or_insert(previous);
        }
        self.settings.insert(name.to_string(), setting);
    }
}

/// Hooks and setting providers that override payloads may name
#[derive(Clone)]
pub struct OverrideRegistry {
    hooks: BTreeMap<String, Arc<HookFn>>,
    providers: BTreeMap<String, Arc<ProviderFn>>,
}

impl Default for OverrideRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for OverrideRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideRegistry")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OverrideRegistry {
    pub fn empty() -> Self {
        Self {
            hooks: BTreeMap::new(),
            providers: BTreeMap::new(),
        }
    }

    /// Registry with `merge_context`, `extra_snippet` and the `env` provider
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_hook("merge_context", merge_context);
        registry.register_hook("extra_snippet", extra_snippet);
        registry.register_provider("env", env_provider);
        registry
    }

    pub fn register_hook(
        &mut self,
        name: impl Into<String>,
        hook: impl Fn(&MethodCall<'_>, &mut Context) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.hooks.insert(name.into(), Arc::new(hook));
    }

    pub fn register_provider(
        &mut self,
        name: impl Into<String>,
        provider: impl Fn(&Value, &Context) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.providers.insert(name.into(), Arc::new(provider));
    }

    fn hook(&self, payload: &Value) -> Result<Method, OverrideError> {
        let (name, args) = split_payload(payload, "hook");
        let body = self
            .hooks
            .get(&name)
            .cloned()
            .ok_or(OverrideError::UnknownHook { name: name.clone() })?;
        Ok(Method {
            name,
            body,
            args,
            previous: None,
        })
    }

    fn setting(&self, payload: &Value) -> Result<Setting, OverrideError> {
        let Some(provider) = payload.get("provider").and_then(Value::as_str) else {
            return Ok(Setting::Value(payload.clone()));
        };
        let func = self
            .providers
            .get(provider)
            .cloned()
            .ok_or_else(|| OverrideError::UnknownHook {
                name: provider.to_string(),
            })?;
        Ok(Setting::Callable {
            provider: provider.to_string(),
            func,
            args: payload.get("args").cloned().unwrap_or(Value::Null),
        })
    }

    /// Install every record that applies to `class`
    ///
    /// `context.base` records wrap the class's `apply_base_context` method;
    /// records naming another class are ignored.
    pub fn apply_overrides(
        &self,
        class: &mut OverridableClass,
        records: &[OverrideRecord],
    ) -> Result<usize, OverrideError> {
        let mut applied = 0;
        for record in records {
            let target = OverrideTarget::parse(&record.target)?;
            match (target, record.kind) {
                (OverrideTarget::BaseContext, OverrideKind::Method) => {
                    let hook = self.hook(&record.payload)?;
                    class.wrap_method("apply_base_context", hook)?;
                }
                (OverrideTarget::BaseContext, OverrideKind::Setting) => {
                    let hook = self.hook(&serde_json::json!({
                        "hook": "merge_context",
                        "args": record.payload,
                    }))?;
                    class.wrap_method("apply_base_context", hook)?;
                }
                (OverrideTarget::Member { class: qualname, member }, kind) => {
                    if qualname != class.qualname {
                        tracing::debug!(target = %record.target, "override targets another class");
                        continue;
                    }
                    match kind {
                        OverrideKind::Method => {
                            let hook = self.hook(&record.payload)?;
                            class.wrap_method(&member, hook)?;
                        }
                        OverrideKind::Setting => {
                            let setting = self.setting(&record.payload)?;
                            class.set(&member, setting);
                        }
                    }
                }
                (OverrideTarget::Attr { name }, OverrideKind::Setting) => {
                    let setting = self.setting(&record.payload)?;
                    class.set(&name, setting);
                }
                (OverrideTarget::Attr { .. }, OverrideKind::Method) => {
                    return Err(OverrideError::InvalidTarget {
                        target: record.target.clone(),
                    });
                }
            }
            tracing::debug!(target = %record.target, kind = ?record.kind, "applied override");
            applied += 1;
        }
        Ok(applied)
    }
}

/// `"name"` or `{<key>: name, args: ...}`
fn split_payload(payload: &Value, key: &str) -> (String, Value) {
    match payload {
        Value::String(name) => (name.clone(), Value::Null),
        Value::Object(map) => (
            map.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            map.get("args").cloned().unwrap_or(Value::Null),
        ),
        _ => (String::new(), Value::Null),
    }
}

/// Runs the original, then merges `args` (a mapping) into the context
fn merge_context(call: &MethodCall<'_>, ctx: &mut Context) -> Result<(), String> {
    call.call_original(ctx).map_err(|e| e.to_string())?;
    match call.args {
        Value::Object(map) => {
            ctx.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(())
        }
        Value::Null => Ok(()),
        other => Err(format!("merge_context expects a mapping, got {}", other)),
    }
}

/// Copies a user-supplied file, named by an environment variable, into the
/// project. Args: `{env, destination}`. Unset or empty variable is a no-op.
fn extra_snippet(call: &MethodCall<'_>, ctx: &mut Context) -> Result<(), String> {
    call.call_original(ctx).map_err(|e| e.to_string())?;
    let env = call
        .args
        .get("env")
        .and_then(Value::as_str)
        .ok_or("extra_snippet requires 'env'")?;
    let destination = call
        .args
        .get("destination")
        .and_then(Value::as_str)
        .ok_or("extra_snippet requires 'destination'")?;
    let source = match std::env::var(env) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => return Ok(()),
    };
    let bytes = std::fs::read(&source)
        .map_err(|e| format!("cannot read {}: {}", source.display(), e))?;
    let dest = crate::fsutil::join_rel(call.output_dir, destination);
    crate::fsutil::write_if_changed(&dest, &bytes).map_err(|e| e.to_string())?;
    tracing::info!(source = %source.display(), dest = %dest.display(), "copied extra snippet");
    Ok(())
}

/// `{name, default?}` -> value of the environment variable
fn env_provider(args: &Value, _ctx: &Context) -> Result<Value, String> {
    let name = args
        .get("name")
        .and_then(Value::as_str)
        .ok_or("env provider requires 'name'")?;
    match std::env::var(name) {
        Ok(value) => Ok(Value::String(value)),
        Err(_) => Ok(args.get("default").cloned().unwrap_or(Value::Null)),
    }
}
