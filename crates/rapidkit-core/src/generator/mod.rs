//! Module generator pipeline
//!
//! `generate` installs a module (and the modules it depends on) into a
//! project:
//!
//! 1. load the manifest and apply its overrides to the base context
//! 2. render vendor files under `.rapidkit/vendor/<module>/<version>/`
//! 3. resolve the framework plugin and build the variant context
//! 4. render the variant files at their declared outputs
//! 5. record every file in the file-state registry, then inject snippets
//! 6. run the plugin's post-generation hook and compose dependencies
//! 7. let the auto-versioner check the module sources
//!
//! [`ModuleGenerator::plan`] performs the rendering half without writing
//! anything; diff and merge compare against it.

pub mod context;
pub mod emit;

pub use emit::{EmitAction, EmitOutcome};

use crate::config::EngineConfig;
use crate::deps::{self, ComposeReport};
use crate::error::{GeneratorError, ManifestError, Result};
use crate::fsutil;
use crate::lock::ProjectLock;
use crate::manifest::{
    compute_install_order, find_manifest, load_all_manifests, DependencySpec, LoadedModule,
    SnippetDecl,
};
use crate::overrides::{Method, OverridableClass, OverrideRegistry, GENERATOR_CLASS};
use crate::plugins::{FrameworkPlugin, PluginRegistry};
use crate::render::{Context, RenderOptions, TemplateRenderer};
use crate::snippets::{InjectionResult, SnippetInjector, SnippetMetadata};
use crate::state::{FileStateStore, InstallRegistry, ModulesLock};
use crate::versioning::{AutoVersioner, VersionOptions, VersionOutcome};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Vendor,
    Variant,
}

/// A rendered file waiting to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    /// Project-relative output path
    pub rel: String,
    pub kind: FileKind,
    /// Manifest-relative template path
    pub template: String,
    pub hash: String,
    #[serde(skip)]
    pub content: String,
}

/// A rendered snippet waiting to be injected
#[derive(Debug, Clone, Serialize)]
pub struct PlannedSnippet {
    pub id: String,
    pub target: String,
    pub anchor: String,
    pub priority: i32,
    pub lenient: bool,
    #[serde(skip)]
    pub rendered: String,
    #[serde(skip)]
    pub metadata: SnippetMetadata,
}

/// Everything `generate` would do for one module
#[derive(Clone, Serialize)]
pub struct GenerationPlan {
    pub module: String,
    pub slug: String,
    pub version: String,
    pub profile: Option<String>,
    pub variant: Option<String>,
    pub language: Option<String>,
    /// Project-relative vendor root
    pub vendor_root: String,
    pub files: Vec<PlannedFile>,
    pub snippets: Vec<PlannedSnippet>,
    pub dependencies: Vec<DependencySpec>,
    pub warnings: Vec<String>,

    #[serde(skip)]
    pub module_dir: PathBuf,
    #[serde(skip)]
    context: Context,
    #[serde(skip)]
    class: OverridableClass,
    #[serde(skip)]
    plugin: Option<Arc<dyn FrameworkPlugin>>,
}

impl std::fmt::Debug for GenerationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPlan")
            .field("module", &self.module)
            .field("version", &self.version)
            .field("profile", &self.profile)
            .field("variant", &self.variant)
            .field("files", &self.files.len())
            .field("snippets", &self.snippets.len())
            .finish()
    }
}

impl GenerationPlan {
    /// Planned file for a project-relative path
    pub fn file(&self, rel: &str) -> Option<&PlannedFile> {
        self.files.iter().find(|f| f.rel == rel)
    }

    /// Render context of the variant files (base context when no variant)
    pub fn context(&self) -> &Context {
        &self.context
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub profile: Option<String>,
    /// Framework variant; defaults to the profile's first segment
    pub variant: Option<String>,
    /// Overwrite locally modified files (after snapshotting them)
    pub force: bool,
    /// Allow replacing an installed version with a different one
    pub update: bool,
    /// Do not install `depends_on` modules first
    pub skip_dependencies: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub module: String,
    pub slug: String,
    pub version: String,
    pub profile: Option<String>,
    pub variant: Option<String>,
    pub files: Vec<EmitOutcome>,
    pub snippets: Vec<InjectionResult>,
    pub dependencies: Vec<ComposeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<VersionOutcome>,
    pub warnings: Vec<String>,
}

impl ModuleReport {
    pub fn count(&self, action: EmitAction) -> usize {
        self.files.iter().filter(|f| f.action == action).count()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateReport {
    pub modules: Vec<ModuleReport>,
}

/// Generates modules into projects
#[derive(Debug, Clone)]
pub struct ModuleGenerator {
    modules_root: PathBuf,
    config: EngineConfig,
    overrides: OverrideRegistry,
}

impl ModuleGenerator {
    pub fn new(modules_root: impl Into<PathBuf>, config: EngineConfig) -> Self {
        Self {
            modules_root: modules_root.into(),
            config,
            overrides: OverrideRegistry::with_builtins(),
        }
    }

    /// Use a custom hook table for manifest overrides
    pub fn with_override_registry(mut self, overrides: OverrideRegistry) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn modules_root(&self) -> &Path {
        &self.modules_root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn load(&self, slug: &str) -> Result<LoadedModule> {
        find_manifest(&self.modules_root, slug)
    }

    /// The overridable surface of the generator with a module's overrides applied
    fn class_for(&self, module: &LoadedModule) -> Result<OverridableClass> {
        let mut class = OverridableClass::new(GENERATOR_CLASS)
            .with_method(Method::noop("apply_base_context"))
            .with_method(Method::noop("apply_variant_context"))
            .with_method(Method::noop("post_variant_generation"));
        self.overrides
            .apply_overrides(&mut class, &module.manifest.overrides)
            .map_err(|e| GeneratorError::wrap("overrides", e).with("module", module.name()))?;
        Ok(class)
    }

    /// Render every file and snippet of a module without touching the project
    pub fn plan(
        &self,
        slug: &str,
        project_root: &Path,
        options: &GenerateOptions,
    ) -> Result<GenerationPlan> {
        let module = self.load(slug)?;
        let manifest = &module.manifest;
        let name = manifest.name.clone();
        let profile = options.profile.as_deref();

        if let Some(profile) = profile {
            if !manifest.supports_profile(profile) {
                return Err(ManifestError::UnsupportedProfile {
                    module: name,
                    profile: profile.to_string(),
                    supported: manifest.profiles.join(", "),
                }
                .into());
            }
        }

        let class = self.class_for(&module)?;
        let mut base = context::base_context(manifest, profile, "");

        let setting_root = class
            .setting("vendor_root", &base)
            .map_err(|e| GeneratorError::wrap("overrides", e).with("module", &name))?
            .and_then(|v| v.as_str().map(str::to_string));
        let vendor_abs = self.config.vendor_root_for(
            project_root,
            setting_root
                .as_deref()
                .or(manifest.generation.vendor.root.as_deref()),
        );
        let vendor_root = fsutil::relative_to(project_root, &vendor_abs);
        base.insert("rapidkit_vendor_root".into(), Value::from(vendor_root.clone()));

        let strict = class
            .setting("strict_templates", &base)
            .map_err(|e| GeneratorError::wrap("overrides", e).with("module", &name))?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let renderer = TemplateRenderer::new(RenderOptions {
            strict,
            ..RenderOptions::default()
        });

        class
            .call("apply_base_context", project_root, &mut base)
            .map_err(|e| GeneratorError::wrap("apply_base_context", e).with("module", &name))?;

        let mut files = Vec::new();
        let mut seen = BTreeSet::new();
        for vendor in &manifest.generation.vendor.files {
            let rel = format!(
                "{}/{}/{}/{}",
                vendor_root,
                name,
                manifest.version,
                fsutil::normalize_rel(Path::new(&vendor.relative))
            );
            let content = render_template(&renderer, &module, &vendor.template, &base)?;
            push_file(
                &mut files,
                &mut seen,
                &name,
                rel,
                FileKind::Vendor,
                &vendor.template,
                content,
            )?;
        }

        let mut warnings = Vec::new();
        let variant = resolve_variant(&module, profile, options.variant.as_deref());
        let mut plugin = None;
        let mut ctx = base.clone();
        let mut dependencies = deps::collect(manifest, profile, &[]);
        let mut language = None;

        if let Some(variant) = &variant {
            let registry = PluginRegistry::for_module(&module.dir);
            let found = registry
                .get(variant)
                .map_err(|e| GeneratorError::wrap("variant", e).with("module", &name))?;
            let spec = manifest.frameworks.get(variant).cloned().unwrap_or_default();

            for warning in found.validate_requirements() {
                tracing::warn!(module = %name, variant = %variant, "{}", warning);
                warnings.push(warning);
            }

            ctx = context::variant_context(&base, manifest, found.as_ref());
            class
                .call("apply_variant_context", project_root, &mut ctx)
                .map_err(|e| {
                    GeneratorError::wrap("apply_variant_context", e).with("module", &name)
                })?;

            let mut pairs: Vec<(String, String)> = manifest
                .generation
                .variants
                .get(variant)
                .map(|v| {
                    v.files
                        .iter()
                        .map(|f| (f.template.clone(), f.output.clone()))
                        .collect()
                })
                .unwrap_or_default();
            let outputs = found.get_output_paths(&spec);
            for (role, template) in found.get_template_mappings(&spec) {
                match outputs.get(&role) {
                    Some(output) => pairs.push((template, output.clone())),
                    None => {
                        let warning = format!("template role '{}' has no output path", role);
                        tracing::warn!(module = %name, variant = %variant, "{}", warning);
                        warnings.push(warning);
                    }
                }
            }

            for (template, output) in pairs {
                let output = renderer
                    .render_str("output path", &output, &ctx)
                    .map_err(|e| GeneratorError::wrap("template", e).with("module", &name))?;
                let rel = fsutil::normalize_rel(Path::new(output.trim()));
                let content = render_template(&renderer, &module, &template, &ctx)?;
                push_file(
                    &mut files,
                    &mut seen,
                    &name,
                    rel,
                    FileKind::Variant,
                    &template,
                    content,
                )?;
            }

            let mut extra = found.get_dependencies(&spec);
            extra.extend(found.get_dev_dependencies(&spec).into_iter().map(|mut d| {
                d.group.get_or_insert_with(|| deps::DEV_GROUP.to_string());
                d
            }));
            dependencies = deps::collect(manifest, profile, &extra);
            language = Some(spec.language.clone().unwrap_or_else(|| found.language().to_string()));
            plugin = Some(found);
        }

        let snippets = plan_snippets(&renderer, &module, profile, &ctx)?;

        tracing::debug!(
            module = %name,
            files = files.len(),
            snippets = snippets.len(),
            variant = ?variant,
            "planned module"
        );

        Ok(GenerationPlan {
            module: name,
            slug: slug.to_string(),
            version: manifest.version.clone(),
            profile: options.profile.clone(),
            variant,
            language,
            vendor_root,
            files,
            snippets,
            dependencies,
            warnings,
            module_dir: module.dir.clone(),
            context: ctx,
            class,
            plugin,
        })
    }

    /// Install `slug` and its dependencies into `project_root`
    pub fn generate(
        &self,
        slug: &str,
        project_root: &Path,
        options: &GenerateOptions,
    ) -> Result<GenerateReport> {
        let existed = project_root.is_dir();
        let _lock = ProjectLock::acquire(project_root)?;

        let target = self.load(slug)?;
        let order = if options.skip_dependencies {
            vec![target.name().to_string()]
        } else {
            let manifests: Vec<_> = load_all_manifests(&self.modules_root)?
                .into_iter()
                .map(|m| m.manifest)
                .collect();
            compute_install_order(
                &[target.name().to_string()],
                &manifests,
                options.profile.as_deref(),
            )?
        };

        let mut report = GenerateReport::default();
        for name in order {
            let module_slug = if name == target.name() { slug } else { name.as_str() };
            let plan = self.plan(module_slug, project_root, options)?;
            report.modules.push(self.install(plan, project_root, options, existed)?);
        }
        Ok(report)
    }

    fn install(
        &self,
        mut plan: GenerationPlan,
        project_root: &Path,
        options: &GenerateOptions,
        existed: bool,
    ) -> Result<ModuleReport> {
        let mut installs = InstallRegistry::load(project_root)?;
        if let Some(installed) = installs.get(&plan.module) {
            if installed.version != plan.version && !options.update {
                return Err(GeneratorError::new("installed")
                    .with("module", &plan.module)
                    .with("installed_version", &installed.version)
                    .with("available_version", &plan.version)
                    .with("hint", "pass --update to replace the installed version")
                    .into());
            }
        }

        if existed {
            if let Some(plugin) = &plan.plugin {
                plugin.pre_generation_hook(project_root).map_err(|e| {
                    GeneratorError::wrap("pre_generation_hook", e).with("module", &plan.module)
                })?;
            }
        }

        let mut store = FileStateStore::load(project_root)?;
        let mut outcomes = Vec::with_capacity(plan.files.len());
        {
            let mut emitter =
                emit::Emitter::new(&mut store, &plan.module, &plan.version, options.force);
            for file in &plan.files {
                outcomes.push(emitter.emit(file)?);
            }
        }
        store.save()?;

        plan.class
            .call("post_variant_generation", project_root, &mut plan.context)
            .map_err(|e| {
                GeneratorError::wrap("post_variant_generation", e).with("module", &plan.module)
            })?;

        let injector = SnippetInjector::new(project_root, &self.config);
        let mut snippets = Vec::with_capacity(plan.snippets.len());
        for snippet in &plan.snippets {
            let target = fsutil::join_rel(project_root, &snippet.target);
            let result = injector.inject_rendered(
                &target,
                &snippet.rendered,
                &snippet.anchor,
                &snippet.metadata,
                snippet.lenient,
            )?;
            if result.blocked && !snippet.lenient {
                return Err(GeneratorError::new("snippet")
                    .with("module", &plan.module)
                    .with("snippet", &result.key)
                    .with("reason", result.reason.as_deref().unwrap_or("blocked"))
                    .into());
            }
            snippets.push(result);
        }

        if let Some(plugin) = &plan.plugin {
            let variant_files: Vec<PathBuf> = plan
                .files
                .iter()
                .zip(&outcomes)
                .filter(|(f, o)| {
                    f.kind == FileKind::Variant && o.action != EmitAction::SkippedModified
                })
                .map(|(f, _)| fsutil::join_rel(project_root, &f.rel))
                .collect();
            plugin
                .post_generation_hook(project_root, &variant_files)
                .map_err(|e| {
                    GeneratorError::wrap("post_generation_hook", e).with("module", &plan.module)
                })?;
        }

        let dependencies = match &plan.language {
            Some(language) => {
                deps::compose_for_language(project_root, language, &plan.dependencies)?
            }
            None => Vec::new(),
        };

        installs.upsert(&plan.slug, &plan.module, &plan.version, plan.profile.as_deref());
        installs.save(project_root)?;
        let mut lock = ModulesLock::load(project_root)?;
        lock.set(&plan.module, &plan.version);
        lock.save(project_root)?;

        let versioning = AutoVersioner::new(
            &plan.module_dir,
            VersionOptions {
                skip_verification_write: self.config.skip_verification_write,
                ..VersionOptions::default()
            },
        )
        .run()
        .map_err(|e| GeneratorError::wrap("versioning", e).with("module", &plan.module))?;

        let report = ModuleReport {
            module: plan.module,
            slug: plan.slug,
            version: plan.version,
            profile: plan.profile,
            variant: plan.variant,
            files: outcomes,
            snippets,
            dependencies,
            versioning: Some(versioning),
            warnings: plan.warnings,
        };
        tracing::info!(
            module = %report.module,
            version = %report.version,
            created = report.count(EmitAction::Created),
            updated =
                report.count(EmitAction::Updated) + report.count(EmitAction::ForceOverwritten),
            skipped = report.count(EmitAction::SkippedModified),
            snippets = report.snippets.iter().filter(|s| s.injected).count(),
            "module generated"
        );
        Ok(report)
    }
}

/// Requested variant, else the profile's first segment, else the only one declared
fn resolve_variant(
    module: &LoadedModule,
    profile: Option<&str>,
    requested: Option<&str>,
) -> Option<String> {
    if let Some(variant) = requested {
        return Some(variant.to_string());
    }
    if let Some(profile) = profile {
        if let Some(first) = profile.split('/').next().filter(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    let manifest = &module.manifest;
    let declared: BTreeSet<&String> = manifest
        .generation
        .variants
        .keys()
        .chain(manifest.frameworks.keys())
        .collect();
    if declared.len() == 1 {
        declared.into_iter().next().cloned()
    } else {
        None
    }
}

fn render_template(
    renderer: &TemplateRenderer,
    module: &LoadedModule,
    template: &str,
    ctx: &Context,
) -> Result<String> {
    renderer
        .render_file(&module.template_path(template), ctx)
        .map_err(|e| {
            GeneratorError::wrap("template", e)
                .with("module", module.name())
                .with("template", template)
                .into()
        })
}

fn push_file(
    files: &mut Vec<PlannedFile>,
    seen: &mut BTreeSet<String>,
    module: &str,
    rel: String,
    kind: FileKind,
    template: &str,
    content: String,
) -> Result<()> {
    if rel.is_empty() || !seen.insert(rel.clone()) {
        return Err(GeneratorError::new("output")
            .with("module", module)
            .with("output", if rel.is_empty() { "<empty>" } else { rel.as_str() })
            .with("reason", "empty or duplicate output path")
            .into());
    }
    files.push(PlannedFile {
        hash: fsutil::sha256_hex(content.as_bytes()),
        rel,
        kind,
        template: template.to_string(),
        content,
    });
    Ok(())
}

fn snippet_applies(decl: &SnippetDecl, module: &LoadedModule, profile: Option<&str>) -> bool {
    if decl.profiles.is_empty() {
        return true;
    }
    let Some(profile) = profile else {
        return false;
    };
    module
        .manifest
        .profile_chain(profile)
        .iter()
        .any(|p| decl.profiles.contains(p))
}

fn plan_snippets(
    renderer: &TemplateRenderer,
    module: &LoadedModule,
    profile: Option<&str>,
    ctx: &Context,
) -> Result<Vec<PlannedSnippet>> {
    let manifest = &module.manifest;
    let mut planned = Vec::new();
    for decl in manifest.snippets.iter().filter(|d| snippet_applies(d, module, profile)) {
        let mut snippet_ctx = ctx.clone();
        snippet_ctx.extend(decl.context.clone());
        let rendered = render_template(renderer, module, &decl.template, &snippet_ctx)?;
        let target = renderer
            .render_str("snippet target", &decl.target, &snippet_ctx)
            .map_err(|e| GeneratorError::wrap("template", e).with("snippet", &decl.id))?;
        let metadata = SnippetMetadata {
            priority: decl.priority,
            patch_mode: decl.patch_mode,
            conflict_resolution: decl.conflict_resolution,
            ..SnippetMetadata::new(
                &decl.id,
                &manifest.name,
                decl.version.as_deref().unwrap_or(&manifest.version),
            )
        };
        planned.push(PlannedSnippet {
            id: decl.id.clone(),
            target: fsutil::normalize_rel(Path::new(target.trim())),
            anchor: decl.anchor.clone(),
            priority: decl.priority,
            lenient: decl.lenient,
            rendered,
            metadata,
        });
    }
    planned.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    Ok(planned)
}
