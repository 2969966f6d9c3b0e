//! RapidKit CLI - Compose modules into application projects

mod output;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rapidkit_core::lifecycle::{
    self, CheckpointOptions, KeepCurrentPrompter, MergeOptions, MergePrompter, MergeStrategy,
    RollbackOptions, UninstallOptions,
};
use rapidkit_core::manifest::{load_all_manifests, resolve_modules_root, select_test_modules};
use rapidkit_core::{EngineConfig, GenerateOptions, ModuleGenerator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Log filter read before `RUST_LOG`
const LOG_ENV: &str = "RAPIDKIT_LOG";

#[derive(Parser, Debug)]
#[command(name = "rapidkit")]
#[command(about = "Compose RapidKit modules into application projects")]
#[command(version)]
pub struct Args {
    /// Directory containing module sources (defaults to a discovered `modules/`)
    #[arg(long = "modules-root", global = true)]
    pub modules_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a module and the modules it depends on
    #[command(subcommand)]
    Add(AddCommand),
    /// Compare installed files against the registry and a fresh render
    #[command(subcommand)]
    Diff(DiffCommand),
    /// Reconcile files where local edits and template updates diverged
    #[command(subcommand)]
    Merge(MergeCommand),
    /// Remove a module's unmodified files and snippets
    #[command(subcommand)]
    Uninstall(UninstallCommand),
    /// Restore files to their content before the last engine write
    #[command(subcommand)]
    Rollback(RollbackCommand),
    /// Accept current file contents as the new baseline
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),
    /// List available modules
    #[command(subcommand)]
    List(ListCommand),
}

#[derive(Subcommand, Debug)]
pub enum AddCommand {
    Module(AddArgs),
}

#[derive(Subcommand, Debug)]
pub enum DiffCommand {
    Module(DiffArgs),
}

#[derive(Subcommand, Debug)]
pub enum MergeCommand {
    Module(MergeArgs),
}

#[derive(Subcommand, Debug)]
pub enum UninstallCommand {
    Module(UninstallArgs),
}

#[derive(Subcommand, Debug)]
pub enum RollbackCommand {
    Module(RollbackArgs),
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommand {
    Module(CheckpointArgs),
}

#[derive(Subcommand, Debug)]
pub enum ListCommand {
    Modules(ListArgs),
}

#[derive(ClapArgs, Debug)]
pub struct Target {
    /// Module slug (e.g. `free/essentials/logging` or `logging`)
    pub slug: String,

    /// Project root
    #[arg(short, long, default_value = ".")]
    pub project: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub target: Target,

    /// Profile to install (e.g. `fastapi/standard`)
    #[arg(long)]
    pub profile: Option<String>,

    /// Framework variant (defaults to the profile's framework)
    #[arg(long)]
    pub variant: Option<String>,

    /// Show what would be generated without writing anything
    #[arg(long)]
    pub plan: bool,

    /// Overwrite locally modified files (a snapshot is kept)
    #[arg(long)]
    pub force: bool,

    /// Replace an installed version with the current one
    #[arg(long)]
    pub update: bool,

    /// Install only this module, not its dependencies
    #[arg(long = "skip-dependencies")]
    pub skip_dependencies: bool,
}

#[derive(ClapArgs, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub target: Target,
}

#[derive(ClapArgs, Debug)]
pub struct MergeArgs {
    #[command(flatten)]
    pub target: Target,

    #[arg(long, value_enum, default_value_t = StrategyArg::PreferCurrent)]
    pub strategy: StrategyArg,

    /// Apply files changed only by the template regardless of strategy
    #[arg(long = "auto-apply-template-updated")]
    pub auto_apply_template_updated: bool,

    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum StrategyArg {
    PreferCurrent,
    PreferTemplate,
    Prompt,
}

impl From<StrategyArg> for MergeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PreferCurrent => MergeStrategy::PreferCurrent,
            StrategyArg::PreferTemplate => MergeStrategy::PreferTemplate,
            StrategyArg::Prompt => MergeStrategy::Prompt,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct UninstallArgs {
    #[command(flatten)]
    pub target: Target,

    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug)]
pub struct RollbackArgs {
    #[command(flatten)]
    pub target: Target,

    /// Restore the current template render instead of the previous content
    #[arg(long = "template-reset")]
    pub template_reset: bool,

    /// Roll back files even if they were edited locally
    #[arg(long)]
    pub force: bool,

    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug)]
pub struct CheckpointArgs {
    #[command(flatten)]
    pub target: Target,

    /// Also snapshot files that match the registry
    #[arg(long = "include-clean")]
    pub include_clean: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ListArgs {
    /// Only modules admitted to the test matrix
    #[arg(long)]
    pub testable: bool,

    #[arg(long)]
    pub json: bool,
}

fn main() -> ExitCode {
    // Ensure terminal cursor is restored on panic
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = console::Term::stderr().show_cursor();
        default_panic(info);
    }));

    // Handle Ctrl+C gracefully
    ctrlc::set_handler(move || {
        let _ = console::Term::stderr().show_cursor();
        std::process::exit(130);
    })
    .ok();

    let args = Args::parse();
    init_tracing(args.verbose);
    tracing::debug!(engine = rapidkit_core::ENGINE_VERSION, "starting");

    let result = run(args);

    // Ensure cursor is visible on normal exit
    let _ = console::Term::stderr().show_cursor();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&err);
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<()> {
    let mut config = EngineConfig::from_env();
    if let Some(root) = args.modules_root {
        config = config.with_modules_root(root);
    }
    let modules_root = resolve_modules_root(&config).context("Failed to locate the modules root")?;
    tracing::debug!(root = %modules_root.display(), "using modules root");

    match args.command {
        Command::Add(AddCommand::Module(add)) => {
            let generator = ModuleGenerator::new(&modules_root, config);
            let options = GenerateOptions {
                profile: add.profile,
                variant: add.variant,
                force: add.force,
                update: add.update,
                skip_dependencies: add.skip_dependencies,
            };
            let target = &add.target;
            if add.plan {
                let plan = generator
                    .plan(&target.slug, &target.project, &options)
                    .with_context(|| format!("Failed to plan module '{}'", target.slug))?;
                return output::emit(target.json, &plan, output::print_plan);
            }
            let report = generator
                .generate(&target.slug, &target.project, &options)
                .with_context(|| format!("Failed to add module '{}'", target.slug))?;
            output::emit(target.json, &report, output::print_generate)
        }
        Command::Diff(DiffCommand::Module(diff)) => {
            let generator = ModuleGenerator::new(&modules_root, config);
            let target = &diff.target;
            let report = lifecycle::diff_module(&generator, &target.slug, &target.project)
                .with_context(|| format!("Failed to diff module '{}'", target.slug))?;
            output::emit(target.json, &report, output::print_diff)
        }
        Command::Merge(MergeCommand::Module(merge)) => {
            let generator = ModuleGenerator::new(&modules_root, config);
            let target = &merge.target;
            let options = MergeOptions {
                strategy: merge.strategy.into(),
                auto_apply_template_updated: merge.auto_apply_template_updated,
                dry_run: merge.dry_run,
            };
            let report = run_merge(&generator, target, &options)?;
            output::emit(target.json, &report, output::print_merge)
        }
        Command::Uninstall(UninstallCommand::Module(uninstall)) => {
            let generator = ModuleGenerator::new(&modules_root, config);
            let target = &uninstall.target;
            let options = UninstallOptions {
                dry_run: uninstall.dry_run,
            };
            let report =
                lifecycle::uninstall_module(&generator, &target.slug, &target.project, &options)
                    .with_context(|| format!("Failed to uninstall module '{}'", target.slug))?;
            output::emit(target.json, &report, output::print_uninstall)
        }
        Command::Rollback(RollbackCommand::Module(rollback)) => {
            let generator = ModuleGenerator::new(&modules_root, config);
            let target = &rollback.target;
            let options = RollbackOptions {
                template_reset: rollback.template_reset,
                force: rollback.force,
                dry_run: rollback.dry_run,
            };
            let report =
                lifecycle::rollback_module(&generator, &target.slug, &target.project, &options)
                    .with_context(|| format!("Failed to roll back module '{}'", target.slug))?;
            output::emit(target.json, &report, output::print_rollback)
        }
        Command::Checkpoint(CheckpointCommand::Module(checkpoint)) => {
            let generator = ModuleGenerator::new(&modules_root, config);
            let target = &checkpoint.target;
            let options = CheckpointOptions {
                include_clean: checkpoint.include_clean,
            };
            let report =
                lifecycle::checkpoint_module(&generator, &target.slug, &target.project, &options)
                    .with_context(|| format!("Failed to checkpoint module '{}'", target.slug))?;
            output::emit(target.json, &report, output::print_checkpoint)
        }
        Command::List(ListCommand::Modules(list)) => {
            let modules = load_all_manifests(&modules_root).with_context(|| {
                format!("Failed to load modules from {}", modules_root.display())
            })?;
            let selected = if list.testable {
                select_test_modules(&modules, &config)
            } else {
                modules.iter().collect()
            };
            let rows: Vec<output::ModuleRow> = selected
                .into_iter()
                .map(|m| output::ModuleRow::new(m, &modules_root))
                .collect();
            output::emit(list.json, &rows, |rows| output::print_modules(rows))
        }
    }
}

fn run_merge(
    generator: &ModuleGenerator,
    target: &Target,
    options: &MergeOptions,
) -> Result<lifecycle::MergeReport> {
    let interactive = options.strategy == MergeStrategy::Prompt
        && !target.json
        && console::Term::stdout().is_term();
    if interactive {
        let mut prompter = rapidkit_core::ClackMergePrompter::new();
        let report = merge_with(generator, target, options, &mut prompter)?;
        prompter.finish(&format!("{} file(s) updated", report.updated()))?;
        return Ok(report);
    }
    if options.strategy == MergeStrategy::Prompt {
        tracing::warn!("no terminal available for prompts, keeping current files");
    }
    merge_with(generator, target, options, &mut KeepCurrentPrompter)
}

fn merge_with(
    generator: &ModuleGenerator,
    target: &Target,
    options: &MergeOptions,
    prompter: &mut dyn MergePrompter,
) -> Result<lifecycle::MergeReport> {
    lifecycle::merge_module(generator, &target.slug, &target.project, options, prompter)
        .with_context(|| format!("Failed to merge module '{}'", target.slug))
}
