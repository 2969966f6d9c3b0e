//! Human and JSON rendering of engine reports

use anyhow::Result;
use colored::Colorize;
use rapidkit_core::generator::EmitAction;
use rapidkit_core::lifecycle::{
    CheckpointReport, DiffReport, MergeDecision, MergeReport, RollbackReport, SkippedFile,
    UninstallReport,
};
use rapidkit_core::versioning::VersionOutcome;
use rapidkit_core::{FileState, GenerateReport, GenerationPlan, LoadedModule};
use serde::Serialize;
use std::path::Path;

/// Print `value` as pretty JSON or through its human renderer
pub fn emit<T: Serialize + ?Sized>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

pub fn print_error(err: &anyhow::Error) {
    eprintln!("  {} {}", "✗".red(), err.to_string().red());
    for cause in err.chain().skip(1) {
        eprintln!("    {}", cause.to_string().dimmed());
    }
}

pub fn print_plan(plan: &GenerationPlan) {
    println!(
        "  {}  {} {}",
        "◆".blue().bold(),
        plan.module.bold(),
        format!("v{} (plan only)", plan.version).dimmed()
    );
    if let Some(variant) = &plan.variant {
        println!("  {} variant {}", "◇".blue(), variant);
    }
    for file in &plan.files {
        println!("  {} {} {}", "+".green(), file.rel, format!("[{}]", file.template).dimmed());
    }
    for snippet in &plan.snippets {
        println!("  {} {} -> {}", "»".cyan(), snippet.id, snippet.target);
    }
    for dep in &plan.dependencies {
        println!("  {} {} {}", "·".dimmed(), dep.name, dep.version.dimmed());
    }
    print_warnings(&plan.warnings);
}

pub fn print_generate(report: &GenerateReport) {
    for module in &report.modules {
        println!(
            "  {}  {} {}",
            "◆".blue().bold(),
            module.module.bold(),
            format!("v{}", module.version).dimmed()
        );
        for file in &module.files {
            let marker = match file.action {
                EmitAction::Created => "+".green(),
                EmitAction::Updated | EmitAction::ForceOverwritten => "~".yellow(),
                EmitAction::Adopted => "=".blue(),
                EmitAction::Unchanged => "·".dimmed(),
                EmitAction::SkippedModified => "!".red(),
            };
            if file.action == EmitAction::SkippedModified {
                println!("  {} {} {}", marker, file.file, "(locally modified, kept)".dimmed());
            } else if file.action != EmitAction::Unchanged {
                println!("  {} {}", marker, file.file);
            }
        }
        for snippet in &module.snippets {
            let marker = if snippet.injected {
                "»".green()
            } else if snippet.blocked {
                "!".red()
            } else {
                "·".dimmed()
            };
            let reason = snippet.reason.as_deref().map(|r| format!("({})", r)).unwrap_or_default();
            println!("  {} {} {} {}", marker, snippet.key, snippet.status, reason.dimmed());
        }
        for deps in module.dependencies.iter().filter(|d| d.changed()) {
            println!(
                "  {} {} {}",
                "●".blue(),
                deps.file,
                format!("(+{} added, {} upgraded)", deps.added.len(), deps.upgraded.len()).dimmed()
            );
        }
        match &module.versioning {
            Some(VersionOutcome::Bumped(bump)) => println!(
                "  {} module source changed: {} -> {}",
                "△".yellow(),
                bump.old_version,
                bump.new_version.yellow()
            ),
            Some(VersionOutcome::Baseline { .. }) => {
                println!("  {}", "Recorded module content baseline".dimmed())
            }
            _ => {}
        }
        print_warnings(&module.warnings);

        let wrote = module.files.iter().filter(|f| f.action.wrote()).count();
        println!(
            "  {} {} file(s) written, {} unchanged",
            "●".green(),
            wrote,
            module.files.len() - wrote
        );
    }
}

pub fn print_diff(report: &DiffReport) {
    println!("  {}  {}", "◆".blue().bold(), report.module.bold());
    for entry in &report.files {
        let status = entry.status.as_str();
        let label = match entry.status {
            FileState::Clean => status.dimmed(),
            FileState::TemplateUpdated | FileState::NewTemplate => status.blue(),
            FileState::LocallyModified => status.yellow(),
            FileState::BothModified | FileState::Missing => status.red(),
            FileState::Untracked => status.normal(),
        };
        println!("  {:<18} {}", label, entry.file);
    }
    if report.is_clean() {
        println!("  {} {}", "●".green(), "No local changes".dimmed());
    }
}

pub fn print_merge(report: &MergeReport) {
    println!(
        "  {}  {} {}",
        "◆".blue().bold(),
        report.module.bold(),
        format!("(strategy {})", report.strategy).dimmed()
    );
    for action in &report.actions {
        let decision = match action.decision {
            MergeDecision::ApplyTemplate => "apply".green(),
            MergeDecision::KeepCurrent => "keep".dimmed(),
        };
        let status = format!("({})", action.status_before);
        println!("  {:<6} {} {}", decision, action.file, status.dimmed());
    }
    if report.actions.is_empty() {
        println!("  {} {}", "●".green(), "Nothing to merge".dimmed());
    } else {
        print_dry_run(report.dry_run);
        println!("  {} {} file(s) updated", "●".green(), report.updated());
    }
}

pub fn print_uninstall(report: &UninstallReport) {
    println!("  {}  {}", "◆".blue().bold(), report.module.bold());
    for file in &report.removed {
        println!("  {} {}", "-".red(), file);
    }
    for snippet in report.snippets.iter().filter(|s| s.removed) {
        println!("  {} {}", "«".red(), snippet.key);
    }
    print_skipped(&report.skipped);
    print_dry_run(report.dry_run);
    if !report.dry_run && !report.unregistered {
        println!(
            "  {} {}",
            "△".yellow(),
            "Module kept in registry.json because modified files remain".yellow()
        );
    }
}

pub fn print_rollback(report: &RollbackReport) {
    println!("  {}  {}", "◆".blue().bold(), report.module.bold());
    for entry in &report.restored {
        println!(
            "  {} {} {}",
            "↺".green(),
            entry.file,
            format!("(from {:?})", entry.source).to_lowercase().dimmed()
        );
    }
    for file in &report.unchanged {
        println!("  {} {}", "·".dimmed(), file.dimmed());
    }
    print_skipped(&report.skipped);
    print_dry_run(report.dry_run);
}

pub fn print_checkpoint(report: &CheckpointReport) {
    println!("  {}  {}", "◆".blue().bold(), report.module.bold());
    for entry in &report.files {
        let status = format!("({})", entry.status_before);
        println!("  {} {} {}", "●".green(), entry.file, status.dimmed());
    }
    print_skipped(&report.skipped);
}

/// One line of `list modules`
#[derive(Debug, Serialize)]
pub struct ModuleRow {
    pub name: String,
    pub slug: String,
    pub version: String,
    pub status: String,
    pub profiles: Vec<String>,
}

impl ModuleRow {
    pub fn new(module: &LoadedModule, root: &Path) -> Self {
        let slug = module
            .dir
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| module.name().to_string());
        Self {
            name: module.name().to_string(),
            slug,
            version: module.manifest.version.clone(),
            status: module.manifest.status.clone(),
            profiles: module.manifest.profiles.clone(),
        }
    }
}

pub fn print_modules(rows: &[ModuleRow]) {
    if rows.is_empty() {
        println!("  {}", "No modules found".dimmed());
        return;
    }
    for row in rows {
        println!(
            "  {} {} {} {}",
            "●".blue(),
            row.slug.bold(),
            format!("v{}", row.version).dimmed(),
            format!("[{}]", row.status).dimmed()
        );
        if !row.profiles.is_empty() {
            println!("    {}", row.profiles.join(", ").dimmed());
        }
    }
}

fn print_skipped(skipped: &[SkippedFile]) {
    for file in skipped {
        println!("  {} {} {}", "○".yellow(), file.file, format!("({})", file.reason).dimmed());
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  {} {}", "△".yellow(), warning.yellow());
    }
}

fn print_dry_run(dry_run: bool) {
    if dry_run {
        println!("  {}", "Dry run: no files were changed".dimmed());
    }
}
