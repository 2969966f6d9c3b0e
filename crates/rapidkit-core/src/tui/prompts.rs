//! Charm-style merge prompts using cliclack

use crate::error::{Error, Result};
use crate::lifecycle::{MergeDecision, MergePrompter};
use crate::state::FileState;

/// Lines of each side shown before asking
const PREVIEW_LINES: usize = 12;

/// Asks per file whether to keep the local copy or take the template
#[derive(Debug, Default)]
pub struct ClackMergePrompter {
    /// Apply the first answer to every remaining file
    sticky: Option<MergeDecision>,
    started: bool,
}

impl ClackMergePrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the prompt session, if one was opened
    pub fn finish(&self, summary: &str) -> Result<()> {
        if self.started {
            cliclack::outro(summary).map_err(prompt_error)?;
        }
        Ok(())
    }
}

impl MergePrompter for ClackMergePrompter {
    fn decide(
        &mut self,
        file: &str,
        status: FileState,
        current: Option<&str>,
        template: &str,
    ) -> Result<MergeDecision> {
        if let Some(decision) = self.sticky {
            return Ok(decision);
        }
        if !self.started {
            cliclack::intro("rapidkit merge").map_err(prompt_error)?;
            self.started = true;
        }

        cliclack::log::info(format!("{} ({})", file, status)).map_err(prompt_error)?;
        match current {
            Some(text) => cliclack::note("Current", preview(text)).map_err(prompt_error)?,
            None => cliclack::log::warning("File is missing on disk").map_err(prompt_error)?,
        }
        cliclack::note("Template", preview(template)).map_err(prompt_error)?;

        let choice: &str = cliclack::select(format!("How should {} be resolved?", file))
            .item("keep", "Keep current file", "")
            .item("apply", "Apply template", "the current content is snapshotted")
            .item("keep-all", "Keep current for all remaining files", "")
            .item("apply-all", "Apply template to all remaining files", "")
            .interact()
            .map_err(prompt_error)?;

        let decision = match choice {
            "apply" | "apply-all" => MergeDecision::ApplyTemplate,
            _ => MergeDecision::KeepCurrent,
        };
        if choice.ends_with("-all") {
            self.sticky = Some(decision);
        }
        Ok(decision)
    }
}

/// Ensure the terminal cursor is visible again
pub fn restore_cursor() {
    let _ = console::Term::stderr().show_cursor();
}

fn preview(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().take(PREVIEW_LINES).collect();
    let total = text.lines().count();
    if total > PREVIEW_LINES {
        lines.push("...");
    }
    lines.join("\n")
}

fn prompt_error(err: std::io::Error) -> Error {
    Error::Other(format!("prompt failed: {}", err))
}
