//! Progress display and prompts for stackplan CLI.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use stackgraph::{ApplyResult, ConfirmCallback, ProgressCallback};

/// Progress bar over the resources of one plan
pub struct BarProgress {
    pb: ProgressBar,
    quiet: bool,
}

impl BarProgress {
    pub fn new(len: usize, quiet: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(len as u64)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { pb, quiet }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Symbol shown next to a finished resource
pub fn result_symbol(result: &ApplyResult) -> &'static str {
    match result {
        ApplyResult::NoChange => "○",
        ApplyResult::Created | ApplyResult::Updated | ApplyResult::Removed => "✓",
        ApplyResult::Failed { .. } => "✗",
        ApplyResult::Skipped { .. } => "⊘",
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, index: usize, count: usize) {
        log::debug!("Batch {index}: {count} resource(s)");
    }

    fn on_resource_start(&mut self, id: &str, type_tag: &str) {
        self.pb.set_message(format!("{id} ({type_tag})"));
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        self.pb.set_message(format!("{} {id}", result_symbol(result)));
        self.pb.inc(1);

        if let ApplyResult::Failed { error } = result
            && !self.quiet
        {
            self.pb
                .suspend(|| println!("  {} {}: {}", "✗".red(), id, error));
        }
    }

    fn on_batch_complete(&mut self, index: usize) {
        log::debug!("Batch {index} complete");
    }
}

/// Asks on the terminal unless `--yes` was given
pub struct PromptConfirm {
    yes: bool,
}

impl PromptConfirm {
    pub fn new(yes: bool) -> Self {
        Self { yes }
    }
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}
