//! `stackplan stacks` - list stacks in dependency order

use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let project = &session.project;

    if project.is_empty() {
        ui::warn(&format!(
            "No stacks found in {}",
            project.root().display()
        ));
        return Ok(());
    }

    ui::header("Stacks");
    for (index, layer) in project.order()?.iter().enumerate() {
        ui::section(&format!("Layer {index}"));
        for name in layer {
            let Some(stack) = project.stack(name) else {
                continue;
            };
            let status = match session.store.get(name) {
                Some(record) => format!(
                    "applied {}",
                    record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
                )
                .green()
                .to_string(),
                None => "not applied".dimmed().to_string(),
            };
            println!("  {} {:<24} {:>3} resource(s)  {}", "•".cyan(), name, stack.len(), status);
            if !ctx.quiet
                && let Some(source) = project.source(name)
            {
                ui::dim(&format!("  {}", source.display()));
            }
        }
    }

    for (name, _) in session.store.records() {
        if project.stack(name).is_none() {
            ui::warn(&format!("State is recorded for '{name}', which is no longer declared"));
        }
    }

    Ok(())
}
