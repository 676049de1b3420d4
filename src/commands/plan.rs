//! `stackplan plan` - show provisioning plans

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use stackgraph::{ProvisioningPlan, compute_diffs};
use std::fs;

use super::Session;
use crate::Context;
use crate::cli::{PlanArgs, PlanFormat};
use crate::ui;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let layers = session.project.select(args.stack.as_deref())?;
    let mut orchestrator = session.orchestrator();

    let outcomes = orchestrator.plan_all(&layers);
    let failed = super::report_failures(&outcomes);
    let plans: Vec<&ProvisioningPlan> = outcomes
        .iter()
        .filter_map(|outcome| outcome.plan.as_ref().ok())
        .collect();
    let json = render_json(&plans)?;

    match args.format {
        PlanFormat::Json => println!("{json}"),
        PlanFormat::Text => {
            for plan in &plans {
                let diffs = compute_diffs(plan, session.store.applied(plan.stack()))
                    .context("Failed to diff plan against applied state")?;
                for diff in &diffs {
                    log::debug!(
                        "{}: {} '{}'",
                        plan.stack(),
                        ui::describe_change(diff.change),
                        diff.resource_id
                    );
                }
                ui::display_plan(plan, &diffs);

                if ctx.verbose > 0 {
                    for resource in plan.resources() {
                        ui::kv(
                            &resource.id,
                            &serde_json::to_string(&resource.properties)
                                .context("Failed to render properties")?,
                        );
                    }
                }
            }
        }
    }

    if let Some(out) = &args.out {
        fs::write(out, &json)
            .with_context(|| format!("Failed to write plan file: {}", out.display()))?;
        if !ctx.quiet {
            ui::success(&format!("Wrote plan to {}", out.display()));
        }
    }

    if let Some(compare) = &args.compare {
        let previous = fs::read_to_string(compare)
            .with_context(|| format!("Failed to read plan file: {}", compare.display()))?;
        print_comparison(&unified(&previous, &json, &compare.display().to_string()));
    }

    if failed > 0 {
        bail!("{failed} stack(s) could not be planned");
    }
    Ok(())
}

/// Canonical JSON of several plans, keyed by stack name
pub fn render_json(plans: &[&ProvisioningPlan]) -> Result<String> {
    let mut map = serde_json::Map::new();
    for plan in plans {
        map.insert(
            plan.stack().to_string(),
            serde_json::to_value(plan).context("Failed to serialize plan")?,
        );
    }
    serde_json::to_string_pretty(&serde_json::Value::Object(map)).context("Failed to serialize plans")
}

/// Unified diff between a saved plan and the current one
fn unified(previous: &str, current: &str, previous_name: &str) -> String {
    similar::TextDiff::from_lines(previous, current)
        .unified_diff()
        .context_radius(3)
        .header(previous_name, "current plan")
        .to_string()
}

fn print_comparison(diff: &str) {
    if diff.is_empty() {
        println!("    {}", "(plans are identical)".dimmed());
        return;
    }

    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}
