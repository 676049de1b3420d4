use colored::Colorize;
use stackgraph::{
    ChangeKind, DiffSummary, ExecuteSummary, Finding, PlannedResource, ProvisioningPlan,
    ResourceDiff,
};
use std::collections::BTreeMap;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

// ============================================================================
// Findings
// ============================================================================

/// Print every finding of a stack
pub fn print_findings(stack: &str, findings: &[Finding]) {
    error(&format!(
        "Stack '{stack}' is invalid ({} finding(s))",
        findings.len()
    ));
    for finding in findings {
        eprintln!("    {} {}", "•".red(), finding);
    }
}

// ============================================================================
// Plans
// ============================================================================

/// Short description of what a resource waits for
pub fn resource_detail(resource: &PlannedResource) -> String {
    let mut parts = Vec::new();
    if !resource.depends_on.is_empty() {
        parts.push(format!("after {}", resource.depends_on.join(", ")));
    }
    if !resource.waits_on.is_empty() {
        let waits: Vec<String> = resource.waits_on.iter().map(ToString::to_string).collect();
        parts.push(format!("waits on {}", waits.join(", ")));
    }
    parts.join("; ")
}

/// Describe a planned change in words
pub fn describe_change(change: ChangeKind) -> &'static str {
    match change {
        ChangeKind::Create => "create",
        ChangeKind::Update => "update",
        ChangeKind::NoChange => "unchanged",
        ChangeKind::Remove => "remove",
    }
}

fn change_symbol(change: ChangeKind) -> colored::ColoredString {
    match change {
        ChangeKind::Create => "+".green(),
        ChangeKind::Update => "~".yellow(),
        ChangeKind::Remove => "-".red(),
        ChangeKind::NoChange => "○".dimmed(),
    }
}

/// Display a plan batch by batch, with the change each resource will see
pub fn display_plan(plan: &ProvisioningPlan, diffs: &[ResourceDiff]) {
    let changes: BTreeMap<&str, ChangeKind> = diffs
        .iter()
        .map(|d| (d.resource_id.as_str(), d.change))
        .collect();

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        format!("Plan: {}", plan.stack()).bold()
    );
    println!("│");

    if plan.is_empty() {
        println!("│ {}", "(no resources)".dimmed());
        println!("│");
    }

    for batch in plan.batches() {
        println!("│ {}", format!("Batch {}", batch.index).bold());
        for resource in &batch.resources {
            let change = changes
                .get(resource.id.as_str())
                .copied()
                .unwrap_or(ChangeKind::Create);
            let detail = resource_detail(resource);
            println!(
                "│   {} {:<30} {}{}",
                change_symbol(change),
                resource.id,
                resource.type_tag.dimmed(),
                if detail.is_empty() {
                    String::new()
                } else {
                    format!("  ({detail})").dimmed().to_string()
                }
            );
        }
        println!("│");
    }

    let removals: Vec<&ResourceDiff> = diffs
        .iter()
        .filter(|d| d.change == ChangeKind::Remove)
        .collect();
    if !removals.is_empty() {
        println!("│ {}", "Removed".bold());
        for diff in removals {
            println!(
                "│   {} {:<30} {}",
                change_symbol(diff.change),
                diff.resource_id,
                diff.resource_type.dimmed()
            );
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to remove, {} unchanged",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.removals.to_string().red(),
        summary.unchanged
    );
    if !plan.external().is_empty() {
        println!(
            "│ Waits on: {}",
            plan.foreign_stacks()
                .into_iter()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}

/// Print final summary of an apply
pub fn print_summary(stack: &str, summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Stack '{}' applied successfully!",
            "✓".green().bold(),
            stack
        );
    } else {
        println!(
            "  {} Stack '{}' applied with errors",
            "⚠".yellow().bold(),
            stack
        );
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.no_change > 0 {
        println!("    • {} resources unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

// ============================================================================
// Tests
// ============================================================================
