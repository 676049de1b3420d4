//! `stackplan graph` - show the resource dependency graph of a stack

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use stackgraph::{DependencyGraph, find_cycles, layers};

use super::Session;
use crate::Context;
use crate::cli::GraphFormat;
use crate::ui;

pub fn run(ctx: &Context, stack: &str, format: GraphFormat) -> Result<()> {
    let session = Session::open(ctx)?;
    let selected = session.project.select(Some(stack))?;
    let mut orchestrator = session.orchestrator();

    let (_, resolution) = orchestrator
        .resolve(&selected)
        .into_iter()
        .find(|(name, _)| name == stack)
        .with_context(|| format!("Stack '{stack}' was not resolved"))?;
    if !resolution.is_clean() {
        ui::print_findings(stack, &resolution.findings);
    }
    let graph = DependencyGraph::build(&resolution.stack);

    match format {
        GraphFormat::Dot => print!("{}", graph.to_dot()),
        GraphFormat::Text => print_layers(&graph),
    }
    Ok(())
}

fn print_layers(graph: &DependencyGraph) {
    ui::header(&format!(
        "{}: {} resource(s), {} edge(s)",
        graph.name(),
        graph.len(),
        graph.edge_count()
    ));

    match layers(graph) {
        Ok(layers) => {
            for (index, layer) in layers.iter().enumerate() {
                ui::section(&format!("Batch {index}"));
                for node in layer {
                    println!("  {} {}", "•".cyan(), node);
                    let dependencies: Vec<&str> = graph.dependencies_of(node).collect();
                    if !dependencies.is_empty() {
                        ui::dim(&format!("  after {}", dependencies.join(", ")));
                    }
                    for reference in graph.external_of(node) {
                        ui::dim(&format!("  waits on {reference}"));
                    }
                }
            }
        }
        Err(_) => {
            for cycle in find_cycles(graph) {
                ui::warn(&format!("cycle: {}", cycle.join(" -> ")));
            }
        }
    }

    for (node, target) in graph.dangling() {
        ui::warn(&format!("{node} references missing '{target}'"));
    }
}
