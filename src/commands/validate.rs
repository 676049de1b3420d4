//! `stackplan validate` - resolve and check stacks without planning

use anyhow::{Result, bail};
use stackgraph::validate;

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let session = Session::open(ctx)?;
    let layers = session.project.select(target)?;
    let catalog = session.project.config().catalog();
    let mut orchestrator = session.orchestrator();

    let mut failed = 0;
    for (name, resolution) in orchestrator.resolve(&layers) {
        match validate(resolution, &catalog) {
            Ok(validated) => {
                let graph = validated.graph();
                ui::success(&format!(
                    "{name}: {} resource(s), {} dependency edge(s), {} external reference(s)",
                    graph.len(),
                    graph.edge_count(),
                    graph.external().len()
                ));
            }
            Err(e) => {
                failed += 1;
                ui::print_findings(&name, e.findings());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} stack(s) failed validation");
    }
    Ok(())
}
