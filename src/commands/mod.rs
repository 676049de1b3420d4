//! Command implementations
//!
//! Every command opens the project the same way: project config, stack
//! files, applied state and merged parameters.

pub mod apply;
pub mod graph;
pub mod outputs;
pub mod plan;
pub mod stacks;
pub mod validate;

use anyhow::Result;
use stackgraph::Parameters;

use crate::Context;
use crate::config;
use crate::engine::{Orchestrator, Project, StackOutcome};
use crate::state::StateStore;
use crate::ui;

/// A loaded project with its state and parameters
pub struct Session {
    pub project: Project,
    pub store: StateStore,
    pub params: Parameters,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let project = Project::load(&ctx.project)?;
        let store = StateStore::load(&project.state_path())?;
        let params = config::merge_parameters(project.config(), std::env::vars(), &ctx.params);
        log::debug!("{} parameter(s) in effect", params.len());
        Ok(Self {
            project,
            store,
            params,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.project, self.params.clone(), &self.store)
    }
}

/// Print the problems of every failed outcome, returning how many failed
pub fn report_failures(outcomes: &[StackOutcome]) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        if let Err(e) = &outcome.plan {
            failed += 1;
            if e.findings().is_empty() {
                ui::error(&format!("{}: {e}", outcome.name));
            } else {
                ui::print_findings(&outcome.name, e.findings());
            }
        }
    }
    failed
}
