//! Multi-stack orchestration
//!
//! Stacks are resolved layer by layer. Stacks of one layer never reference
//! each other, so they are resolved in parallel against the registry filled
//! by earlier layers.

use super::Project;
use crate::state::StateStore;
use rayon::prelude::*;
use stackgraph::{
    AppliedStack, MemoryRegistry, Parameters, ProvisioningPlan, Resolution, Resolver, TypeCatalog,
    plan_stack, validate,
};

/// What planning produced for one stack
#[derive(Debug)]
pub struct StackOutcome {
    pub name: String,
    pub resolution: Resolution,
    pub plan: Result<ProvisioningPlan, stackgraph::Error>,
}

/// Plans the stacks of a project against one shared registry
pub struct Orchestrator<'a> {
    project: &'a Project,
    params: Parameters,
    catalog: TypeCatalog,
    registry: MemoryRegistry,
}

impl<'a> Orchestrator<'a> {
    /// Every project stack is declared; stacks with recorded state start out applied
    pub fn new(project: &'a Project, params: Parameters, store: &StateStore) -> Self {
        let mut registry = MemoryRegistry::new();
        for stack in project.stacks() {
            registry.declare(stack.name());
            if let Some(applied) = store.applied(stack.name()) {
                registry.insert_applied(stack.name(), applied.clone());
            }
        }

        Self {
            project,
            params,
            catalog: project.config().catalog(),
            registry,
        }
    }

    pub fn registry(&self) -> &MemoryRegistry {
        &self.registry
    }

    /// Resolve every stack of `layers`, in order
    ///
    /// Clean resolutions are published to the registry before the next layer
    /// starts; stacks with findings stay pending for their dependents.
    pub fn resolve(&mut self, layers: &[Vec<String>]) -> Vec<(String, Resolution)> {
        let mut resolved = Vec::new();

        for layer in layers {
            let resolver = Resolver::new(&self.params, &self.registry);
            let project = self.project;
            let results: Vec<(String, Resolution)> = layer
                .par_iter()
                .filter_map(|name| {
                    let stack = project.stack(name)?;
                    Some((name.clone(), resolver.resolve(stack)))
                })
                .collect();

            for (name, resolution) in &results {
                if resolution.is_clean() {
                    self.registry.insert_resolved(resolution.stack.clone());
                } else {
                    log::info!(
                        "Stack '{name}' has {} finding(s), dependents will see it as pending",
                        resolution.findings.len()
                    );
                }
            }
            resolved.extend(results);
        }

        resolved
    }

    /// Resolve, validate and plan every stack of `layers`
    pub fn plan_all(&mut self, layers: &[Vec<String>]) -> Vec<StackOutcome> {
        let resolved = self.resolve(layers);
        resolved
            .into_iter()
            .map(|(name, resolution)| {
                let plan = validate(resolution.clone(), &self.catalog)
                    .and_then(|validated| stackgraph::plan(&validated));
                StackOutcome {
                    name,
                    resolution,
                    plan,
                }
            })
            .collect()
    }

    /// Plan a single stack against the registry as it is now
    pub fn plan_one(&self, name: &str) -> anyhow::Result<ProvisioningPlan> {
        let stack = self
            .project
            .stack(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown stack '{name}'"))?;
        Ok(plan_stack(stack, &self.params, &self.registry, &self.catalog)?)
    }

    /// Publish the applied state of a stack to its dependents
    pub fn mark_applied(&mut self, name: &str, applied: AppliedStack) {
        self.registry.insert_applied(name, applied);
    }
}
