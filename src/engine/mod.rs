//! Project engine for stackplan
//!
//! The engine ties the library crates to a project directory:
//! 1. Loading - Read the project config and every stack file
//! 2. Ordering - Layer stacks by their cross-stack references
//! 3. Planning - Resolve each layer in parallel, then validate and plan
//! 4. Provisioning - Apply plans with the local provisioner

pub mod orchestrator;
pub mod provisioner;

pub use orchestrator::{Orchestrator, StackOutcome};
pub use provisioner::LocalProvisioner;

use crate::config::{self, ProjectConfig};
use anyhow::{Context, Result, bail};
use stackgraph::{DependencyGraph, NoSiblings, Resolver, Stack, find_cycles, layers};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A loaded project: its config and every stack it declares
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    config: ProjectConfig,
    stacks: BTreeMap<String, Stack>,
    sources: BTreeMap<String, PathBuf>,
}

impl Project {
    /// Load the project rooted at `root`
    ///
    /// Stacks listed in the config are loaded in order; without a list,
    /// stack files are discovered below the root.
    pub fn load(root: &Path) -> Result<Self> {
        let config = ProjectConfig::load(root)?;
        config::check_entries(&config)?;

        let entries: Vec<(Option<String>, PathBuf)> = if config.stacks.is_empty() {
            stackfile::discover(root)
                .into_iter()
                .map(|source| (None, source.path))
                .collect()
        } else {
            config
                .stacks
                .iter()
                .map(|entry| (entry.name.clone(), root.join(&entry.path)))
                .collect()
        };

        let mut stacks = BTreeMap::new();
        let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();
        for (name, path) in entries {
            let stack = stackfile::load_as(&path, name.as_deref())
                .with_context(|| format!("Failed to load stack file: {}", path.display()))?;
            let name = stack.name().to_string();
            if let Some(existing) = sources.get(&name) {
                bail!(
                    "Stack '{name}' is declared by both {} and {}",
                    existing.display(),
                    path.display()
                );
            }
            if let Some(reference) = Resolver::<NoSiblings>::cross_stack_refs(&stack)
                .into_iter()
                .find(|reference| reference.stack == name)
            {
                bail!(
                    "Stack '{name}' ({}) references itself through '{reference}', use a resource or setting reference instead",
                    path.display()
                );
            }
            log::debug!("Loaded stack '{name}' from {}", path.display());
            sources.insert(name.clone(), path);
            stacks.insert(name, stack);
        }

        log::info!("Loaded {} stack(s) from {}", stacks.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            config,
            stacks,
            sources,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn state_path(&self) -> PathBuf {
        self.config.state_path(&self.root)
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.get(name)
    }

    /// Stacks by name, sorted
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values()
    }

    pub fn source(&self, name: &str) -> Option<&Path> {
        self.sources.get(name).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Stack-level dependency graph
    ///
    /// A stack depends on every other project stack it references. References
    /// to stacks outside the project are left to the resolver to report.
    pub fn graph(&self) -> DependencyGraph {
        let mut edges = BTreeSet::new();
        for (name, stack) in &self.stacks {
            for reference in Resolver::<NoSiblings>::cross_stack_refs(stack) {
                if self.stacks.contains_key(&reference.stack) {
                    edges.insert((reference.stack, name.clone()));
                }
            }
        }
        DependencyGraph::from_edges("project", self.stacks.keys().cloned(), edges)
    }

    /// Stack names layered so that every stack follows the ones it references
    pub fn order(&self) -> Result<Vec<Vec<String>>> {
        let graph = self.graph();
        match layers(&graph) {
            Ok(layers) => Ok(layers),
            Err(_) => {
                let cycles: Vec<String> = find_cycles(&graph)
                    .into_iter()
                    .map(|mut cycle| {
                        if let Some(first) = cycle.first().cloned() {
                            cycle.push(first);
                        }
                        cycle.join(" -> ")
                    })
                    .collect();
                bail!("Stacks reference each other in a cycle: {}", cycles.join("; "))
            }
        }
    }

    /// Layers restricted to `target` and the stacks it transitively references
    ///
    /// With no target, every stack is selected.
    pub fn select(&self, target: Option<&str>) -> Result<Vec<Vec<String>>> {
        let order = self.order()?;
        let Some(target) = target else {
            return Ok(order);
        };
        if !self.stacks.contains_key(target) {
            bail!(
                "Unknown stack '{target}' (known: {})",
                self.stacks.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        let graph = self.graph();
        let mut selected = BTreeSet::from([target.to_string()]);
        let mut queue = vec![target.to_string()];
        while let Some(name) = queue.pop() {
            for dependency in graph.dependencies_of(&name) {
                if selected.insert(dependency.to_string()) {
                    queue.push(dependency.to_string());
                }
            }
        }

        Ok(order
            .into_iter()
            .map(|layer| {
                layer
                    .into_iter()
                    .filter(|name| selected.contains(name))
                    .collect::<Vec<_>>()
            })
            .filter(|layer| !layer.is_empty())
            .collect())
    }
}
