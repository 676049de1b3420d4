//! Cycle and validation checks
//!
//! Turns a [`Resolution`] into a [`ValidatedStack`], or into one
//! [`Error::Validation`] carrying every finding at once.

use crate::error::{Error, Finding, Result};
use crate::graph::DependencyGraph;
use crate::resolver::{Resolution, rotate_to_smallest};
use crate::stack::ResolvedStack;
use crate::value::Link;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Knowledge of which attributes a resource type exposes
pub trait AttributeCatalog: Sync {
    fn knows(&self, type_tag: &str, attribute: &str) -> bool;
}

/// Catalog that accepts every attribute
pub struct AnyAttribute;

impl AttributeCatalog for AnyAttribute {
    fn knows(&self, _type_tag: &str, _attribute: &str) -> bool {
        true
    }
}

/// Catalog of known attributes per type tag
///
/// Types that are not listed accept any attribute.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeCatalog {
    types: BTreeMap<String, BTreeSet<String>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, type_tag: impl Into<String>, attributes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types
            .entry(type_tag.into())
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl AttributeCatalog for TypeCatalog {
    fn knows(&self, type_tag: &str, attribute: &str) -> bool {
        self.types
            .get(type_tag)
            .is_none_or(|attributes| attributes.contains(attribute))
    }
}

/// A resolved stack whose dependency graph is known to be a DAG
#[derive(Debug, Clone)]
pub struct ValidatedStack {
    resolved: ResolvedStack,
    graph: DependencyGraph,
}

impl ValidatedStack {
    pub fn name(&self) -> &str {
        &self.resolved.name
    }

    pub fn resolved(&self) -> &ResolvedStack {
        &self.resolved
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

/// Validate a resolution
///
/// Resolver findings are merged with graph and catalog findings; duplicates
/// are dropped.
pub fn validate<C: AttributeCatalog + ?Sized>(
    resolution: Resolution,
    catalog: &C,
) -> Result<ValidatedStack> {
    let Resolution {
        stack: resolved,
        findings: mut collected,
    } = resolution;
    let graph = DependencyGraph::build(&resolved);
    let name = resolved.name.clone();

    let mut push = |finding: Finding| {
        if !collected.contains(&finding) {
            collected.push(finding);
        }
    };

    for resource in resolved.resources.values() {
        if resource.type_tag.trim().is_empty() {
            push(Finding::EmptyTypeTag {
                stack: name.clone(),
                resource: resource.id.clone(),
            });
        }
    }

    for (node, target) in graph.dangling() {
        push(Finding::UnresolvedReference {
            stack: name.clone(),
            origin: node.to_string(),
            target: target.to_string(),
        });
    }

    for resource in resolved.resources.values() {
        for value in resource.properties.values() {
            for link in value.links() {
                let Link::Pointer(target) = link else { continue };
                let Some(attribute) = &target.attribute else { continue };
                if target.stack != name {
                    continue;
                }
                let Some(owner) = resolved.resources.get(&target.resource) else {
                    continue;
                };
                if !catalog.knows(&owner.type_tag, attribute) {
                    push(Finding::UnknownAttribute {
                        stack: name.clone(),
                        origin: resource.id.clone(),
                        resource: owner.id.clone(),
                        type_tag: owner.type_tag.clone(),
                        attribute: attribute.clone(),
                    });
                }
            }
        }
    }

    for (output, value) in &resolved.outputs {
        for link in value.links() {
            let Link::Pointer(target) = link else { continue };
            if target.stack != name {
                continue;
            }
            let valid = resolved
                .resources
                .get(&target.resource)
                .is_some_and(|owner| {
                    target
                        .attribute
                        .as_ref()
                        .is_none_or(|attribute| catalog.knows(&owner.type_tag, attribute))
                });
            if !valid {
                push(Finding::InvalidOutputReference {
                    stack: name.clone(),
                    output: output.clone(),
                    target: target.resource.clone(),
                    attribute: target.attribute.clone(),
                });
            }
        }
    }

    for cycle in find_cycles(&graph) {
        push(Finding::CyclicDependency {
            stack: name.clone(),
            cycle,
        });
    }

    if !collected.is_empty() {
        log::debug!("stack '{name}' failed validation with {} finding(s)", collected.len());
        return Err(Error::Validation {
            stack: name,
            findings: collected,
        });
    }

    Ok(ValidatedStack { resolved, graph })
}

/// Every dependency cycle in the graph
///
/// Depth-first over nodes and neighbours in lexical order, with an explicit
/// stack of neighbour iterators so long chains cannot exhaust the thread
/// stack. Each back edge yields the path it closes, rotated to start at its
/// smallest identifier. Cycles are listed in the direction of "depends on".
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        /// On the current path, at this depth
        Visiting(usize),
        Done,
    }

    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut cycles = BTreeSet::new();

    for root in graph.nodes() {
        if marks.contains_key(root) {
            continue;
        }
        marks.insert(root, Mark::Visiting(0));
        let mut path = vec![root];
        let mut frames = vec![graph.dependencies_of(root)];

        while let Some(frame) = frames.last_mut() {
            let Some(next) = frame.next() else {
                frames.pop();
                if let Some(node) = path.pop() {
                    marks.insert(node, Mark::Done);
                }
                continue;
            };
            match marks.get(next).copied() {
                Some(Mark::Visiting(depth)) => {
                    let cycle = path[depth..].iter().map(|n| (*n).to_string()).collect();
                    cycles.insert(rotate_to_smallest(cycle));
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next, Mark::Visiting(path.len()));
                    path.push(next);
                    frames.push(graph.dependencies_of(next));
                }
            }
        }
    }
    cycles.into_iter().collect()
}
