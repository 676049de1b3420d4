//! Dependency graph of one stack
//!
//! Nodes are resource identifiers. An edge `A -> B` in `dependencies`
//! means "A depends on B", so B must exist before A is provisioned.

use crate::stack::ResolvedStack;
use crate::value::{CrossStackRef, Link, Reference};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Directed graph of resource-to-resource dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    name: String,
    nodes: BTreeSet<String>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// Reverse of `dependencies`, kept in step by `add_dependency`
    dependents: BTreeMap<String, BTreeSet<String>>,
    external: BTreeMap<String, BTreeSet<CrossStackRef>>,
    dangling: BTreeSet<(String, String)>,
}

impl DependencyGraph {
    /// Build the graph from resolved references and `depends_on` hints
    ///
    /// Parameters and cross-stack values that resolved to literals add no
    /// edges. Deferred cross-stack values become external dependencies.
    pub fn build(stack: &ResolvedStack) -> Self {
        let mut graph = Self {
            name: stack.name.clone(),
            nodes: stack.resources.keys().cloned().collect(),
            ..Self::default()
        };

        for resource in stack.resources.values() {
            graph.dependencies.entry(resource.id.clone()).or_default();

            for value in resource.properties.values() {
                for link in value.links() {
                    match link {
                        Link::Pointer(target) if target.stack == stack.name => {
                            graph.add_dependency(&resource.id, &target.resource);
                        }
                        Link::Pointer(target) => {
                            let pointer = match &target.attribute {
                                Some(attribute) => {
                                    format!("/resources/{}/attributes/{attribute}", target.resource)
                                }
                                None => format!("/resources/{}", target.resource),
                            };
                            graph.add_external(
                                &resource.id,
                                CrossStackRef::new(target.stack.clone(), pointer),
                            );
                        }
                        Link::Deferred(reference) => {
                            graph.add_external(&resource.id, reference.clone());
                        }
                        Link::Unresolved(Reference::SelfRef { resource: target, .. }) => {
                            graph.add_dependency(&resource.id, target);
                        }
                        Link::Unresolved(_) => {}
                    }
                }
            }

            for hint in &resource.depends_on {
                graph.add_dependency(&resource.id, hint);
            }
        }

        log::debug!(
            "built dependency graph for '{}': {} node(s), {} edge(s), {} external",
            graph.name,
            graph.nodes.len(),
            graph.edge_count(),
            graph.external.values().map(BTreeSet::len).sum::<usize>()
        );
        graph
    }

    /// Build a plain graph from `(dependency, dependent)` pairs
    pub fn from_edges<I, E>(name: impl Into<String>, nodes: I, edges: E) -> Self
    where
        I: IntoIterator<Item = String>,
        E: IntoIterator<Item = (String, String)>,
    {
        let mut graph = Self {
            name: name.into(),
            nodes: nodes.into_iter().collect(),
            ..Self::default()
        };
        for node in &graph.nodes {
            graph.dependencies.insert(node.clone(), BTreeSet::new());
        }
        for (dependency, dependent) in edges {
            graph.add_dependency(&dependent, &dependency);
        }
        graph
    }

    fn add_dependency(&mut self, node: &str, target: &str) {
        if self.nodes.contains(target) {
            self.dependencies
                .entry(node.to_string())
                .or_default()
                .insert(target.to_string());
            self.dependents
                .entry(target.to_string())
                .or_default()
                .insert(node.to_string());
        } else {
            self.dangling.insert((node.to_string(), target.to_string()));
        }
    }

    fn add_external(&mut self, node: &str, reference: CrossStackRef) {
        self.external
            .entry(node.to_string())
            .or_default()
            .insert(reference);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in lexical order
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// What `node` depends on, in lexical order
    pub fn dependencies_of(&self, node: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(node)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// What depends on `node`, in lexical order
    pub fn dependents_of(&self, node: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(node)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Foreign values `node` waits on
    pub fn external_of(&self, node: &str) -> impl Iterator<Item = &CrossStackRef> {
        self.external.get(node).into_iter().flatten()
    }

    /// Every foreign value the graph waits on, sorted and deduplicated
    pub fn external(&self) -> BTreeSet<&CrossStackRef> {
        self.external.values().flatten().collect()
    }

    /// Edges whose target is not a node, as `(node, missing target)`
    pub fn dangling(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dangling.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }

    /// Render as Graphviz DOT, edges pointing from dependency to dependent
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape(&self.name));
        let _ = writeln!(out, "  rankdir=LR;");
        for node in &self.nodes {
            let _ = writeln!(out, "  \"{}\";", escape(node));
        }
        for (dependent, deps) in &self.dependencies {
            for dependency in deps {
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\";",
                    escape(dependency),
                    escape(dependent)
                );
            }
        }
        for (node, refs) in &self.external {
            for reference in refs {
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\" [style=dashed];",
                    escape(&reference.to_string()),
                    escape(node)
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, NoSiblings};
    use crate::resolver::Resolver;
    use crate::stack::{ResourceDeclaration, Stack};
    use crate::types::Parameters;
    use crate::value::Value;

    fn resolve(stack: &Stack) -> ResolvedStack {
        Resolver::new(&Parameters::new(), &NoSiblings).resolve(stack).stack
    }

    #[test]
    fn test_edges_from_pointers_and_hints() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("Vpc", "vpc"))
            .resource(ResourceDeclaration::new("Subnet", "subnet").property("VpcId", Value::self_ref("Vpc")))
            .resource(
                ResourceDeclaration::new("Instance", "instance")
                    .property("SubnetId", Value::attr_ref("Subnet", "Id"))
                    .property("Size", Value::param("size"))
                    .depends_on("Vpc"),
            )
            .build()
            .unwrap();

        let graph = DependencyGraph::build(&resolve(&stack));
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(
            graph.dependencies_of("Instance").collect::<Vec<_>>(),
            vec!["Subnet", "Vpc"]
        );
        assert_eq!(
            graph.dependents_of("Vpc").collect::<Vec<_>>(),
            vec!["Instance", "Subnet"]
        );
        assert_eq!(graph.dangling().count(), 0);
    }

    #[test]
    fn test_dangling_edges_are_kept() {
        let stack = Stack::builder("app")
            .resource(
                ResourceDeclaration::new("Subnet", "subnet")
                    .property("VpcId", Value::self_ref("Vpc"))
                    .depends_on("Gateway"),
            )
            .build()
            .unwrap();

        let graph = DependencyGraph::build(&resolve(&stack));
        assert_eq!(
            graph.dangling().collect::<Vec<_>>(),
            vec![("Subnet", "Gateway"), ("Subnet", "Vpc")]
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_deferred_values_are_external() {
        let stack = Stack::builder("bastion")
            .resource(
                ResourceDeclaration::new("Subnet", "subnet")
                    .property("VpcId", Value::cross_stack("network", "/outputs/VpcId")),
            )
            .build()
            .unwrap();
        let mut registry = MemoryRegistry::new();
        registry.declare("network");
        let resolved = Resolver::new(&Parameters::new(), &registry).resolve(&stack).stack;

        let graph = DependencyGraph::build(&resolved);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(
            graph.external_of("Subnet").collect::<Vec<_>>(),
            vec![&CrossStackRef::new("network", "/outputs/VpcId")]
        );
        assert_eq!(graph.external().len(), 1);
    }

    #[test]
    fn test_from_edges_and_dot() {
        let graph = DependencyGraph::from_edges(
            "project",
            ["network".to_string(), "bastion".to_string()],
            [("network".to_string(), "bastion".to_string())],
        );
        assert_eq!(
            graph.dependencies_of("bastion").collect::<Vec<_>>(),
            vec!["network"]
        );
        assert_eq!(
            graph.dependents_of("network").collect::<Vec<_>>(),
            vec!["bastion"]
        );
        assert_eq!(graph.dependents_of("bastion").count(), 0);
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph \"project\" {"));
        assert!(dot.contains("\"network\" -> \"bastion\";"));
    }
}
