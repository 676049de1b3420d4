//! Provisioning planner - layered topological order into batches

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::validate::ValidatedStack;
use crate::value::{CrossStackRef, Resolved};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A resource scheduled for provisioning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedResource {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub properties: IndexMap<String, Resolved>,
    /// Resources of the same stack that must exist first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Foreign values that must be applied first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waits_on: Vec<CrossStackRef>,
}

/// Resources that can be provisioned concurrently
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub index: usize,
    pub resources: Vec<PlannedResource>,
}

/// An ordered sequence of batches for one stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisioningPlan {
    stack: String,
    batches: Vec<Batch>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    outputs: IndexMap<String, Resolved>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    external: Vec<CrossStackRef>,
}

impl ProvisioningPlan {
    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn outputs(&self) -> &IndexMap<String, Resolved> {
        &self.outputs
    }

    /// Foreign values this plan waits on, sorted
    pub fn external(&self) -> &[CrossStackRef] {
        &self.external
    }

    /// Foreign stacks this plan waits on, sorted
    pub fn foreign_stacks(&self) -> BTreeSet<&str> {
        self.external.iter().map(|r| r.stack.as_str()).collect()
    }

    /// Number of resources in the plan
    pub fn len(&self) -> usize {
        self.batches.iter().map(|b| b.resources.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Resource ids in execution order
    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.batches
            .iter()
            .flat_map(|b| b.resources.iter().map(|r| r.id.as_str()))
    }

    pub fn resources(&self) -> impl Iterator<Item = &PlannedResource> {
        self.batches.iter().flat_map(|b| b.resources.iter())
    }

    /// Index of the batch containing `id`
    pub fn batch_of(&self, id: &str) -> Option<usize> {
        self.batches
            .iter()
            .find(|b| b.resources.iter().any(|r| r.id == id))
            .map(|b| b.index)
    }

    /// Canonical JSON rendering
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// BLAKE3 of the canonical JSON form, hex encoded
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, self)?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// Kahn's layered sort
///
/// Each layer holds the nodes whose dependencies all sit in earlier layers,
/// sorted lexically. On a cycle, the nodes that could not be placed are
/// returned as the error.
pub fn layers(graph: &DependencyGraph) -> std::result::Result<Vec<Vec<String>>, Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> = graph
        .nodes()
        .map(|node| (node, graph.dependencies_of(node).count()))
        .collect();

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut layers = Vec::new();

    while !ready.is_empty() {
        for node in &ready {
            in_degree.remove(node);
        }
        let mut next = BTreeSet::new();
        for node in &ready {
            for dependent in graph.dependents_of(node) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.insert(dependent);
                    }
                }
            }
        }
        layers.push(ready.iter().map(|n| (*n).to_string()).collect());
        ready = next.into_iter().collect();
    }

    if in_degree.is_empty() {
        Ok(layers)
    } else {
        Err(in_degree.keys().map(|n| (*n).to_string()).collect())
    }
}

/// Build the provisioning plan of a validated stack
pub fn plan(validated: &ValidatedStack) -> Result<ProvisioningPlan> {
    let graph = validated.graph();
    let resolved = validated.resolved();

    let layers = layers(graph).map_err(|remaining| {
        log::error!(
            "planner could not order {} node(s) of '{}' after validation passed",
            remaining.len(),
            validated.name()
        );
        Error::InternalInvariantViolation {
            stack: validated.name().to_string(),
            remaining,
        }
    })?;

    let mut batches = Vec::with_capacity(layers.len());
    for (index, layer) in layers.into_iter().enumerate() {
        let mut resources = Vec::with_capacity(layer.len());
        for id in layer {
            let Some(resource) = resolved.resources.get(&id) else {
                return Err(Error::InternalInvariantViolation {
                    stack: validated.name().to_string(),
                    remaining: vec![id],
                });
            };
            resources.push(PlannedResource {
                depends_on: graph.dependencies_of(&id).map(str::to_string).collect(),
                waits_on: graph.external_of(&id).cloned().collect(),
                id,
                type_tag: resource.type_tag.clone(),
                properties: resource.properties.clone(),
            });
        }
        batches.push(Batch { index, resources });
    }

    let plan = ProvisioningPlan {
        stack: validated.name().to_string(),
        batches,
        outputs: resolved.outputs.clone(),
        external: graph.external().into_iter().cloned().collect(),
    };
    log::debug!(
        "planned '{}': {} resource(s) in {} batch(es), {} external dependency(ies)",
        plan.stack,
        plan.len(),
        plan.batches.len(),
        plan.external.len()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, NoSiblings};
    use crate::resolver::Resolver;
    use crate::stack::{ResourceDeclaration, Stack};
    use crate::types::Parameters;
    use crate::validate::{AnyAttribute, validate};
    use crate::value::Value;

    fn plan_of(stack: &Stack) -> ProvisioningPlan {
        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(stack);
        plan(&validate(resolution, &AnyAttribute).unwrap()).unwrap()
    }

    fn diamond() -> Stack {
        Stack::builder("app")
            .resource(
                ResourceDeclaration::new("D", "t")
                    .property("B", Value::self_ref("B"))
                    .property("C", Value::self_ref("C")),
            )
            .resource(ResourceDeclaration::new("C", "t").property("A", Value::self_ref("A")))
            .resource(ResourceDeclaration::new("B", "t").property("A", Value::self_ref("A")))
            .resource(ResourceDeclaration::new("A", "t"))
            .build()
            .unwrap()
    }

    fn batch_ids(plan: &ProvisioningPlan) -> Vec<Vec<&str>> {
        plan.batches()
            .iter()
            .map(|b| b.resources.iter().map(|r| r.id.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_diamond_layers() {
        let plan = plan_of(&diamond());
        assert_eq!(batch_ids(&plan), vec![vec!["A"], vec!["B", "C"], vec!["D"]]);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.batch_of("C"), Some(1));
        assert_eq!(plan.batches()[2].resources[0].depends_on, vec!["B", "C"]);
    }

    #[test]
    fn test_batches_are_a_topological_order() {
        let plan = plan_of(&diamond());
        let mut seen = BTreeSet::new();
        for batch in plan.batches() {
            for resource in &batch.resources {
                for dependency in &resource.depends_on {
                    assert!(seen.contains(dependency.as_str()), "{} before {dependency}", resource.id);
                }
            }
            seen.extend(batch.resources.iter().map(|r| r.id.as_str()));
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_planning_twice_is_byte_identical() {
        let stack = diamond();
        let first = plan_of(&stack);
        let second = plan_of(&stack);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let reordered = Stack::builder("app")
            .resource(ResourceDeclaration::new("A", "t"))
            .resource(ResourceDeclaration::new("B", "t").property("A", Value::self_ref("A")))
            .resource(ResourceDeclaration::new("C", "t").property("A", Value::self_ref("A")))
            .resource(
                ResourceDeclaration::new("D", "t")
                    .property("B", Value::self_ref("B"))
                    .property("C", Value::self_ref("C")),
            )
            .build()
            .unwrap();
        assert_eq!(batch_ids(&plan_of(&reordered)), batch_ids(&plan_of(&diamond())));
    }

    #[test]
    fn test_deferred_dependency_is_in_plan() {
        let stack = Stack::builder("bastion")
            .resource(
                ResourceDeclaration::new("Subnet", "subnet")
                    .property("VpcId", Value::cross_stack("network", "/outputs/VpcId")),
            )
            .build()
            .unwrap();
        let mut registry = MemoryRegistry::new();
        registry.declare("network");
        let resolution = Resolver::new(&Parameters::new(), &registry).resolve(&stack);
        let plan = plan(&validate(resolution, &AnyAttribute).unwrap()).unwrap();

        let expected = CrossStackRef::new("network", "/outputs/VpcId");
        assert_eq!(plan.external(), &[expected.clone()]);
        assert_eq!(plan.batches()[0].resources[0].waits_on, vec![expected]);
        assert_eq!(plan.foreign_stacks().into_iter().collect::<Vec<_>>(), vec!["network"]);
    }

    #[test]
    fn test_layers_reports_unplaceable_nodes() {
        let graph = DependencyGraph::from_edges(
            "g",
            ["a", "b", "c"].map(String::from),
            [("a", "b"), ("b", "a"), ("c", "a")].map(|(x, y)| (x.to_string(), y.to_string())),
        );
        assert_eq!(layers(&graph), Err(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_wide_and_deep_graphs_layer_fully() {
        // One hub that 50 000 leaves depend on, then a 50 000 long chain
        let leaves: Vec<String> = (0..50_000).map(|i| format!("leaf{i:05}")).collect();
        let chain: Vec<String> = (0..50_000).map(|i| format!("link{i:05}")).collect();
        let mut edges: Vec<(String, String)> =
            leaves.iter().map(|leaf| ("hub".to_string(), leaf.clone())).collect();
        edges.extend(chain.windows(2).map(|pair| (pair[0].clone(), pair[1].clone())));
        let nodes = leaves
            .iter()
            .chain(&chain)
            .cloned()
            .chain(["hub".to_string()]);
        let graph = DependencyGraph::from_edges("big", nodes, edges);

        assert_eq!(graph.dependents_of("hub").count(), 50_000);
        assert_eq!(graph.dependents_of("link00000").collect::<Vec<_>>(), vec!["link00001"]);

        let layers = layers(&graph).unwrap();
        assert_eq!(layers.len(), 50_000);
        assert_eq!(layers[0], vec!["hub".to_string(), "link00000".to_string()]);
        assert_eq!(layers[1].len(), 50_001);
        assert_eq!(layers[1][0], "leaf00000");
        assert_eq!(layers[49_999], vec!["link49999".to_string()]);
    }

    #[test]
    fn test_empty_stack_has_empty_plan() {
        let plan = plan_of(&Stack::builder("empty").build().unwrap());
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }
}
