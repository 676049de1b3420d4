//! Diff of a plan against the previously applied state

use crate::planner::{PlannedResource, ProvisioningPlan};
use crate::types::AppliedStack;
use crate::value::Resolved;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What applying a plan will do to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    NoChange,
    Remove,
}

/// The planned change of a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Unique identifier of the resource
    pub resource_id: String,
    /// Type of the resource
    pub resource_type: String,
    pub change: ChangeKind,
    /// Batch the resource is provisioned in; `None` for removals
    pub batch: Option<usize>,
}

impl ResourceDiff {
    pub fn is_change(&self) -> bool {
        self.change != ChangeKind::NoChange
    }
}

/// Fingerprint of a resource's type and resolved properties
///
/// Execution-time tokens hash by what they point at, so a resource whose
/// references are unchanged keeps its fingerprint.
pub fn resource_fingerprint(
    type_tag: &str,
    properties: &IndexMap<String, Resolved>,
) -> serde_json::Result<String> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, &(type_tag, properties))?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint of a planned resource, as recorded in applied state
pub fn property_fingerprint(resource: &PlannedResource) -> serde_json::Result<String> {
    resource_fingerprint(&resource.type_tag, &resource.properties)
}

/// Compute the diff of a plan against the previously applied state
///
/// Planned resources come first in execution order, followed by removals
/// sorted by id.
pub fn compute_diffs(
    plan: &ProvisioningPlan,
    previous: Option<&AppliedStack>,
) -> serde_json::Result<Vec<ResourceDiff>> {
    let mut diffs = Vec::with_capacity(plan.len());
    let mut planned = BTreeSet::new();

    for batch in plan.batches() {
        for resource in &batch.resources {
            planned.insert(resource.id.as_str());
            let change = match previous.and_then(|p| p.resources.get(&resource.id)) {
                None => ChangeKind::Create,
                Some(applied) if applied.fingerprint == property_fingerprint(resource)? => {
                    ChangeKind::NoChange
                }
                Some(_) => ChangeKind::Update,
            };
            diffs.push(ResourceDiff {
                resource_id: resource.id.clone(),
                resource_type: resource.type_tag.clone(),
                change,
                batch: Some(batch.index),
            });
        }
    }

    if let Some(previous) = previous {
        for (id, applied) in &previous.resources {
            if !planned.contains(id.as_str()) {
                diffs.push(ResourceDiff {
                    resource_id: id.clone(),
                    resource_type: applied.resource_type.clone(),
                    change: ChangeKind::Remove,
                    batch: None,
                });
            }
        }
    }

    Ok(diffs)
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub removals: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.change {
                ChangeKind::Create => summary.creates += 1,
                ChangeKind::Update => summary.updates += 1,
                ChangeKind::Remove => summary.removals += 1,
                ChangeKind::NoChange => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.removals
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type(diffs: &[ResourceDiff]) -> BTreeMap<&str, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<&str, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.resource_type.as_str()).or_default().push(diff);
    }
    groups
}
