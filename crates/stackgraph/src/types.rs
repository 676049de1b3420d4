//! Core types for parameters, applied state and execution results

use crate::registry::parse_pointer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Externally supplied parameters, by name
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// The recorded state of one provisioned resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    /// Identity assigned by the provider
    pub physical_id: String,
    /// Type tag the resource was provisioned as
    #[serde(default)]
    pub resource_type: String,
    /// Properties as sent to the provider
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Attributes reported back by the provider
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Fingerprint of the resolved properties, used for diffing
    #[serde(default)]
    pub fingerprint: String,
}

impl AppliedResource {
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// The applied state of a stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedStack {
    #[serde(default)]
    pub resources: BTreeMap<String, AppliedResource>,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl AppliedStack {
    /// Look up a JSON pointer in the applied document
    ///
    /// `/resources/<id>` yields the physical id, `/resources/<id>/attributes/<a>`
    /// an attribute, `/resources/<id>/properties/...` a provisioned property
    /// and `/outputs/<name>/...` an output value.
    pub fn lookup(&self, pointer: &str) -> Option<serde_json::Value> {
        let segments = parse_pointer(pointer)?;
        match segments.as_slice() {
            [section, name, path @ ..] if section == "outputs" => {
                descend(self.outputs.get(name)?, path)
            }
            [section, id] if section == "resources" => Some(serde_json::Value::String(
                self.resources.get(id)?.physical_id.clone(),
            )),
            [section, id, field, key, path @ ..] if section == "resources" => {
                let resource = self.resources.get(id)?;
                let value = match field.as_str() {
                    "attributes" => resource.attributes.get(key)?,
                    "properties" => resource.properties.get(key)?,
                    _ => return None,
                };
                descend(value, path)
            }
            _ => None,
        }
    }
}

fn descend(value: &serde_json::Value, path: &[String]) -> Option<serde_json::Value> {
    let mut current = value;
    for segment in path {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was updated in place
    Updated,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Removed)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Updated => self.updated += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just report what would happen
    pub dry_run: bool,
    /// Number of resources of one batch provisioned in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}

/// Everything an execution produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecuteReport {
    pub summary: ExecuteSummary,
    /// Per-resource results in plan order, removals last
    pub results: Vec<(String, ApplyResult)>,
    /// The stack's applied state after this run
    pub applied: AppliedStack,
}
