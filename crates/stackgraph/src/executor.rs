//! Execution engine - applies a plan batch by batch
//!
//! Batches run strictly in order. Members of one batch are independent by
//! construction and are provisioned in parallel on a rayon pool. References
//! are materialized to plain JSON right before a resource is handed to the
//! [`Provisioner`], from what this run has applied so far, the previous
//! state and the sibling registry.

use crate::context::{ConfirmCallback, ProgressCallback, ProvisionRequest, Provisioner};
use crate::diff::{ChangeKind, DiffSummary, compute_diffs, property_fingerprint};
use crate::error::Error;
use crate::planner::{PlannedResource, ProvisioningPlan};
use crate::registry::{SiblingState, StackRegistry};
use crate::types::{
    AppliedResource, AppliedStack, ApplyResult, ExecuteOptions, ExecuteReport, ExecuteSummary,
};
use crate::value::{CrossStackRef, ResourcePointer, Resolved, Segment};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - The provisioning plan to run
/// * `registry` - Sibling stacks; every foreign stack the plan waits on must be applied
/// * `previous` - The stack's applied state from the last run, if any
/// * `opts` - Execution options (dry_run, jobs)
/// * `provisioner` - Applies single resources
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback, asked only when something changes
///
/// # Returns
/// Per-resource results and the stack's new applied state
pub fn execute<R, V, P, C>(
    plan: &ProvisioningPlan,
    registry: &R,
    previous: Option<&AppliedStack>,
    opts: &ExecuteOptions,
    provisioner: &V,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteReport>
where
    R: StackRegistry + ?Sized,
    V: Provisioner + ?Sized,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    for foreign in plan.foreign_stacks() {
        if !matches!(registry.state(foreign), Some(SiblingState::Applied(_))) {
            return Err(Error::ForeignStackNotApplied {
                stack: plan.stack().to_string(),
                foreign: foreign.to_string(),
            }
            .into());
        }
    }

    let diffs = compute_diffs(plan, previous).context("Failed to fingerprint planned resources")?;
    let planned = DiffSummary::from_diffs(&diffs);

    if planned.has_changes() {
        let prompt = format!(
            "Apply {} change(s) to stack '{}'?",
            planned.total(),
            plan.stack()
        );
        let skip_reason = if opts.dry_run {
            Some("dry run")
        } else if confirm.confirm(&prompt)? {
            None
        } else {
            Some("declined")
        };
        if let Some(reason) = skip_reason {
            log::info!("{}: not applying ({reason})", plan.stack());
            return Ok(skipped_report(&diffs, previous, reason));
        }
    }

    let changes: BTreeMap<&str, ChangeKind> = diffs
        .iter()
        .map(|d| (d.resource_id.as_str(), d.change))
        .collect();
    let previous_record =
        |id: &str| previous.and_then(|p| p.resources.get(id));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    let mut ledger: BTreeMap<String, AppliedResource> = BTreeMap::new();
    let mut results: Vec<(String, ApplyResult)> = Vec::with_capacity(diffs.len());
    let mut failed = false;

    for batch in plan.batches() {
        progress.on_batch_start(batch.index, batch.resources.len());

        if failed {
            for resource in &batch.resources {
                if let Some(record) = previous_record(&resource.id) {
                    ledger.insert(resource.id.clone(), record.clone());
                }
                let result = ApplyResult::Skipped {
                    reason: "an earlier batch failed".into(),
                };
                progress.on_resource_complete(&resource.id, &result);
                results.push((resource.id.clone(), result));
            }
            progress.on_batch_complete(batch.index);
            continue;
        }

        let mut work = Vec::new();
        for resource in &batch.resources {
            let change = changes
                .get(resource.id.as_str())
                .copied()
                .unwrap_or(ChangeKind::Create);
            progress.on_resource_start(&resource.id, &resource.type_tag);
            match (change, previous_record(&resource.id)) {
                (ChangeKind::NoChange, Some(record)) => {
                    ledger.insert(resource.id.clone(), record.clone());
                    progress.on_resource_complete(&resource.id, &ApplyResult::NoChange);
                    results.push((resource.id.clone(), ApplyResult::NoChange));
                }
                (_, record) => {
                    let materializer = Materializer {
                        stack: plan.stack(),
                        ledger: &ledger,
                        registry,
                    };
                    work.push((resource, record, materializer.properties(resource)));
                }
            }
        }

        let applied: Vec<(ApplyResult, Option<AppliedResource>)> = pool.install(|| {
            work.par_iter()
                .map(|(resource, record, properties)| {
                    apply_resource(plan.stack(), resource, *record, properties, provisioner)
                })
                .collect()
        });

        for ((resource, record, _), (result, applied)) in work.iter().zip(applied) {
            progress.on_resource_complete(&resource.id, &result);
            match (&result, applied) {
                (ApplyResult::Failed { error }, _) => {
                    log::warn!("{}: failed to apply '{}': {error}", plan.stack(), resource.id);
                    failed = true;
                    if let Some(record) = record {
                        ledger.insert(resource.id.clone(), (*record).clone());
                    }
                }
                (_, Some(applied)) => {
                    ledger.insert(resource.id.clone(), applied);
                }
                (_, None) => {}
            }
            results.push((resource.id.clone(), result));
        }

        progress.on_batch_complete(batch.index);
    }

    let removals: Vec<&str> = diffs
        .iter()
        .filter(|d| d.change == ChangeKind::Remove)
        .map(|d| d.resource_id.as_str())
        .collect();
    if !removals.is_empty() {
        let index = plan.batches().len();
        progress.on_batch_start(index, removals.len());
        for id in removals {
            let Some(record) = previous_record(id) else {
                continue;
            };
            let result = if failed {
                ApplyResult::Skipped {
                    reason: "an earlier batch failed".into(),
                }
            } else {
                progress.on_resource_start(id, &record.resource_type);
                match provisioner.remove(plan.stack(), id, record) {
                    Ok(()) => ApplyResult::Removed,
                    Err(e) => ApplyResult::Failed {
                        error: format!("{e:#}"),
                    },
                }
            };
            if result != ApplyResult::Removed {
                ledger.insert(id.to_string(), record.clone());
            }
            progress.on_resource_complete(id, &result);
            results.push((id.to_string(), result));
        }
        progress.on_batch_complete(index);
    }

    let materializer = Materializer {
        stack: plan.stack(),
        ledger: &ledger,
        registry,
    };
    let mut outputs = BTreeMap::new();
    for (name, value) in plan.outputs() {
        match materializer.value(value) {
            Ok(json) => {
                outputs.insert(name.clone(), json);
            }
            Err(e) => log::warn!("{}: output '{name}' has no value: {e}", plan.stack()),
        }
    }

    let mut summary = ExecuteSummary::default();
    for (_, result) in &results {
        summary.add_result(result);
    }
    log::info!(
        "{}: {} created, {} updated, {} removed, {} failed",
        plan.stack(),
        summary.created,
        summary.updated,
        summary.removed,
        summary.failed
    );

    Ok(ExecuteReport {
        summary,
        results,
        applied: AppliedStack {
            resources: ledger,
            outputs,
        },
    })
}

/// Report for a run that applied nothing
fn skipped_report(
    diffs: &[crate::diff::ResourceDiff],
    previous: Option<&AppliedStack>,
    reason: &str,
) -> ExecuteReport {
    let mut summary = ExecuteSummary::default();
    let results: Vec<(String, ApplyResult)> = diffs
        .iter()
        .map(|diff| {
            let result = if diff.is_change() {
                ApplyResult::Skipped {
                    reason: reason.to_string(),
                }
            } else {
                ApplyResult::NoChange
            };
            summary.add_result(&result);
            (diff.resource_id.clone(), result)
        })
        .collect();

    ExecuteReport {
        summary,
        results,
        applied: previous.cloned().unwrap_or_default(),
    }
}

/// Apply a single resource
fn apply_resource<V: Provisioner + ?Sized>(
    stack: &str,
    resource: &PlannedResource,
    previous: Option<&AppliedResource>,
    properties: &std::result::Result<serde_json::Map<String, serde_json::Value>, Error>,
    provisioner: &V,
) -> (ApplyResult, Option<AppliedResource>) {
    let properties = match properties {
        Ok(properties) => properties,
        Err(e) => {
            return (
                ApplyResult::Failed {
                    error: e.to_string(),
                },
                None,
            );
        }
    };

    let request = ProvisionRequest {
        stack,
        id: &resource.id,
        type_tag: &resource.type_tag,
        properties: properties.clone(),
        previous,
    };
    log::debug!("{stack}: provisioning '{}' ({})", resource.id, resource.type_tag);

    let fingerprint = match property_fingerprint(resource) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            return (
                ApplyResult::Failed {
                    error: format!("failed to fingerprint properties: {e}"),
                },
                None,
            );
        }
    };

    match provisioner.provision(&request) {
        Ok(mut record) => {
            record.resource_type.clone_from(&resource.type_tag);
            record.properties = request.properties;
            record.fingerprint = fingerprint;
            let result = if previous.is_some() {
                ApplyResult::Updated
            } else {
                ApplyResult::Created
            };
            (result, Some(record))
        }
        Err(e) => (
            ApplyResult::Failed {
                error: format!("{e:#}"),
            },
            None,
        ),
    }
}

/// Turns resolved values into plain JSON at execution time
struct Materializer<'a, R: StackRegistry + ?Sized> {
    stack: &'a str,
    ledger: &'a BTreeMap<String, AppliedResource>,
    registry: &'a R,
}

impl<R: StackRegistry + ?Sized> Materializer<'_, R> {
    fn properties(
        &self,
        resource: &PlannedResource,
    ) -> std::result::Result<serde_json::Map<String, serde_json::Value>, Error> {
        resource
            .properties
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.value(value)?)))
            .collect()
    }

    fn value(&self, value: &Resolved) -> std::result::Result<serde_json::Value, Error> {
        Ok(match value {
            Resolved::Null => serde_json::Value::Null,
            Resolved::Bool(b) => serde_json::Value::Bool(*b),
            Resolved::Integer(i) => serde_json::Value::from(*i),
            Resolved::Float(x) => serde_json::Value::from(*x),
            Resolved::String(s) => serde_json::Value::String(s.clone()),
            Resolved::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Resolved::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.value(v)?)))
                    .collect::<std::result::Result<_, Error>>()?,
            ),
            Resolved::Pointer { target } => self.pointer(target)?,
            Resolved::Deferred { reference } => self.foreign(reference)?,
            Resolved::Interpolated { segments } => {
                let mut text = String::new();
                for segment in segments {
                    let part = match segment {
                        Segment::Text(s) => {
                            text.push_str(s);
                            continue;
                        }
                        Segment::Pointer { target } => self.pointer(target)?,
                        Segment::Deferred { reference } => self.foreign(reference)?,
                    };
                    match part {
                        serde_json::Value::String(s) => text.push_str(&s),
                        other => text.push_str(&other.to_string()),
                    }
                }
                serde_json::Value::String(text)
            }
            Resolved::Unresolved { reference } => {
                return Err(Error::Unmaterialized {
                    stack: self.stack.to_string(),
                    target: reference.to_string(),
                });
            }
        })
    }

    fn pointer(&self, target: &ResourcePointer) -> std::result::Result<serde_json::Value, Error> {
        if target.stack != self.stack {
            let pointer = match &target.attribute {
                Some(attribute) => format!("/resources/{}/attributes/{attribute}", target.resource),
                None => format!("/resources/{}", target.resource),
            };
            return self.foreign(&CrossStackRef::new(target.stack.clone(), pointer));
        }

        let record = self
            .ledger
            .get(&target.resource)
            .ok_or_else(|| Error::Unmaterialized {
                stack: self.stack.to_string(),
                target: target.to_string(),
            })?;
        match &target.attribute {
            None => Ok(serde_json::Value::String(record.physical_id.clone())),
            Some(attribute) => {
                record
                    .attributes
                    .get(attribute)
                    .cloned()
                    .ok_or_else(|| Error::MissingAttribute {
                        stack: self.stack.to_string(),
                        resource: target.resource.clone(),
                        attribute: attribute.clone(),
                    })
            }
        }
    }

    fn foreign(&self, reference: &CrossStackRef) -> std::result::Result<serde_json::Value, Error> {
        match self.registry.state(&reference.stack) {
            Some(SiblingState::Applied(applied)) => {
                applied
                    .lookup(&reference.pointer)
                    .ok_or_else(|| Error::Unmaterialized {
                        stack: self.stack.to_string(),
                        target: reference.to_string(),
                    })
            }
            _ => Err(Error::ForeignStackNotApplied {
                stack: self.stack.to_string(),
                foreign: reference.stack.clone(),
            }),
        }
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple<R, V>(
    plan: &ProvisioningPlan,
    registry: &R,
    previous: Option<&AppliedStack>,
    provisioner: &V,
) -> Result<ExecuteReport>
where
    R: StackRegistry + ?Sized,
    V: Provisioner + ?Sized,
{
    use crate::context::{AutoConfirm, NoProgress};

    execute(
        plan,
        registry,
        previous,
        &ExecuteOptions::default(),
        provisioner,
        &mut NoProgress,
        &mut AutoConfirm,
    )
}
