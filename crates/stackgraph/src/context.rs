//! Apply context and provider traits
//!
//! These traits allow the engine to be used without depending on a
//! specific provider, progress display or prompt.

use crate::types::{AppliedResource, ApplyResult};
use anyhow::Result;

/// Everything a provisioner needs to apply one resource
#[derive(Debug, Clone)]
pub struct ProvisionRequest<'a> {
    pub stack: &'a str,
    pub id: &'a str,
    pub type_tag: &'a str,
    /// Properties with every reference materialized
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// The resource's record from the previous apply, if any
    pub previous: Option<&'a AppliedResource>,
}

impl ProvisionRequest<'_> {
    /// Whether this request updates an existing resource
    pub fn is_update(&self) -> bool {
        self.previous.is_some()
    }
}

/// Applies resources against a real provider
///
/// Called from a thread pool; members of one batch run concurrently.
pub trait Provisioner: Send + Sync {
    /// Create or update a resource, returning its applied record
    ///
    /// The executor fills in type, properties and fingerprint of the
    /// returned record; the provisioner only has to supply the physical id
    /// and any attributes it knows.
    fn provision(&self, request: &ProvisionRequest<'_>) -> Result<AppliedResource>;

    /// Remove a resource that is no longer declared
    fn remove(&self, stack: &str, id: &str, applied: &AppliedResource) -> Result<()> {
        log::debug!("{stack}: nothing to do to remove '{id}' ({})", applied.physical_id);
        Ok(())
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when starting a batch
    fn on_batch_start(&mut self, index: usize, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, type_tag: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a batch completes
    fn on_batch_complete(&mut self, index: usize);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _index: usize, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _type_tag: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_batch_complete(&mut self, _index: usize) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
