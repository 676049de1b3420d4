//! # Stackgraph
//!
//! Resolution, validation and planning for declarative resource graphs.
//!
//! A [`Stack`] is a named set of resource declarations whose properties may
//! point at other resources, at externally supplied parameters, at the
//! stack's own settings or at values owned by sibling stacks. This crate
//! turns such a stack into an ordered [`ProvisioningPlan`] without knowing
//! anything about the provider that will eventually apply it.
//!
//! ## Lifecycle
//!
//! ```text
//! Stack ──resolve──▶ ResolvedStack ──validate──▶ ValidatedStack ──plan──▶ ProvisioningPlan
//! (Declared)         (Resolved)                  (Validated)              (Planned)
//! ```
//!
//! Every step is a pure transform producing a new immutable value. A failed
//! step leaves the previous value untouched, so the caller can fix the input
//! and try again.
//!
//! ## Example
//!
//! ```
//! use stackgraph::{
//!     AnyAttribute, NoSiblings, Parameters, ResourceDeclaration, Stack, Value, plan_stack,
//! };
//!
//! let stack = Stack::builder("network")
//!     .resource(ResourceDeclaration::new("Vpc", "vpc").property("CidrBlock", "10.0.0.0/16"))
//!     .resource(
//!         ResourceDeclaration::new("Subnet", "subnet").property("VpcId", Value::self_ref("Vpc")),
//!     )
//!     .build()?;
//!
//! let plan = plan_stack(&stack, &Parameters::new(), &NoSiblings, &AnyAttribute)?;
//! assert_eq!(plan.batches().len(), 2);
//! # Ok::<(), stackgraph::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`StackRegistry`]: answers questions about sibling stacks
//! - [`AttributeCatalog`]: knows which attributes a resource type exposes
//! - [`Provisioner`]: applies a single resource against a real provider
//! - [`ProgressCallback`] / [`ConfirmCallback`]: user interaction during apply

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod planner;
pub mod registry;
pub mod resolver;
pub mod stack;
pub mod types;
pub mod validate;
pub mod value;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, ProvisionRequest,
    Provisioner,
};
pub use diff::{
    ChangeKind, DiffSummary, ResourceDiff, compute_diffs, group_by_type, property_fingerprint,
    resource_fingerprint,
};
pub use error::{Error, Finding, Result};
pub use executor::{execute, execute_simple};
pub use graph::DependencyGraph;
pub use pipeline::{Stage, plan_stack};
pub use planner::{Batch, PlannedResource, ProvisioningPlan, layers, plan};
pub use registry::{MemoryRegistry, NoSiblings, SiblingState, StackRegistry, parse_pointer};
pub use resolver::{Resolution, Resolver};
pub use stack::{
    Output, ResolvedResource, ResolvedStack, ResourceDeclaration, Stack, StackBuilder,
};
pub use types::{
    AppliedResource, AppliedStack, ApplyResult, ExecuteOptions, ExecuteReport, ExecuteSummary,
    Parameters,
};
pub use validate::{AnyAttribute, AttributeCatalog, TypeCatalog, ValidatedStack, find_cycles, validate};
pub use value::{CrossStackRef, Reference, Resolved, ResourcePointer, Segment, Template, TemplatePart, Value};
