//! Error types for resolution, validation and planning
//!
//! Problems a user can fix are [`Finding`]s. They are collected across a
//! whole stack and returned together inside [`Error::Validation`], so a
//! single pass surfaces as much as possible. Everything else in [`Error`]
//! is raised immediately.

use serde::Serialize;
use thiserror::Error;

/// A single problem found while resolving or validating a stack
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum Finding {
    /// A reference names something the stack does not declare
    #[error("{stack}: '{origin}' references '{target}', which does not exist")]
    UnresolvedReference {
        stack: String,
        origin: String,
        target: String,
    },

    /// A parameter was referenced but neither supplied nor defaulted
    #[error("{stack}: '{origin}' requires parameter '{name}', which was not supplied")]
    MissingParameter {
        stack: String,
        origin: String,
        name: String,
    },

    /// Resources depend on each other in a loop
    #[error("{stack}: dependency cycle {}", format_cycle(.cycle))]
    CyclicDependency { stack: String, cycle: Vec<String> },

    /// Settings reference each other in a loop
    #[error("{stack}: settings reference each other in a cycle {}", format_cycle(.cycle))]
    CyclicSetting { stack: String, cycle: Vec<String> },

    /// An identifier is declared more than once
    #[error("{stack}: {kind} '{id}' is declared more than once")]
    DuplicateIdentifier {
        stack: String,
        kind: String,
        id: String,
    },

    /// An output points at a missing resource or attribute
    #[error(
        "{stack}: output '{output}' references '{target}{}', which does not exist",
        .attribute.as_ref().map(|a| format!(".{a}")).unwrap_or_default()
    )]
    InvalidOutputReference {
        stack: String,
        output: String,
        target: String,
        attribute: Option<String>,
    },

    /// A resource has no type tag
    #[error("{stack}: resource '{resource}' has an empty type")]
    EmptyTypeTag { stack: String, resource: String },

    /// A cross-stack reference names a stack the registry does not know
    #[error("{stack}: '{origin}' references stack '{target}', which is not declared")]
    UnknownStack {
        stack: String,
        origin: String,
        target: String,
    },

    /// An attribute reference the resource type does not expose
    #[error("{stack}: '{origin}' references attribute '{attribute}' of '{resource}' ({type_tag}), which that type does not expose")]
    UnknownAttribute {
        stack: String,
        origin: String,
        resource: String,
        type_tag: String,
        attribute: String,
    },

    /// A structured value with execution-time parts used inside a string
    #[error("{stack}: '{origin}' interpolates '{reference}', which is a structured value with deferred parts")]
    InvalidInterpolation {
        stack: String,
        origin: String,
        reference: String,
    },
}

fn format_cycle(cycle: &[String]) -> String {
    let mut path = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

/// Errors returned by the resolution pipeline and the executor
#[derive(Debug, Error)]
pub enum Error {
    /// One or more findings; the stack cannot move to the next stage
    #[error("stack '{stack}' is invalid ({} finding(s))", .findings.len())]
    Validation { stack: String, findings: Vec<Finding> },

    /// The planner met nodes the checker should have rejected
    ///
    /// This is a bug in the checker, never a user error.
    #[error("internal invariant violated while planning '{stack}': nodes {remaining:?} could not be ordered although no cycle was reported")]
    InternalInvariantViolation {
        stack: String,
        remaining: Vec<String>,
    },

    /// A plan waits on a sibling stack that has not been applied
    #[error("stack '{stack}' depends on stack '{foreign}', which has not been applied yet")]
    ForeignStackNotApplied { stack: String, foreign: String },

    /// A pointer names an attribute the provisioner did not report
    #[error("stack '{stack}': resource '{resource}' did not report attribute '{attribute}'")]
    MissingAttribute {
        stack: String,
        resource: String,
        attribute: String,
    },

    /// A value could not be turned into a concrete value at execution time
    #[error("stack '{stack}': '{target}' has no value at execution time")]
    Unmaterialized { stack: String, target: String },
}

impl Error {
    /// Findings carried by a validation error (empty for other variants)
    pub fn findings(&self) -> &[Finding] {
        match self {
            Self::Validation { findings, .. } => findings,
            _ => &[],
        }
    }
}

/// Result type for stackgraph operations
pub type Result<T> = std::result::Result<T, Error>;
