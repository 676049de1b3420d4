//! The Declared → Resolved → Validated → Planned chain

use crate::error::Result;
use crate::planner::{ProvisioningPlan, plan};
use crate::registry::StackRegistry;
use crate::resolver::Resolver;
use crate::stack::Stack;
use crate::types::Parameters;
use crate::validate::{AttributeCatalog, validate};
use serde::Serialize;
use std::fmt;

/// Lifecycle stage of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Declared,
    Resolved,
    Validated,
    Planned,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Declared => "declared",
            Self::Resolved => "resolved",
            Self::Validated => "validated",
            Self::Planned => "planned",
        };
        f.write_str(name)
    }
}

/// Resolve, validate and plan a stack in one go
pub fn plan_stack<R, C>(
    stack: &Stack,
    params: &Parameters,
    registry: &R,
    catalog: &C,
) -> Result<ProvisioningPlan>
where
    R: StackRegistry + ?Sized,
    C: AttributeCatalog + ?Sized,
{
    log::debug!("{}: {}", stack.name(), Stage::Declared);

    let resolution = Resolver::new(params, registry).resolve(stack);
    log::debug!("{}: {}", stack.name(), Stage::Resolved);

    let validated = validate(resolution, catalog)?;
    log::debug!("{}: {}", stack.name(), Stage::Validated);

    let plan = plan(&validated)?;
    log::debug!("{}: {}", stack.name(), Stage::Planned);
    Ok(plan)
}
