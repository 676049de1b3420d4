//! Sibling-stack registry
//!
//! Cross-stack references are answered by a [`StackRegistry`]. The host
//! decides where the answers come from (a state file, a remote backend, an
//! in-memory map); the resolver only needs to know how far along each
//! sibling is.

use crate::stack::ResolvedStack;
use crate::types::AppliedStack;
use std::collections::BTreeMap;

/// How far a sibling stack has progressed
#[derive(Debug, Clone, Copy)]
pub enum SiblingState<'a> {
    /// Declared but not resolved yet
    Pending,
    /// Resolved, not applied; physical identities are unknown
    Resolved(&'a ResolvedStack),
    /// Applied with known outputs and resource identities
    Applied(&'a AppliedStack),
    /// Applied earlier and resolved again since
    ///
    /// The resolution describes the current declaration, the applied state
    /// what was provisioned from an earlier one.
    Redeclared {
        resolved: &'a ResolvedStack,
        applied: &'a AppliedStack,
    },
}

/// Lookup of sibling stacks by name
///
/// `Sync` so an orchestrator may resolve independent stacks in parallel
/// against the same registry.
pub trait StackRegistry: Sync {
    /// State of a sibling stack, `None` if the stack is not declared at all
    fn state(&self, stack: &str) -> Option<SiblingState<'_>>;
}

/// Registry without siblings; every cross-stack reference is unknown
pub struct NoSiblings;

impl StackRegistry for NoSiblings {
    fn state(&self, _stack: &str) -> Option<SiblingState<'_>> {
        None
    }
}

#[derive(Debug, Clone, Default)]
struct Entry {
    resolved: Option<Box<ResolvedStack>>,
    applied: Option<AppliedStack>,
}

/// In-memory registry
///
/// A stack keeps its applied state and its latest resolution side by side.
/// Applying a stack again replaces both, since the new applied state is
/// the current declaration.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    entries: BTreeMap<String, Entry>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stack without any state yet
    pub fn declare(&mut self, name: impl Into<String>) {
        self.entries.entry(name.into()).or_default();
    }

    /// Record the resolved form of a stack next to its applied state
    pub fn insert_resolved(&mut self, stack: ResolvedStack) {
        let entry = self.entries.entry(stack.name.clone()).or_default();
        if entry.applied.is_some() {
            log::debug!("'{}' is applied, keeping its resolution alongside", stack.name);
        }
        entry.resolved = Some(Box::new(stack));
    }

    /// Record the applied state of a stack, superseding its resolution
    pub fn insert_applied(&mut self, name: impl Into<String>, applied: AppliedStack) {
        self.entries.insert(
            name.into(),
            Entry {
                resolved: None,
                applied: Some(applied),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn applied(&self, name: &str) -> Option<&AppliedStack> {
        self.entries.get(name)?.applied.as_ref()
    }

    /// Names of all declared stacks, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl StackRegistry for MemoryRegistry {
    fn state(&self, stack: &str) -> Option<SiblingState<'_>> {
        let entry = self.entries.get(stack)?;
        Some(match (entry.resolved.as_deref(), entry.applied.as_ref()) {
            (None, None) => SiblingState::Pending,
            (Some(resolved), None) => SiblingState::Resolved(resolved),
            (None, Some(applied)) => SiblingState::Applied(applied),
            (Some(resolved), Some(applied)) => SiblingState::Redeclared { resolved, applied },
        })
    }
}

/// Split an RFC 6901 JSON pointer into unescaped segments
///
/// The empty pointer addresses the whole document. Anything not starting
/// with `/` is rejected.
pub fn parse_pointer(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(
        rest.split('/')
            .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
            .collect(),
    )
}
