use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackgraph::AppliedStack;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Applied state of every stack in a project
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProjectState {
    #[serde(default)]
    pub stacks: BTreeMap<String, StackRecord>,

    /// Last time the state was updated
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// The outcome of the last apply of one stack
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StackRecord {
    pub applied_at: DateTime<Utc>,

    /// Fingerprint of the plan that produced this state
    pub plan_fingerprint: String,

    pub applied: AppliedStack,
}

// ============================================================================
// State Store
// ============================================================================

/// The project state together with the file it lives in
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: ProjectState,
}

impl StateStore {
    /// Load state from disk, or start empty if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using empty state");
            return Ok(Self {
                path: path.to_path_buf(),
                state: ProjectState::default(),
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: ProjectState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state of {} stack(s) from {}", state.stacks.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// Save state to disk
    pub fn save(&mut self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.state.last_updated = Some(Utc::now());
        let content =
            serde_json::to_string_pretty(&self.state).context("Failed to serialize state")?;

        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the applied state of a stack
    pub fn record(&mut self, stack: &str, plan_fingerprint: String, applied: AppliedStack) {
        self.state.stacks.insert(
            stack.to_string(),
            StackRecord {
                applied_at: Utc::now(),
                plan_fingerprint,
                applied,
            },
        );
    }

    pub fn get(&self, stack: &str) -> Option<&StackRecord> {
        self.state.stacks.get(stack)
    }

    pub fn applied(&self, stack: &str) -> Option<&AppliedStack> {
        self.get(stack).map(|record| &record.applied)
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &StackRecord)> {
        self.state
            .stacks
            .iter()
            .map(|(name, record)| (name.as_str(), record))
    }
}

// ============================================================================
// Tests
// ============================================================================
