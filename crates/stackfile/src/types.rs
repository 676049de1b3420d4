//! Document shapes for stack files

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::PathBuf;

/// A stack file as written on disk
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackDocument {
    /// Stack name; defaults to the file stem or its directory
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDocument>,
    #[serde(default)]
    pub outputs: IndexMap<String, serde_json::Value>,
}

/// One `[resources.<id>]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDocument {
    /// Type tag; an empty tag is reported by validation, not the loader
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub properties: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A stack file found by [`crate::discover`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSource {
    /// Name the stack will get if the file does not set one
    pub name: String,
    pub path: PathBuf,
}
