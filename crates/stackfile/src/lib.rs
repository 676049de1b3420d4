//! # Stackfile
//!
//! Load stack declarations from TOML or JSON files.
//!
//! ```toml
//! name = "network"
//!
//! [settings]
//! service = "akchak"
//! stage = "${param:stage, 'dev'}"
//!
//! [resources.Vpc]
//! type = "aws:ec2:vpc"
//! properties = { CidrBlock = "30.0.0.0/16" }
//!
//! [resources.DbSecurityGroup]
//! type = "aws:ec2:security-group"
//! [resources.DbSecurityGroup.properties]
//! GroupName = "${self:service}-${self:stage}-db"
//! VpcId = { "$ref" = "Vpc" }
//!
//! [outputs]
//! VpcId = { "$ref" = "Vpc" }
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! for source in stackfile::discover(Path::new("infra")) {
//!     let stack = stackfile::load(&source.path)?;
//!     println!("{}: {} resource(s)", stack.name(), stack.len());
//! }
//! # Ok::<(), stackfile::Error>(())
//! ```

mod decode;
mod error;
pub mod template;
mod types;

pub use decode::decode;
pub use error::{Error, Result};
pub use types::{ResourceDocument, StackDocument, StackSource};

use indexmap::IndexMap;
use stackgraph::{Output, ResourceDeclaration, Stack};
use std::path::Path;
use walkdir::WalkDir;

/// File names [`discover`] looks for
pub const STACK_FILE_NAMES: &[&str] = &["stack.toml", "stack.json"];

/// Stack file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Load a stack file
pub fn load(path: &Path) -> Result<Stack> {
    load_as(path, None)
}

/// Load a stack file, overriding the name it declares
pub fn load_as(path: &Path, name: Option<&str>) -> Result<Stack> {
    let format =
        Format::from_path(path).ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))?;
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("loading stack file {}", path.display());

    let mut document = parse_document(&text, format, path)?;
    if let Some(name) = name {
        document.name = Some(name.to_string());
    }
    build(document, path)
}

/// Parse stack file contents; `path` names the stack and errors
pub fn parse_str(text: &str, format: Format, path: &Path) -> Result<Stack> {
    build(parse_document(text, format, path)?, path)
}

fn parse_document(text: &str, format: Format, path: &Path) -> Result<StackDocument> {
    Ok(match format {
        Format::Toml => toml::from_str(text).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })?,
        Format::Json => serde_json::from_str(text).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?,
    })
}

/// Turn a parsed document into a stack
pub fn build(document: StackDocument, path: &Path) -> Result<Stack> {
    let name = document
        .name
        .clone()
        .unwrap_or_else(|| default_name(path));

    let settings = document
        .settings
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode(value, &format!("settings.{key}"))?)))
        .collect::<Result<IndexMap<_, _>>>()?;

    let mut resources = Vec::with_capacity(document.resources.len());
    for (id, resource) in &document.resources {
        let mut declaration = ResourceDeclaration::new(id.clone(), resource.type_tag.clone());
        for (key, value) in &resource.properties {
            let location = format!("resources.{id}.properties.{key}");
            declaration = declaration.property(key.clone(), decode(value, &location)?);
        }
        for dependency in &resource.depends_on {
            declaration = declaration.depends_on(dependency.clone());
        }
        resources.push(declaration);
    }

    let outputs = document
        .outputs
        .iter()
        .map(|(key, value)| Ok(Output::new(key.clone(), decode(value, &format!("outputs.{key}"))?)))
        .collect::<Result<Vec<_>>>()?;

    Stack::new(name, settings, resources, outputs).map_err(|source| Error::Stack {
        path: path.to_path_buf(),
        source,
    })
}

/// Stack name for a file that does not set one
///
/// `network.toml` is `network`; `network/stack.toml` is `network` too.
pub fn default_name(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str());
    match stem {
        Some("stack") | None => path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .unwrap_or("stack")
            .to_string(),
        Some(stem) => stem.to_string(),
    }
}

/// Find stack files under a directory, sorted by path
///
/// Hidden directories are skipped. Unreadable entries are logged and
/// ignored.
pub fn discover(root: &Path) -> Vec<StackSource> {
    let mut sources: Vec<StackSource> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("skipping unreadable entry under {}: {e}", root.display());
                None
            }
        })
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| STACK_FILE_NAMES.contains(&name))
        })
        .map(|entry| StackSource {
            name: default_name(entry.path()),
            path: entry.into_path(),
        })
        .collect();
    sources.sort_by(|a, b| a.path.cmp(&b.path));
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgraph::{Reference, Value};
    use std::fs;
    use tempfile::TempDir;

    const NETWORK: &str = r#"
[settings]
service = "akchak"
stage = "${param:stage, 'dev'}"

[resources.Vpc]
type = "aws:ec2:vpc"
properties = { CidrBlock = "30.0.0.0/16" }

[resources.DbSecurityGroup]
type = "aws:ec2:security-group"
depends_on = ["Vpc"]

[resources.DbSecurityGroup.properties]
GroupName = "${self:service}-${self:stage}-db"
VpcId = { "$ref" = "Vpc" }

[outputs]
VpcId = { "$ref" = "Vpc" }
"#;

    #[test]
    fn test_parse_toml_stack() {
        let stack = parse_str(NETWORK, Format::Toml, Path::new("infra/network/stack.toml")).unwrap();
        assert_eq!(stack.name(), "network");
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.settings().len(), 2);

        let sg = stack.resource("DbSecurityGroup").unwrap();
        assert_eq!(sg.type_tag(), "aws:ec2:security-group");
        assert_eq!(sg.dependencies(), ["Vpc".to_string()]);
        assert_eq!(sg.properties()["VpcId"], Value::self_ref("Vpc"));
        assert!(matches!(sg.properties()["GroupName"], Value::Template(_)));

        let output = stack.outputs().next().unwrap();
        assert_eq!(output.value, Value::self_ref("Vpc"));
    }

    #[test]
    fn test_parse_json_stack() {
        let text = r#"{
            "name": "bastion",
            "resources": {
                "Host": {
                    "type": "instance",
                    "properties": {
                        "VpcId": {"$stack": "network", "$pointer": "/outputs/VpcId"},
                        "Size": "${param:size}"
                    }
                }
            }
        }"#;
        let stack = parse_str(text, Format::Json, Path::new("bastion.json")).unwrap();
        assert_eq!(stack.name(), "bastion");
        let host = stack.resource("Host").unwrap();
        assert_eq!(
            host.properties()["VpcId"],
            Value::cross_stack("network", "/outputs/VpcId")
        );
        assert_eq!(
            host.properties()["Size"],
            Value::Ref(Reference::Param {
                name: "size".into(),
                default: None,
            })
        );
    }

    #[test]
    fn test_missing_type_loads_as_empty() {
        let stack = parse_str("[resources.A]\n", Format::Toml, Path::new("a.toml")).unwrap();
        assert_eq!(stack.resource("A").unwrap().type_tag(), "");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = parse_str("[resources.A]\ntpye = \"x\"\n", Format::Toml, Path::new("a.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::Toml { .. }));
    }

    #[test]
    fn test_load_and_discover() {
        let dir = TempDir::new().unwrap();
        let network = dir.path().join("network");
        let bastion = dir.path().join("bastion");
        let hidden = dir.path().join(".stackplan");
        fs::create_dir_all(&network).unwrap();
        fs::create_dir_all(&bastion).unwrap();
        fs::create_dir_all(&hidden).unwrap();
        fs::write(network.join("stack.toml"), NETWORK).unwrap();
        fs::write(bastion.join("stack.json"), r#"{"resources": {}}"#).unwrap();
        fs::write(hidden.join("stack.toml"), "").unwrap();
        fs::write(dir.path().join("notes.toml"), "").unwrap();

        let sources = discover(dir.path());
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["bastion", "network"]);

        let stack = load(&sources[1].path).unwrap();
        assert_eq!(stack.name(), "network");
        let renamed = load_as(&sources[1].path, Some("core")).unwrap();
        assert_eq!(renamed.name(), "core");
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load(&dir.path().join("stack.yaml")),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            load(&dir.path().join("missing.toml")),
            Err(Error::Io { .. })
        ));

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[resources.A]\ntype = \"t\"\nproperties = { P = \"${ref:}\" }\n").unwrap();
        assert!(matches!(load(&bad), Err(Error::InvalidTemplate { .. })));
    }

    #[test]
    fn test_default_name() {
        assert_eq!(default_name(Path::new("infra/network/stack.toml")), "network");
        assert_eq!(default_name(Path::new("bastion.json")), "bastion");
    }
}
