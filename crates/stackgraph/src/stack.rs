//! Stacks and resource declarations
//!
//! A [`Stack`] is built once and never mutated. Re-reading a declaration
//! produces a brand new stack; the derived [`ResolvedStack`] is recomputed
//! from it.

use crate::error::{Error, Finding, Result};
use crate::registry::parse_pointer;
use crate::value::{ResourcePointer, Resolved, Value};
use indexmap::IndexMap;
use serde::Serialize;

/// A single declared infrastructure unit
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDeclaration {
    id: String,
    type_tag: String,
    properties: IndexMap<String, Value>,
    depends_on: Vec<String>,
}

impl ResourceDeclaration {
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            properties: IndexMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// Add a property
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add an explicit ordering hint: `id` must exist before this resource
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

/// A named value exposed for other stacks
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub value: Value,
}

impl Output {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A named collection of resource declarations, settings and outputs
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    name: String,
    settings: IndexMap<String, Value>,
    resources: IndexMap<String, ResourceDeclaration>,
    outputs: IndexMap<String, Output>,
}

impl Stack {
    /// Build a stack, rejecting duplicate resource and output identifiers
    ///
    /// All duplicates are reported at once.
    pub fn new(
        name: impl Into<String>,
        settings: IndexMap<String, Value>,
        resources: Vec<ResourceDeclaration>,
        outputs: Vec<Output>,
    ) -> Result<Self> {
        let name = name.into();
        let mut findings = Vec::new();

        let mut by_id = IndexMap::with_capacity(resources.len());
        for resource in resources {
            if by_id.contains_key(resource.id()) {
                push_duplicate(&mut findings, &name, "resource", resource.id());
                continue;
            }
            by_id.insert(resource.id().to_string(), resource);
        }

        let mut by_name = IndexMap::with_capacity(outputs.len());
        for output in outputs {
            if by_name.contains_key(&output.name) {
                push_duplicate(&mut findings, &name, "output", &output.name);
                continue;
            }
            by_name.insert(output.name.clone(), output);
        }

        if !findings.is_empty() {
            return Err(Error::Validation {
                stack: name,
                findings,
            });
        }

        Ok(Self {
            name,
            settings,
            resources: by_id,
            outputs: by_name,
        })
    }

    pub fn builder(name: impl Into<String>) -> StackBuilder {
        StackBuilder {
            name: name.into(),
            settings: IndexMap::new(),
            resources: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &IndexMap<String, Value> {
        &self.settings
    }

    /// Resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceDeclaration> {
        self.resources.values()
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDeclaration> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// Outputs in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn push_duplicate(findings: &mut Vec<Finding>, stack: &str, kind: &str, id: &str) {
    let finding = Finding::DuplicateIdentifier {
        stack: stack.to_string(),
        kind: kind.to_string(),
        id: id.to_string(),
    };
    if !findings.contains(&finding) {
        findings.push(finding);
    }
}

/// Incremental construction of a [`Stack`]
pub struct StackBuilder {
    name: String,
    settings: IndexMap<String, Value>,
    resources: Vec<ResourceDeclaration>,
    outputs: Vec<Output>,
}

impl StackBuilder {
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn resource(mut self, resource: ResourceDeclaration) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.push(Output::new(name, value));
        self
    }

    pub fn build(self) -> Result<Stack> {
        Stack::new(self.name, self.settings, self.resources, self.outputs)
    }
}

/// A resource with every reference in its properties resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedResource {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub properties: IndexMap<String, Resolved>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// The annotated copy of a stack produced by resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStack {
    pub name: String,
    pub settings: IndexMap<String, Resolved>,
    pub resources: IndexMap<String, ResolvedResource>,
    pub outputs: IndexMap<String, Resolved>,
}

impl ResolvedStack {
    /// Look up a JSON pointer in this stack's document
    ///
    /// `/resources/<id>` and `/resources/<id>/attributes/<name>` address the
    /// resource itself and yield pointers, everything else yields the
    /// resolved value found at that location.
    pub fn lookup(&self, pointer: &str) -> Option<Resolved> {
        let segments = parse_pointer(pointer)?;
        match segments.split_first()? {
            (section, rest) if section == "outputs" => {
                let (name, path) = rest.split_first()?;
                self.outputs.get(name)?.get_path(path).cloned()
            }
            (section, rest) if section == "settings" => {
                let (key, path) = rest.split_first()?;
                self.settings.get(key)?.get_path(path).cloned()
            }
            (section, rest) if section == "resources" => {
                let (id, path) = rest.split_first()?;
                let resource = self.resources.get(id)?;
                match path {
                    [] => Some(self.pointer_to(id, None)),
                    [field] if field == "type" => Some(Resolved::String(resource.type_tag.clone())),
                    [field, attribute] if field == "attributes" => {
                        Some(self.pointer_to(id, Some(attribute.as_str())))
                    }
                    [field, key, path @ ..] if field == "properties" => {
                        resource.properties.get(key)?.get_path(path).cloned()
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn pointer_to(&self, id: &str, attribute: Option<&str>) -> Resolved {
        Resolved::Pointer {
            target: ResourcePointer {
                stack: self.name.clone(),
                resource: id.to_string(),
                attribute: attribute.map(str::to_string),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_identifiers_are_all_reported() {
        let err = Stack::builder("app")
            .resource(ResourceDeclaration::new("A", "t"))
            .resource(ResourceDeclaration::new("A", "t"))
            .resource(ResourceDeclaration::new("B", "t"))
            .resource(ResourceDeclaration::new("B", "t"))
            .output("X", Value::self_ref("A"))
            .output("X", Value::self_ref("B"))
            .build()
            .unwrap_err();

        let findings = err.findings();
        assert_eq!(findings.len(), 3);
        assert!(findings.contains(&Finding::DuplicateIdentifier {
            stack: "app".into(),
            kind: "output".into(),
            id: "X".into(),
        }));
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("Zeta", "t"))
            .resource(ResourceDeclaration::new("Alpha", "t"))
            .build()
            .unwrap();
        let ids: Vec<_> = stack.resources().map(ResourceDeclaration::id).collect();
        assert_eq!(ids, vec!["Zeta", "Alpha"]);
        assert!(stack.contains("Alpha"));
        assert_eq!(stack.len(), 2);
    }

    fn resolved_fixture() -> ResolvedStack {
        let mut properties = IndexMap::new();
        properties.insert(
            "CidrBlock".to_string(),
            Resolved::String("10.0.0.0/16".into()),
        );
        let mut resources = IndexMap::new();
        resources.insert(
            "Vpc".to_string(),
            ResolvedResource {
                id: "Vpc".into(),
                type_tag: "vpc".into(),
                properties,
                depends_on: Vec::new(),
            },
        );
        let mut outputs = IndexMap::new();
        outputs.insert("Region".to_string(), Resolved::String("eu-west-1".into()));
        ResolvedStack {
            name: "network".into(),
            settings: IndexMap::new(),
            resources,
            outputs,
        }
    }

    #[test]
    fn test_lookup_resource_property_is_literal() {
        let stack = resolved_fixture();
        assert_eq!(
            stack.lookup("/resources/Vpc/properties/CidrBlock"),
            Some(Resolved::String("10.0.0.0/16".into()))
        );
        assert_eq!(
            stack.lookup("/outputs/Region"),
            Some(Resolved::String("eu-west-1".into()))
        );
    }

    #[test]
    fn test_lookup_resource_yields_pointer() {
        let stack = resolved_fixture();
        let value = stack.lookup("/resources/Vpc/attributes/Arn").unwrap();
        assert!(!value.is_literal());
        assert_eq!(stack.lookup("/resources/Missing"), None);
        assert_eq!(stack.lookup("outputs/Region"), None);
    }
}
