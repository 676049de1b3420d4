//! Property values, typed references and their resolved forms

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A property value as declared in a stack
///
/// Literals mirror JSON. `Ref` and `Template` carry the placeholders the
/// resolver replaces.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// A bare reference standing for the whole value
    Ref(Reference),
    /// A string with embedded references
    Template(Template),
}

impl Value {
    /// Reference to another resource of the same stack
    pub fn self_ref(resource: impl Into<String>) -> Self {
        Self::Ref(Reference::SelfRef {
            resource: resource.into(),
            attribute: None,
        })
    }

    /// Reference to a named attribute of another resource of the same stack
    pub fn attr_ref(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Ref(Reference::SelfRef {
            resource: resource.into(),
            attribute: Some(attribute.into()),
        })
    }

    /// Reference to an external parameter without a default
    pub fn param(name: impl Into<String>) -> Self {
        Self::Ref(Reference::Param {
            name: name.into(),
            default: None,
        })
    }

    /// Reference to a value owned by a sibling stack
    pub fn cross_stack(stack: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self::Ref(Reference::CrossStack(CrossStackRef::new(stack, pointer)))
    }

    /// Visit every reference contained in this value, depth first
    pub fn for_each_reference<'a>(&'a self, f: &mut impl FnMut(&'a Reference)) {
        match self {
            Self::Ref(reference) => f(reference),
            Self::Template(template) => {
                for part in &template.parts {
                    if let TemplatePart::Ref(reference) = part {
                        f(reference);
                    }
                }
            }
            Self::List(items) => items.iter().for_each(|v| v.for_each_reference(f)),
            Self::Map(map) => map.values().for_each(|v| v.for_each_reference(f)),
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Float(_) | Self::String(_) => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        Self::Ref(reference)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

/// Literal JSON is taken verbatim; no placeholder interpretation happens here.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// A string with embedded placeholders, e.g. `"${self:service}-${param:stage}-db"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Ref(Reference),
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => write!(f, "{}", text.replace("${", "$${"))?,
                TemplatePart::Ref(reference) => write!(f, "${{{reference}}}")?,
            }
        }
        Ok(())
    }
}

/// A typed pointer to another value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reference {
    /// Another resource of the same stack, or one of its attributes
    SelfRef {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
    },
    /// An externally supplied parameter
    Param {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<serde_json::Value>,
    },
    /// A dotted path into the stack's own settings
    Setting { path: String },
    /// A value owned by another stack
    CrossStack(CrossStackRef),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfRef {
                resource,
                attribute: None,
            } => write!(f, "ref:{resource}"),
            Self::SelfRef {
                resource,
                attribute: Some(attribute),
            } => write!(f, "ref:{resource}.{attribute}"),
            Self::Param {
                name,
                default: None,
            } => write!(f, "param:{name}"),
            Self::Param {
                name,
                default: Some(serde_json::Value::String(s)),
            } => write!(f, "param:{name}, '{s}'"),
            Self::Param {
                name,
                default: Some(other),
            } => write!(f, "param:{name}, {other}"),
            Self::Setting { path } => write!(f, "self:{path}"),
            Self::CrossStack(xref) => write!(f, "stack:{}:{}", xref.stack, xref.pointer),
        }
    }
}

/// A reference into a sibling stack, addressed by an RFC 6901 JSON pointer
///
/// Pointers address the stack document: `/outputs/<name>`,
/// `/resources/<id>`, `/resources/<id>/properties/...`,
/// `/resources/<id>/attributes/<name>` and `/settings/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrossStackRef {
    pub stack: String,
    pub pointer: String,
}

impl CrossStackRef {
    pub fn new(stack: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            pointer: pointer.into(),
        }
    }
}

impl fmt::Display for CrossStackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stack, self.pointer)
    }
}

/// The eventual physical identity (or attribute) of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePointer {
    pub stack: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl fmt::Display for ResourcePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attribute) => write!(f, "{}.{}.{}", self.stack, self.resource, attribute),
            None => write!(f, "{}.{}", self.stack, self.resource),
        }
    }
}

/// A property value after reference resolution
///
/// Serializes to plain JSON for literals; execution-time tokens become
/// single-key objects (`$pointer`, `$deferred`, `$join`, `$unresolved`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolved {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Resolved>),
    Map(IndexMap<String, Resolved>),
    /// Materialized only at execution time
    Pointer {
        #[serde(rename = "$pointer")]
        target: ResourcePointer,
    },
    /// Waiting for a foreign stack to be applied
    Deferred {
        #[serde(rename = "$deferred")]
        reference: CrossStackRef,
    },
    /// A template with at least one execution-time segment
    Interpolated {
        #[serde(rename = "$join")]
        segments: Vec<Segment>,
    },
    /// Left in place of a reference that failed to resolve
    Unresolved {
        #[serde(rename = "$unresolved")]
        reference: Reference,
    },
}

/// One piece of an interpolated string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Segment {
    Text(String),
    Pointer {
        #[serde(rename = "$pointer")]
        target: ResourcePointer,
    },
    Deferred {
        #[serde(rename = "$deferred")]
        reference: CrossStackRef,
    },
}

/// An execution-time dependency found inside a resolved value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link<'a> {
    Pointer(&'a ResourcePointer),
    Deferred(&'a CrossStackRef),
    Unresolved(&'a Reference),
}

impl Resolved {
    /// Convert a literal JSON value
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON if this value is a pure literal
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Null => Some(serde_json::Value::Null),
            Self::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Self::Integer(i) => Some(serde_json::Value::from(*i)),
            Self::Float(x) => Some(serde_json::Value::from(*x)),
            Self::String(s) => Some(serde_json::Value::String(s.clone())),
            Self::List(items) => items
                .iter()
                .map(Self::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            Self::Pointer { .. }
            | Self::Deferred { .. }
            | Self::Interpolated { .. }
            | Self::Unresolved { .. } => None,
        }
    }

    /// Whether the value is fully known before execution
    pub fn is_literal(&self) -> bool {
        self.links().is_empty()
    }

    /// Every execution-time dependency inside this value, in document order
    pub fn links(&self) -> Vec<Link<'_>> {
        let mut links = Vec::new();
        self.collect_links(&mut links);
        links
    }

    fn collect_links<'a>(&'a self, links: &mut Vec<Link<'a>>) {
        match self {
            Self::Pointer { target } => links.push(Link::Pointer(target)),
            Self::Deferred { reference } => links.push(Link::Deferred(reference)),
            Self::Unresolved { reference } => links.push(Link::Unresolved(reference)),
            Self::Interpolated { segments } => {
                for segment in segments {
                    match segment {
                        Segment::Pointer { target } => links.push(Link::Pointer(target)),
                        Segment::Deferred { reference } => links.push(Link::Deferred(reference)),
                        Segment::Text(_) => {}
                    }
                }
            }
            Self::List(items) => items.iter().for_each(|v| v.collect_links(links)),
            Self::Map(map) => map.values().for_each(|v| v.collect_links(links)),
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Float(_) | Self::String(_) => {}
        }
    }

    /// Navigate into nested maps (by key) and lists (by index)
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Self> {
        let mut current = self;
        for segment in path {
            let segment = segment.as_ref();
            current = match current {
                Self::Map(map) => map.get(segment)?,
                Self::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Render a literal for string interpolation
    ///
    /// Strings are inserted verbatim, other literals use their JSON form.
    pub fn render(&self) -> Option<String> {
        match self.to_json()? {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_round_trip_through_json() {
        let json = serde_json::json!({"a": [1, 2.5, "x", null, true]});
        let resolved = Resolved::from_json(&json);
        assert!(resolved.is_literal());
        assert_eq!(resolved.to_json(), Some(json));
    }

    #[test]
    fn test_pointer_is_not_literal() {
        let value = Resolved::List(vec![
            Resolved::String("x".into()),
            Resolved::Pointer {
                target: ResourcePointer {
                    stack: "s".into(),
                    resource: "Vpc".into(),
                    attribute: None,
                },
            },
        ]);
        assert!(!value.is_literal());
        assert_eq!(value.to_json(), None);
        assert_eq!(value.links().len(), 1);
    }

    #[test]
    fn test_tokens_serialize_as_marked_objects() {
        let value = Resolved::Deferred {
            reference: CrossStackRef::new("network", "/outputs/VpcId"),
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"$deferred": {"stack": "network", "pointer": "/outputs/VpcId"}})
        );
    }

    #[test]
    fn test_get_path_walks_maps_and_lists() {
        let value = Resolved::from_json(&serde_json::json!({"provider": {"zones": ["a", "b"]}}));
        assert_eq!(
            value.get_path(&["provider", "zones", "1"]),
            Some(&Resolved::String("b".into()))
        );
        assert_eq!(value.get_path(&["provider", "missing"]), None);
    }

    #[test]
    fn test_reference_display_matches_placeholder_syntax() {
        let reference = Reference::Param {
            name: "stage".into(),
            default: Some(serde_json::json!("dev")),
        };
        assert_eq!(reference.to_string(), "param:stage, 'dev'");
        let template = Template {
            parts: vec![
                TemplatePart::Ref(Reference::Setting {
                    path: "service".into(),
                }),
                TemplatePart::Literal("-db".into()),
            ],
        };
        assert_eq!(template.to_string(), "${self:service}-db");
    }

    #[test]
    fn test_for_each_reference_visits_nested_values() {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), Value::self_ref("Vpc"));
        map.insert(
            "b".to_string(),
            Value::List(vec![Value::param("stage"), Value::from("x")]),
        );
        let value = Value::Map(map);
        let mut seen = Vec::new();
        value.for_each_reference(&mut |r| seen.push(r.to_string()));
        assert_eq!(seen, vec!["ref:Vpc", "param:stage"]);
    }
}
