//! Reference resolution
//!
//! Walks every setting, resource property and output of a [`Stack`] and
//! replaces references with literals or execution-time tokens. Resolution
//! never fails outright: problems become [`Finding`]s and the offending
//! value is left as [`Resolved::Unresolved`], so one pass reports
//! everything.

use crate::diff::resource_fingerprint;
use crate::error::{Error, Finding, Result};
use crate::registry::{SiblingState, StackRegistry};
use crate::stack::{ResolvedResource, ResolvedStack, Stack};
use crate::types::{AppliedStack, Parameters};
use crate::value::{
    CrossStackRef, Link, Reference, Resolved, ResourcePointer, Segment, Template, TemplatePart,
    Value,
};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// Output of [`Resolver::resolve`]
#[derive(Debug, Clone)]
pub struct Resolution {
    pub stack: ResolvedStack,
    pub findings: Vec<Finding>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// The resolved stack, or all findings as a validation error
    pub fn into_result(self) -> Result<ResolvedStack> {
        if self.findings.is_empty() {
            Ok(self.stack)
        } else {
            Err(Error::Validation {
                stack: self.stack.name,
                findings: self.findings,
            })
        }
    }
}

/// Resolves references against parameters and sibling stacks
pub struct Resolver<'a, R: StackRegistry + ?Sized> {
    params: &'a Parameters,
    registry: &'a R,
}

impl<'a, R: StackRegistry + ?Sized> Resolver<'a, R> {
    pub fn new(params: &'a Parameters, registry: &'a R) -> Self {
        Self { params, registry }
    }

    /// Resolve a stack into an annotated copy
    ///
    /// The input is left untouched, so the same stack can be resolved again
    /// after parameters change.
    pub fn resolve(&self, stack: &Stack) -> Resolution {
        let mut walk = Walk {
            stack,
            params: self.params,
            registry: self.registry,
            settings: HashMap::new(),
            visiting: Vec::new(),
            findings: Vec::new(),
        };

        let settings: IndexMap<String, Resolved> = stack
            .settings()
            .keys()
            .map(|key| {
                let value = walk.setting(key).unwrap_or(Resolved::Null);
                (key.clone(), value)
            })
            .collect();

        let mut resources = IndexMap::new();
        for resource in stack.resources() {
            let origin = Origin::Resource(resource.id().to_string());
            let properties = resource
                .properties()
                .iter()
                .map(|(key, value)| (key.clone(), walk.value(value, &origin)))
                .collect();
            resources.insert(
                resource.id().to_string(),
                ResolvedResource {
                    id: resource.id().to_string(),
                    type_tag: resource.type_tag().to_string(),
                    properties,
                    depends_on: resource.dependencies().to_vec(),
                },
            );
        }

        let mut outputs = IndexMap::new();
        for output in stack.outputs() {
            let origin = Origin::Output(output.name.clone());
            outputs.insert(output.name.clone(), walk.value(&output.value, &origin));
        }

        log::debug!(
            "resolved stack '{}': {} resource(s), {} output(s), {} finding(s)",
            stack.name(),
            resources.len(),
            outputs.len(),
            walk.findings.len()
        );

        Resolution {
            stack: ResolvedStack {
                name: stack.name().to_string(),
                settings,
                resources,
                outputs,
            },
            findings: walk.findings,
        }
    }

    /// Every cross-stack reference a stack makes, sorted and deduplicated
    ///
    /// Lets an orchestrator fetch or resolve siblings before resolving this
    /// stack, in parallel if it likes.
    pub fn cross_stack_refs(stack: &Stack) -> Vec<CrossStackRef> {
        let mut refs = BTreeSet::new();
        let mut collect = |reference: &Reference| {
            if let Reference::CrossStack(xref) = reference {
                refs.insert(xref.clone());
            }
        };
        for value in stack.settings().values() {
            value.for_each_reference(&mut collect);
        }
        for resource in stack.resources() {
            for value in resource.properties().values() {
                value.for_each_reference(&mut collect);
            }
        }
        for output in stack.outputs() {
            output.value.for_each_reference(&mut collect);
        }
        refs.into_iter().collect()
    }
}

/// Where a value being resolved lives, for error reporting
#[derive(Debug, Clone)]
enum Origin {
    Resource(String),
    Output(String),
    Setting(String),
}

impl Origin {
    fn label(&self) -> String {
        match self {
            Self::Resource(id) => id.clone(),
            Self::Output(name) => format!("outputs.{name}"),
            Self::Setting(key) => format!("settings.{key}"),
        }
    }
}

struct Walk<'a, R: StackRegistry + ?Sized> {
    stack: &'a Stack,
    params: &'a Parameters,
    registry: &'a R,
    /// Resolved top-level settings
    settings: HashMap<String, Resolved>,
    /// Settings currently being resolved, to detect cycles
    visiting: Vec<String>,
    findings: Vec<Finding>,
}

impl<R: StackRegistry + ?Sized> Walk<'_, R> {
    fn record(&mut self, finding: Finding) {
        if !self.findings.contains(&finding) {
            self.findings.push(finding);
        }
    }

    fn stack_name(&self) -> String {
        self.stack.name().to_string()
    }

    fn value(&mut self, value: &Value, origin: &Origin) -> Resolved {
        match value {
            Value::Null => Resolved::Null,
            Value::Bool(b) => Resolved::Bool(*b),
            Value::Integer(i) => Resolved::Integer(*i),
            Value::Float(x) => Resolved::Float(*x),
            Value::String(s) => Resolved::String(s.clone()),
            Value::List(items) => {
                Resolved::List(items.iter().map(|v| self.value(v, origin)).collect())
            }
            Value::Map(map) => Resolved::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.value(v, origin)))
                    .collect(),
            ),
            Value::Ref(reference) => self.reference(reference, origin),
            Value::Template(template) => self.template(template, origin),
        }
    }

    fn reference(&mut self, reference: &Reference, origin: &Origin) -> Resolved {
        match reference {
            Reference::SelfRef {
                resource,
                attribute,
            } => {
                if self.stack.contains(resource) {
                    return Resolved::Pointer {
                        target: ResourcePointer {
                            stack: self.stack_name(),
                            resource: resource.clone(),
                            attribute: attribute.clone(),
                        },
                    };
                }
                let finding = match origin {
                    Origin::Output(output) => Finding::InvalidOutputReference {
                        stack: self.stack_name(),
                        output: output.clone(),
                        target: resource.clone(),
                        attribute: attribute.clone(),
                    },
                    _ => Finding::UnresolvedReference {
                        stack: self.stack_name(),
                        origin: origin.label(),
                        target: resource.clone(),
                    },
                };
                self.record(finding);
                unresolved(reference)
            }
            Reference::Param { name, default } => {
                match self.params.get(name).or(default.as_ref()) {
                    Some(value) => Resolved::from_json(value),
                    None => {
                        self.record(Finding::MissingParameter {
                            stack: self.stack_name(),
                            origin: origin.label(),
                            name: name.clone(),
                        });
                        unresolved(reference)
                    }
                }
            }
            Reference::Setting { path } => self.setting_path(path, reference, origin),
            Reference::CrossStack(xref) => self.cross_stack(xref, reference, origin),
        }
    }

    fn setting_path(&mut self, path: &str, reference: &Reference, origin: &Origin) -> Resolved {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();

        let Some(root) = self.setting(head) else {
            self.record(Finding::UnresolvedReference {
                stack: self.stack_name(),
                origin: origin.label(),
                target: format!("setting:{path}"),
            });
            return unresolved(reference);
        };

        // Failures inside the setting were already reported against it
        if matches!(root, Resolved::Unresolved { .. }) {
            return unresolved(reference);
        }

        match root.get_path(&rest) {
            Some(value) => value.clone(),
            None => {
                self.record(Finding::UnresolvedReference {
                    stack: self.stack_name(),
                    origin: origin.label(),
                    target: format!("setting:{path}"),
                });
                unresolved(reference)
            }
        }
    }

    /// Resolve a top-level setting, memoized; `None` if it is not declared
    fn setting(&mut self, key: &str) -> Option<Resolved> {
        if let Some(value) = self.settings.get(key) {
            return Some(value.clone());
        }
        let stack = self.stack;
        let raw = stack.settings().get(key)?;

        if let Some(start) = self.visiting.iter().position(|k| k == key) {
            let cycle = rotate_to_smallest(self.visiting[start..].to_vec());
            self.record(Finding::CyclicSetting {
                stack: self.stack_name(),
                cycle,
            });
            return Some(unresolved(&Reference::Setting {
                path: key.to_string(),
            }));
        }

        self.visiting.push(key.to_string());
        let resolved = self.value(raw, &Origin::Setting(key.to_string()));
        self.visiting.pop();

        self.settings.insert(key.to_string(), resolved.clone());
        Some(resolved)
    }

    fn cross_stack(&mut self, xref: &CrossStackRef, reference: &Reference, origin: &Origin) -> Resolved {
        let missing_pointer = |walk: &mut Self| {
            walk.record(Finding::UnresolvedReference {
                stack: walk.stack_name(),
                origin: origin.label(),
                target: xref.to_string(),
            });
            unresolved(reference)
        };

        let registry = self.registry;
        match registry.state(&xref.stack) {
            None => {
                self.record(Finding::UnknownStack {
                    stack: self.stack_name(),
                    origin: origin.label(),
                    target: xref.stack.clone(),
                });
                unresolved(reference)
            }
            Some(SiblingState::Pending) => {
                log::debug!(
                    "{}: deferring {} until '{}' is resolved",
                    self.stack.name(),
                    xref,
                    xref.stack
                );
                deferred(xref)
            }
            Some(SiblingState::Resolved(foreign)) => match foreign.lookup(&xref.pointer) {
                Some(value) if value.is_literal() => value,
                Some(_) => {
                    log::debug!(
                        "{}: deferring {} until '{}' is applied",
                        self.stack.name(),
                        xref,
                        xref.stack
                    );
                    deferred(xref)
                }
                None => missing_pointer(self),
            },
            Some(SiblingState::Applied(applied)) => match applied.lookup(&xref.pointer) {
                Some(json) => Resolved::from_json(&json),
                None => missing_pointer(self),
            },
            Some(SiblingState::Redeclared { resolved, applied }) => {
                match resolved.lookup(&xref.pointer) {
                    None => missing_pointer(self),
                    Some(value) if value.is_literal() => value,
                    Some(value) => match applied.lookup(&xref.pointer) {
                        Some(json) if unchanged_since_apply(&value, resolved, applied) => {
                            Resolved::from_json(&json)
                        }
                        _ => {
                            log::debug!(
                                "{}: deferring {} until '{}' is applied again",
                                self.stack.name(),
                                xref,
                                xref.stack
                            );
                            deferred(xref)
                        }
                    },
                }
            }
        }
    }

    fn template(&mut self, template: &Template, origin: &Origin) -> Resolved {
        let mut segments: Vec<Segment> = Vec::new();
        let mut failed: Option<&Reference> = None;

        for part in &template.parts {
            let reference = match part {
                TemplatePart::Literal(text) => {
                    push_text(&mut segments, text);
                    continue;
                }
                TemplatePart::Ref(reference) => reference,
            };

            match self.reference(reference, origin) {
                Resolved::Pointer { target } => segments.push(Segment::Pointer { target }),
                Resolved::Deferred { reference } => segments.push(Segment::Deferred { reference }),
                Resolved::Interpolated { segments: inner } => {
                    for segment in inner {
                        match segment {
                            Segment::Text(text) => push_text(&mut segments, &text),
                            other => segments.push(other),
                        }
                    }
                }
                Resolved::Unresolved { .. } => {
                    failed.get_or_insert(reference);
                }
                literal => match literal.render() {
                    Some(text) => push_text(&mut segments, &text),
                    None => {
                        self.record(Finding::InvalidInterpolation {
                            stack: self.stack_name(),
                            origin: origin.label(),
                            reference: reference.to_string(),
                        });
                        failed.get_or_insert(reference);
                    }
                },
            }
        }

        if let Some(reference) = failed {
            return unresolved(reference);
        }

        match segments.as_slice() {
            [] => Resolved::String(String::new()),
            [Segment::Text(text)] => Resolved::String(text.clone()),
            _ => Resolved::Interpolated { segments },
        }
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Text(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// Whether every resource `value` points at is provisioned as declared
///
/// Only then does the applied state hold the value the declaration
/// describes. Values waiting on yet another stack never qualify.
fn unchanged_since_apply(value: &Resolved, resolved: &ResolvedStack, applied: &AppliedStack) -> bool {
    value.links().into_iter().all(|link| match link {
        Link::Pointer(target) => {
            let (Some(declared), Some(provisioned)) = (
                resolved.resources.get(&target.resource),
                applied.resources.get(&target.resource),
            ) else {
                return false;
            };
            resource_fingerprint(&declared.type_tag, &declared.properties)
                .is_ok_and(|fingerprint| fingerprint == provisioned.fingerprint)
        }
        Link::Deferred(_) | Link::Unresolved(_) => false,
    })
}

fn unresolved(reference: &Reference) -> Resolved {
    Resolved::Unresolved {
        reference: reference.clone(),
    }
}

fn deferred(xref: &CrossStackRef) -> Resolved {
    Resolved::Deferred {
        reference: xref.clone(),
    }
}

/// Rotate a cycle so it starts at its smallest identifier
pub(crate) fn rotate_to_smallest(mut cycle: Vec<String>) -> Vec<String> {
    if let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        cycle.rotate_left(start);
    }
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, NoSiblings};
    use crate::stack::ResourceDeclaration;
    use crate::types::AppliedResource;
    use serde_json::json;

    fn template(parts: Vec<TemplatePart>) -> Value {
        Value::Template(Template { parts })
    }

    fn setting(path: &str) -> Reference {
        Reference::Setting { path: path.into() }
    }

    #[test]
    fn test_self_ref_becomes_pointer() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("Vpc", "vpc"))
            .resource(
                ResourceDeclaration::new("Subnet", "subnet")
                    .property("VpcId", Value::attr_ref("Vpc", "Id")),
            )
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        assert!(resolution.is_clean());
        let subnet = &resolution.stack.resources["Subnet"];
        assert_eq!(
            subnet.properties["VpcId"],
            Resolved::Pointer {
                target: ResourcePointer {
                    stack: "app".into(),
                    resource: "Vpc".into(),
                    attribute: Some("Id".into()),
                }
            }
        );
    }

    #[test]
    fn test_missing_self_ref_is_reported_not_defaulted() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("Subnet", "subnet").property("VpcId", Value::self_ref("Vpc")))
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        assert_eq!(
            resolution.findings,
            vec![Finding::UnresolvedReference {
                stack: "app".into(),
                origin: "Subnet".into(),
                target: "Vpc".into(),
            }]
        );
        assert!(matches!(
            resolution.stack.resources["Subnet"].properties["VpcId"],
            Resolved::Unresolved { .. }
        ));
    }

    #[test]
    fn test_missing_parameter_names_exactly_that_parameter() {
        let stack = Stack::builder("app")
            .resource(
                ResourceDeclaration::new("Db", "db")
                    .property("User", Value::param("db_user"))
                    .property(
                        "Engine",
                        Value::Ref(Reference::Param {
                            name: "engine".into(),
                            default: Some(json!("mysql")),
                        }),
                    ),
            )
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        assert_eq!(
            resolution.findings,
            vec![Finding::MissingParameter {
                stack: "app".into(),
                origin: "Db".into(),
                name: "db_user".into(),
            }]
        );
        assert_eq!(
            resolution.stack.resources["Db"].properties["Engine"],
            Resolved::String("mysql".into())
        );
    }

    #[test]
    fn test_supplied_parameter_wins_over_default() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("Db", "db").property(
                "Engine",
                Value::Ref(Reference::Param {
                    name: "engine".into(),
                    default: Some(json!("mysql")),
                }),
            ))
            .build()
            .unwrap();
        let mut params = Parameters::new();
        params.insert("engine".into(), json!("postgres"));

        let resolution = Resolver::new(&params, &NoSiblings).resolve(&stack);
        assert_eq!(
            resolution.stack.resources["Db"].properties["Engine"],
            Resolved::String("postgres".into())
        );
    }

    #[test]
    fn test_template_with_settings_renders_string() {
        let stack = Stack::builder("app")
            .setting("service", "akchak")
            .setting("stage", Value::param("stage"))
            .resource(ResourceDeclaration::new("Sg", "sg").property(
                "GroupName",
                template(vec![
                    TemplatePart::Ref(setting("service")),
                    TemplatePart::Literal("-".into()),
                    TemplatePart::Ref(setting("stage")),
                    TemplatePart::Literal("-db".into()),
                ]),
            ))
            .build()
            .unwrap();
        let mut params = Parameters::new();
        params.insert("stage".into(), json!("dev"));

        let resolution = Resolver::new(&params, &NoSiblings).resolve(&stack);
        assert!(resolution.is_clean());
        assert_eq!(
            resolution.stack.resources["Sg"].properties["GroupName"],
            Resolved::String("akchak-dev-db".into())
        );
    }

    #[test]
    fn test_template_with_pointer_is_interpolated() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("Vpc", "vpc"))
            .resource(ResourceDeclaration::new("Sg", "sg").property(
                "Description",
                template(vec![
                    TemplatePart::Literal("in ".into()),
                    TemplatePart::Ref(Reference::SelfRef {
                        resource: "Vpc".into(),
                        attribute: None,
                    }),
                ]),
            ))
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        match &resolution.stack.resources["Sg"].properties["Description"] {
            Resolved::Interpolated { segments } => {
                assert_eq!(segments.len(), 2);
                assert_eq!(segments[0], Segment::Text("in ".into()));
            }
            other => panic!("expected interpolation, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_setting_path() {
        let mut provider = IndexMap::new();
        provider.insert("stage".to_string(), Value::from("prod"));
        let stack = Stack::builder("app")
            .setting("provider", Value::Map(provider))
            .resource(
                ResourceDeclaration::new("Db", "db")
                    .property("Stage", Value::Ref(setting("provider.stage")))
                    .property("Region", Value::Ref(setting("provider.region"))),
            )
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        assert_eq!(
            resolution.stack.resources["Db"].properties["Stage"],
            Resolved::String("prod".into())
        );
        assert_eq!(
            resolution.findings,
            vec![Finding::UnresolvedReference {
                stack: "app".into(),
                origin: "Db".into(),
                target: "setting:provider.region".into(),
            }]
        );
    }

    #[test]
    fn test_setting_cycle_is_reported_once() {
        let stack = Stack::builder("app")
            .setting("b", Value::Ref(setting("a")))
            .setting("a", Value::Ref(setting("b")))
            .resource(ResourceDeclaration::new("X", "t").property("P", Value::Ref(setting("a"))))
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        assert_eq!(
            resolution.findings,
            vec![Finding::CyclicSetting {
                stack: "app".into(),
                cycle: vec!["a".into(), "b".into()],
            }]
        );
    }

    #[test]
    fn test_output_to_missing_resource() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("A", "t"))
            .output("X", Value::self_ref("NonExistent"))
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        assert_eq!(
            resolution.findings,
            vec![Finding::InvalidOutputReference {
                stack: "app".into(),
                output: "X".into(),
                target: "NonExistent".into(),
                attribute: None,
            }]
        );
    }

    #[test]
    fn test_cross_stack_pending_is_deferred() {
        let stack = Stack::builder("bastion")
            .resource(
                ResourceDeclaration::new("Subnet", "subnet")
                    .property("VpcId", Value::cross_stack("network", "/outputs/VpcId")),
            )
            .build()
            .unwrap();
        let mut registry = MemoryRegistry::new();
        registry.declare("network");

        let resolution = Resolver::new(&Parameters::new(), &registry).resolve(&stack);
        assert!(resolution.is_clean());
        assert_eq!(
            resolution.stack.resources["Subnet"].properties["VpcId"],
            Resolved::Deferred {
                reference: CrossStackRef::new("network", "/outputs/VpcId"),
            }
        );
    }

    #[test]
    fn test_cross_stack_unknown_stack() {
        let stack = Stack::builder("bastion")
            .resource(
                ResourceDeclaration::new("Subnet", "subnet")
                    .property("VpcId", Value::cross_stack("network", "/outputs/VpcId")),
            )
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &NoSiblings).resolve(&stack);
        assert_eq!(
            resolution.findings,
            vec![Finding::UnknownStack {
                stack: "bastion".into(),
                origin: "Subnet".into(),
                target: "network".into(),
            }]
        );
    }

    #[test]
    fn test_cross_stack_resolved_literal_and_pointer() {
        let network = Stack::builder("network")
            .resource(ResourceDeclaration::new("Vpc", "vpc").property("CidrBlock", "30.0.0.0/16"))
            .output("VpcId", Value::self_ref("Vpc"))
            .build()
            .unwrap();
        let network = Resolver::new(&Parameters::new(), &NoSiblings)
            .resolve(&network)
            .stack;
        let mut registry = MemoryRegistry::new();
        registry.insert_resolved(network);

        let stack = Stack::builder("bastion")
            .resource(
                ResourceDeclaration::new("Subnet", "subnet")
                    .property(
                        "Cidr",
                        Value::cross_stack("network", "/resources/Vpc/properties/CidrBlock"),
                    )
                    .property("VpcId", Value::cross_stack("network", "/outputs/VpcId"))
                    .property("Missing", Value::cross_stack("network", "/outputs/Nope")),
            )
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &registry).resolve(&stack);
        let subnet = &resolution.stack.resources["Subnet"];
        assert_eq!(subnet.properties["Cidr"], Resolved::String("30.0.0.0/16".into()));
        assert!(matches!(subnet.properties["VpcId"], Resolved::Deferred { .. }));
        assert_eq!(
            resolution.findings,
            vec![Finding::UnresolvedReference {
                stack: "bastion".into(),
                origin: "Subnet".into(),
                target: "network#/outputs/Nope".into(),
            }]
        );
    }

    #[test]
    fn test_cross_stack_applied_is_literal() {
        let mut applied = AppliedStack::default();
        applied
            .resources
            .insert("DbSg".into(), AppliedResource::new("sg-42"));
        let mut registry = MemoryRegistry::new();
        registry.insert_applied("network", applied);

        let stack = Stack::builder("bastion")
            .resource(
                ResourceDeclaration::new("AllowSsh", "ingress")
                    .property("GroupId", Value::cross_stack("network", "/resources/DbSg")),
            )
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &registry).resolve(&stack);
        assert_eq!(
            resolution.stack.resources["AllowSsh"].properties["GroupId"],
            Resolved::String("sg-42".into())
        );
    }

    #[test]
    fn test_cross_stack_redeclared_prefers_current_declaration() {
        let network = Stack::builder("network")
            .resource(ResourceDeclaration::new("Vpc", "vpc").property("CidrBlock", "10.0.0.0/16"))
            .output("VpcId", Value::self_ref("Vpc"))
            .output("Cidr", Value::attr_ref("Vpc", "CidrBlock"))
            .output("Name", "net-v2")
            .build()
            .unwrap();
        let network = Resolver::new(&Parameters::new(), &NoSiblings)
            .resolve(&network)
            .stack;
        let vpc = &network.resources["Vpc"];
        let fingerprint = resource_fingerprint(&vpc.type_tag, &vpc.properties).unwrap();

        // Applied before the Cidr output existed and while Name was different
        let mut record = AppliedResource::new("vpc-1")
            .with_attribute("CidrBlock", json!("10.0.0.0/16"));
        record.fingerprint = fingerprint;
        let mut applied = AppliedStack::default();
        applied.resources.insert("Vpc".into(), record);
        applied.outputs.insert("VpcId".into(), json!("vpc-1"));
        applied.outputs.insert("Name".into(), json!("net-v1"));

        let mut registry = MemoryRegistry::new();
        registry.insert_applied("network", applied.clone());
        registry.insert_resolved(network.clone());

        let stack = Stack::builder("database")
            .resource(
                ResourceDeclaration::new("Db", "db")
                    .property("VpcId", Value::cross_stack("network", "/outputs/VpcId"))
                    .property("Cidr", Value::cross_stack("network", "/outputs/Cidr"))
                    .property("Network", Value::cross_stack("network", "/outputs/Name"))
                    .property("Missing", Value::cross_stack("network", "/outputs/Nope")),
            )
            .build()
            .unwrap();

        let resolution = Resolver::new(&Parameters::new(), &registry).resolve(&stack);
        let db = &resolution.stack.resources["Db"];
        assert_eq!(db.properties["VpcId"], Resolved::String("vpc-1".into()));
        assert!(matches!(db.properties["Cidr"], Resolved::Deferred { .. }));
        assert_eq!(db.properties["Network"], Resolved::String("net-v2".into()));
        assert_eq!(
            resolution.findings,
            vec![Finding::UnresolvedReference {
                stack: "database".into(),
                origin: "Db".into(),
                target: "network#/outputs/Nope".into(),
            }]
        );

        // A Vpc provisioned from other properties no longer vouches for its id
        let mut drifted = applied;
        drifted.resources.get_mut("Vpc").unwrap().fingerprint = "stale".into();
        let mut registry = MemoryRegistry::new();
        registry.insert_applied("network", drifted);
        registry.insert_resolved(network);

        let resolution = Resolver::new(&Parameters::new(), &registry).resolve(&stack);
        let db = &resolution.stack.resources["Db"];
        assert!(matches!(db.properties["VpcId"], Resolved::Deferred { .. }));
    }

    #[test]
    fn test_resolution_leaves_stack_untouched_and_is_repeatable() {
        let stack = Stack::builder("app")
            .resource(ResourceDeclaration::new("A", "t").property("Size", Value::param("size")))
            .build()
            .unwrap();
        let before = stack.clone();

        let mut small = Parameters::new();
        small.insert("size".into(), json!(1));
        let mut large = Parameters::new();
        large.insert("size".into(), json!(8));

        let first = Resolver::new(&small, &NoSiblings).resolve(&stack);
        let second = Resolver::new(&large, &NoSiblings).resolve(&stack);
        assert_eq!(stack, before);
        assert_eq!(first.stack.resources["A"].properties["Size"], Resolved::Integer(1));
        assert_eq!(second.stack.resources["A"].properties["Size"], Resolved::Integer(8));
    }

    #[test]
    fn test_cross_stack_refs_are_sorted_and_unique() {
        let stack = Stack::builder("app")
            .resource(
                ResourceDeclaration::new("A", "t")
                    .property("X", Value::cross_stack("zeta", "/outputs/X"))
                    .property("Y", Value::cross_stack("alpha", "/outputs/Y")),
            )
            .output("Z", Value::cross_stack("zeta", "/outputs/X"))
            .build()
            .unwrap();

        let refs = Resolver::<NoSiblings>::cross_stack_refs(&stack);
        assert_eq!(
            refs,
            vec![
                CrossStackRef::new("alpha", "/outputs/Y"),
                CrossStackRef::new("zeta", "/outputs/X"),
            ]
        );
    }

    #[test]
    fn test_rotate_to_smallest() {
        let cycle = vec!["C".to_string(), "A".to_string(), "B".to_string()];
        assert_eq!(rotate_to_smallest(cycle), vec!["A", "B", "C"]);
    }
}
