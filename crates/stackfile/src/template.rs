//! `${...}` placeholders inside strings
//!
//! ```text
//! ${ref:Vpc}                  another resource of this stack
//! ${ref:Vpc.Arn}              one of its attributes
//! ${param:stage}              an external parameter
//! ${param:stage, 'dev'}       ... with a default
//! ${self:provider.stage}      a path into the stack's settings
//! ${stack:network:/outputs/VpcId}
//! ```
//!
//! `$${` is a literal `${`.

use crate::error::{Error, Result};
use regex::Regex;
use stackgraph::{CrossStackRef, Reference, Template, TemplatePart, Value};
use std::sync::LazyLock;

static REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ref:([A-Za-z0-9_-]+)(?:\.([A-Za-z0-9_-]+))?$").expect("valid ref pattern")
});

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^param:([A-Za-z0-9_.-]+)\s*(?:,\s*(.+))?$").expect("valid param pattern")
});

static SETTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^self:([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)$").expect("valid self pattern")
});

static STACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^stack:([^:\s]+):(/\S*)$").expect("valid stack pattern")
});

/// Parse a string that may contain placeholders
///
/// A string that is exactly one placeholder becomes the bare reference, so
/// the referenced value keeps its type. Strings without placeholders come
/// back as plain strings with `$${` unescaped.
pub fn parse(text: &str, location: &str) -> Result<Value> {
    let invalid = |message: String| Error::InvalidTemplate {
        location: location.to_string(),
        message,
    };

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("$${") {
            literal.push_str("${");
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix("${") {
            let end = placeholder_end(after)
                .ok_or_else(|| invalid(format!("unterminated placeholder in '{text}'")))?;
            let reference = parse_placeholder(after[..end].trim()).map_err(invalid)?;
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            parts.push(TemplatePart::Ref(reference));
            rest = &after[end + 1..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            literal.push(c);
        }
        rest = chars.as_str();
    }
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    if parts.len() <= 1 {
        return Ok(match parts.pop() {
            None => Value::String(String::new()),
            Some(TemplatePart::Literal(text)) => Value::String(text),
            Some(TemplatePart::Ref(reference)) => Value::Ref(reference),
        });
    }
    Ok(Value::Template(Template { parts }))
}

/// Byte offset of the `}` closing a placeholder, skipping quoted text
fn placeholder_end(body: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '}') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parse the inside of one `${...}`
pub fn parse_placeholder(body: &str) -> std::result::Result<Reference, String> {
    if let Some(caps) = REF_RE.captures(body) {
        return Ok(Reference::SelfRef {
            resource: caps[1].to_string(),
            attribute: caps.get(2).map(|m| m.as_str().to_string()),
        });
    }
    if let Some(caps) = PARAM_RE.captures(body) {
        let default = caps
            .get(2)
            .map(|m| parse_default(m.as_str().trim()))
            .transpose()?;
        return Ok(Reference::Param {
            name: caps[1].to_string(),
            default,
        });
    }
    if let Some(caps) = SETTING_RE.captures(body) {
        return Ok(Reference::Setting {
            path: caps[1].to_string(),
        });
    }
    if let Some(caps) = STACK_RE.captures(body) {
        return Ok(Reference::CrossStack(CrossStackRef::new(&caps[1], &caps[2])));
    }
    Err(format!("unrecognized placeholder '${{{body}}}'"))
}

/// A default is a quoted string or a JSON literal
fn parse_default(raw: &str) -> std::result::Result<serde_json::Value, String> {
    for quote in ['\'', '"'] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return Ok(serde_json::Value::String(inner.to_string()));
        }
    }
    serde_json::from_str(raw).map_err(|_| format!("invalid default value '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts(value: Value) -> Vec<TemplatePart> {
        match value {
            Value::Template(template) => template.parts,
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_string_and_escape() {
        assert_eq!(parse("hello", "x").unwrap(), Value::String("hello".into()));
        assert_eq!(
            parse("cost: $${price}", "x").unwrap(),
            Value::String("cost: ${price}".into())
        );
    }

    #[test]
    fn test_single_placeholder_is_bare_reference() {
        assert_eq!(
            parse("${param:size, 3}", "x").unwrap(),
            Value::Ref(Reference::Param {
                name: "size".into(),
                default: Some(json!(3)),
            })
        );
        assert_eq!(
            parse("${ref:Vpc.Arn}", "x").unwrap(),
            Value::attr_ref("Vpc", "Arn")
        );
    }

    #[test]
    fn test_mixed_template() {
        let parsed = parts(parse("${self:service}-${param:stage, 'dev'}-db", "x").unwrap());
        assert_eq!(
            parsed,
            vec![
                TemplatePart::Ref(Reference::Setting {
                    path: "service".into()
                }),
                TemplatePart::Literal("-".into()),
                TemplatePart::Ref(Reference::Param {
                    name: "stage".into(),
                    default: Some(json!("dev")),
                }),
                TemplatePart::Literal("-db".into()),
            ]
        );
    }

    #[test]
    fn test_quoted_default_may_contain_brace() {
        let parsed = parse("${param:greeting, 'a}b'}", "x").unwrap();
        assert_eq!(
            parsed,
            Value::Ref(Reference::Param {
                name: "greeting".into(),
                default: Some(json!("a}b")),
            })
        );
    }

    #[test]
    fn test_cross_stack_placeholder() {
        assert_eq!(
            parse("${stack:network:/outputs/VpcId}", "x").unwrap(),
            Value::cross_stack("network", "/outputs/VpcId")
        );
    }

    #[test]
    fn test_malformed_placeholders() {
        let err = parse("${ref:Vpc", "resources.A.properties.P").unwrap_err();
        assert!(err.to_string().contains("resources.A.properties.P"));
        assert!(parse("${bogus:thing}", "x").is_err());
        assert!(parse("${param:x, nope}", "x").is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let text = "${self:service}-$${literal}-${ref:Vpc}";
        let Value::Template(template) = parse(text, "x").unwrap() else {
            panic!("expected template");
        };
        assert_eq!(template.to_string(), text);
    }
}
