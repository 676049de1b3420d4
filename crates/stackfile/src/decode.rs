//! JSON document values to stack values
//!
//! Maps whose keys start with `$` are reference objects:
//! `{"$ref", "$attr"}`, `{"$param", "$default"}`, `{"$stack", "$pointer"}`
//! and `{"$setting"}`. Strings containing `${` are templates.

use crate::error::{Error, Result};
use crate::template;
use indexmap::IndexMap;
use stackgraph::{CrossStackRef, Reference, Value, parse_pointer};

/// Decode a document value found at `location`
pub fn decode(value: &serde_json::Value, location: &str) -> Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) if s.contains("${") => template::parse(s, location)?,
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decode(item, &format!("{location}[{i}]")))
                .collect::<Result<_>>()?,
        ),
        serde_json::Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
            Value::Ref(reference(map, location)?)
        }
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), decode(v, &format!("{location}.{k}"))?)))
                .collect::<Result<IndexMap<_, _>>>()?,
        ),
    })
}

fn reference(map: &serde_json::Map<String, serde_json::Value>, location: &str) -> Result<Reference> {
    let invalid = |message: String| Error::InvalidReference {
        location: location.to_string(),
        message,
    };
    let string = |key: &str| -> Result<Option<String>> {
        match map.get(key) {
            None => Ok(None),
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
            Some(other) => Err(invalid(format!("'{key}' must be a non-empty string, got {other}"))),
        }
    };
    let only = |allowed: &[&str]| -> Result<()> {
        match map.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(invalid(format!(
                "unexpected key '{key}' in {} reference",
                allowed[0]
            ))),
            None => Ok(()),
        }
    };

    if let Some(resource) = string("$ref")? {
        only(&["$ref", "$attr"])?;
        return Ok(Reference::SelfRef {
            resource,
            attribute: string("$attr")?,
        });
    }
    if let Some(name) = string("$param")? {
        only(&["$param", "$default"])?;
        return Ok(Reference::Param {
            name,
            default: map.get("$default").cloned(),
        });
    }
    if let Some(stack) = string("$stack")? {
        only(&["$stack", "$pointer"])?;
        let pointer = string("$pointer")?
            .ok_or_else(|| invalid("'$stack' reference needs a '$pointer'".to_string()))?;
        if pointer.is_empty() || parse_pointer(&pointer).is_none() {
            return Err(invalid(format!(
                "'{pointer}' is not a JSON pointer (must start with '/')"
            )));
        }
        return Ok(Reference::CrossStack(CrossStackRef::new(stack, pointer)));
    }
    if let Some(path) = string("$setting")? {
        only(&["$setting"])?;
        return Ok(Reference::Setting { path });
    }

    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    Err(invalid(format!(
        "unknown reference object with keys {keys:?}; expected $ref, $param, $stack or $setting"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_objects() {
        assert_eq!(
            decode(&json!({"$ref": "Vpc", "$attr": "Arn"}), "x").unwrap(),
            Value::attr_ref("Vpc", "Arn")
        );
        assert_eq!(
            decode(&json!({"$param": "size", "$default": 2}), "x").unwrap(),
            Value::Ref(Reference::Param {
                name: "size".into(),
                default: Some(json!(2)),
            })
        );
        assert_eq!(
            decode(&json!({"$stack": "network", "$pointer": "/outputs/VpcId"}), "x").unwrap(),
            Value::cross_stack("network", "/outputs/VpcId")
        );
        assert_eq!(
            decode(&json!({"$setting": "provider.stage"}), "x").unwrap(),
            Value::Ref(Reference::Setting {
                path: "provider.stage".into()
            })
        );
    }

    #[test]
    fn test_nested_values_keep_order() {
        let value = decode(
            &json!({"z": [1, {"$ref": "A"}], "a": "${param:stage}-x"}),
            "props",
        )
        .unwrap();
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(
            map["z"],
            Value::List(vec![Value::Integer(1), Value::self_ref("A")])
        );
        assert!(matches!(map["a"], Value::Template(_)));
    }

    #[test]
    fn test_malformed_reference_objects() {
        let err = decode(&json!({"$ref": "A", "extra": 1}), "resources.B.properties.P").unwrap_err();
        assert!(err.to_string().contains("resources.B.properties.P"));
        assert!(err.to_string().contains("unexpected key 'extra'"));

        assert!(decode(&json!({"$stack": "network"}), "x").is_err());
        assert!(decode(&json!({"$stack": "network", "$pointer": "outputs"}), "x").is_err());
        assert!(decode(&json!({"$ref": 3}), "x").is_err());
        assert!(decode(&json!({"$bogus": "x"}), "x").is_err());
    }

    #[test]
    fn test_error_location_points_into_lists() {
        let err = decode(&json!(["ok", "${nope}"]), "resources.A.properties.Tags").unwrap_err();
        assert!(err.to_string().contains("resources.A.properties.Tags[1]"));
    }
}
