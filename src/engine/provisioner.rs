//! Record-only provisioner
//!
//! Nothing is created anywhere. Each resource gets a stable synthetic
//! physical id and reports its materialized properties back as attributes,
//! which is enough to drive cross-resource and cross-stack references
//! through a full apply.

use anyhow::{Result, bail};
use stackgraph::{AppliedResource, ProvisionRequest, Provisioner};

/// Attribute carrying the physical id, reported for every resource
pub const ID_ATTRIBUTE: &str = "Id";

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProvisioner;

impl LocalProvisioner {
    /// Synthetic physical id of `stack/id`
    ///
    /// The type tag is slugged (`aws:ec2:vpc` becomes `aws-ec2-vpc`) and
    /// followed by 12 hex digits of the BLAKE3 hash of the resource address.
    pub fn physical_id(stack: &str, id: &str, type_tag: &str) -> String {
        let slug: String = type_tag
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let slug = slug.trim_matches('-');
        let hash = blake3::hash(format!("{stack}/{id}").as_bytes()).to_hex();
        format!("{slug}-{}", &hash[..12])
    }
}

impl Provisioner for LocalProvisioner {
    fn provision(&self, request: &ProvisionRequest<'_>) -> Result<AppliedResource> {
        if request.type_tag.trim().is_empty() {
            bail!("resource '{}' has no type", request.id);
        }

        let physical_id = match request.previous {
            Some(previous) => previous.physical_id.clone(),
            None => Self::physical_id(request.stack, request.id, request.type_tag),
        };

        let mut record = AppliedResource::new(physical_id.clone());
        for (key, value) in &request.properties {
            record.attributes.insert(key.clone(), value.clone());
        }
        record
            .attributes
            .insert(ID_ATTRIBUTE.to_string(), serde_json::Value::String(physical_id));

        log::debug!(
            "{}: recorded '{}' as {}",
            request.stack,
            request.id,
            record.physical_id
        );
        Ok(record)
    }

    fn remove(&self, stack: &str, id: &str, applied: &AppliedResource) -> Result<()> {
        log::debug!("{stack}: forgot '{id}' ({})", applied.physical_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request<'a>(previous: Option<&'a AppliedResource>) -> ProvisionRequest<'a> {
        let mut properties = serde_json::Map::new();
        properties.insert("CidrBlock".into(), json!("10.0.0.0/16"));
        ProvisionRequest {
            stack: "network",
            id: "Vpc",
            type_tag: "aws:ec2:vpc",
            properties,
            previous,
        }
    }

    #[test]
    fn test_physical_id_is_stable() {
        let first = LocalProvisioner::physical_id("network", "Vpc", "aws:ec2:vpc");
        let second = LocalProvisioner::physical_id("network", "Vpc", "aws:ec2:vpc");
        assert_eq!(first, second);
        assert!(first.starts_with("aws-ec2-vpc-"));
        assert_eq!(first.len(), "aws-ec2-vpc-".len() + 12);
        assert_ne!(first, LocalProvisioner::physical_id("other", "Vpc", "aws:ec2:vpc"));
    }

    #[test]
    fn test_properties_are_echoed_as_attributes() {
        let record = LocalProvisioner.provision(&request(None)).unwrap();
        assert_eq!(record.attributes["CidrBlock"], json!("10.0.0.0/16"));
        assert_eq!(record.attributes[ID_ATTRIBUTE], json!(record.physical_id));
    }

    #[test]
    fn test_updates_keep_the_physical_id() {
        let previous = AppliedResource::new("vpc-original");
        let record = LocalProvisioner.provision(&request(Some(&previous))).unwrap();
        assert_eq!(record.physical_id, "vpc-original");
    }
}
