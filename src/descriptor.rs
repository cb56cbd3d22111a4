//! # Bundle Descriptor Model
//!
//! The portable JSON document describing a compiled bundle: actions,
//! parameters, outputs, type definitions, images, vendor extensions, and
//! required extensions.
//!
//! Field names and nesting match the target specification's wire schema
//! exactly (`schemaVersion`, `invocationImages`, `requiredExtensions`,
//! camelCase schema keywords); third-party tooling inspects these
//! documents directly, so the serde attributes here are part of the
//! compiler's contract.

use crate::error::{Error, Result};
use crate::manifest::Location;
use crate::schema::Definitions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A compiled bundle descriptor.
///
/// Produced by [`crate::compiler::Compiler::to_descriptor`]; fresh per
/// compile, owned by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub schema_version: String,
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The container images implementing the bundle's actions. Exactly one
    /// entry for bundles compiled by this crate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocation_images: Vec<Image>,

    /// Additional images referenced by the bundle, keyed by the manifest's
    /// image-map names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<String, Image>,

    /// Custom action entries. Lifecycle actions (install, upgrade,
    /// uninstall) are implicit and never listed here.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, Action>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,

    /// Named type definitions referenced by parameters and outputs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: Definitions,

    /// Vendor-extension payloads, namespaced by key. At minimum carries the
    /// build stamp; carries the dependency payload when dependencies exist.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_json::Value>,

    /// Extensions a runtime must support to execute this bundle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_extensions: Vec<String>,
}

impl Descriptor {
    /// Serializes the descriptor to its wire JSON document.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decodes a descriptor from its wire JSON document.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// An image referenced by a descriptor, either the invocation image or an
/// entry in the image map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Full reference: `repository@digest` when pinned, `repository:tag`
    /// when tagged, else the bare repository.
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// A custom action entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// True when running the action can change any resource the bundle
    /// manages.
    #[serde(default, skip_serializing_if = "is_false")]
    pub modifies: bool,

    /// True when the action may run without an existing installation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub stateless: bool,
}

/// A parameter entry pointing at a named definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub definition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Exactly one of environment variable or path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Location>,

    /// Actions this parameter applies to; absent means every action,
    /// including custom ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_to: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
}

/// An output entry pointing at a named definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub definition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_to: Option<Vec<String>>,

    /// Location inside the invocation image the output is captured from.
    pub path: String,
}

impl Parameter {
    /// True when this parameter applies to the given action.
    pub fn applies_to(&self, action: &str) -> bool {
        match &self.apply_to {
            None => true,
            Some(actions) => actions.iter().any(|a| a == action),
        }
    }
}

impl Output {
    /// True when this output applies to the given action.
    pub fn applies_to(&self, action: &str) -> bool {
        match &self.apply_to {
            None => true,
            Some(actions) => actions.iter().any(|a| a == action),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_json_round_trip() {
        let descriptor = Descriptor {
            schema_version: crate::constants::SCHEMA_VERSION.to_string(),
            name: "hello".to_string(),
            version: "0.1.0".to_string(),
            invocation_images: vec![Image {
                image: "example.com/ns/hello-installer:v0.1.0".to_string(),
                image_type: Some("docker".to_string()),
                ..Image::default()
            }],
            ..Descriptor::default()
        };

        let json = descriptor.to_json().unwrap();
        assert!(json.contains("\"schemaVersion\""), "wire key must be camelCase");
        assert!(json.contains("\"invocationImages\""));

        let decoded = Descriptor::from_json(&json).unwrap();
        assert_eq!(decoded.name, "hello");
        assert_eq!(decoded.invocation_images.len(), 1);
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let descriptor = Descriptor {
            schema_version: "v1.0.0".to_string(),
            name: "empty".to_string(),
            version: "1.0.0".to_string(),
            ..Descriptor::default()
        };
        let json = descriptor.to_json().unwrap();
        for key in ["actions", "outputs", "requiredExtensions", "custom"] {
            assert!(!json.contains(key), "{} should be omitted when empty", key);
        }
    }

    #[test]
    fn test_applies_to_defaults_to_every_action() {
        let parameter = Parameter {
            definition: "x-parameter".to_string(),
            ..Parameter::default()
        };
        assert!(parameter.applies_to("install"));
        assert!(parameter.applies_to("zombies"));

        let scoped = Parameter {
            definition: "x-parameter".to_string(),
            apply_to: Some(vec!["install".to_string()]),
            ..Parameter::default()
        };
        assert!(scoped.applies_to("install"));
        assert!(!scoped.applies_to("uninstall"));
    }
}
