//! # Schema Synthesis
//!
//! Converts parameter and output declarations into descriptor entries plus
//! a companion table of named type definitions.
//!
//! ## Synthesis Model
//!
//! Each declaration embeds a JSON-Schema-like fragment ([`Schema`]). The
//! synthesizer:
//!
//! 1. Clones the fragment (the manifest is never mutated).
//! 2. Applies the single coercion rule: `type: file` becomes a
//!    base64-encoded string on the wire, and requires a destination path.
//! 3. Encodes sensitivity as `writeOnly` on the definition, not the entry.
//! 4. Self-validates the coerced fragment, tagging problems with the
//!    declaration name. Problems across all declarations are aggregated so
//!    authors see everything in one pass.
//! 5. Registers the fragment under a synthetic id (`<name>-parameter` or
//!    `<name>-output`) and emits an entry pointing at it.
//!
//! Definitions are returned alongside the entries; the assembler merges
//! them. A duplicate synthetic id is a hard error rather than a silent
//! last-write-wins.

use crate::constants::{
    DEBUG_PARAMETER, DEBUG_PARAMETER_ENV, FILE_TYPE, OUTPUTS_DIR,
};
use crate::descriptor::{Output, Parameter};
use crate::error::{Error, Result};
use crate::manifest::{Location, Manifest, ParameterDeclaration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Table of named type definitions, keyed by synthetic identifier.
pub type Definitions = BTreeMap<String, Schema>;

/// A JSON-Schema-like type fragment embedded in parameter and output
/// declarations and emitted into the descriptor's `definitions` table.
///
/// Only the subset of keywords the manifest format supports is modeled;
/// unknown keywords in a manifest are ignored by the decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Schema type: `string`, `integer`, `number`, `boolean`, or the
    /// manifest-only sentinel `file`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<serde_json::Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<serde_json::Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<serde_json::Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<serde_json::Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_only: Option<bool>,
}

const KNOWN_TYPES: &[&str] = &[
    "string", "integer", "number", "boolean", "array", "object", FILE_TYPE,
];

impl Schema {
    /// Structural self-validation. Returns every problem found, never
    /// failing fast, so callers can aggregate across declarations.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let schema_type = self.schema_type.as_deref();
        if let Some(t) = schema_type {
            if !KNOWN_TYPES.contains(&t) {
                issues.push(format!("unknown type '{}'", t));
            }
        }

        if let Some(default) = &self.default {
            if let Some(t) = schema_type {
                if !value_matches_type(default, t) {
                    issues.push(format!("default {} does not match type '{}'", default, t));
                }
            }
        }

        if let Some(values) = &self.enum_values {
            if values.is_empty() {
                issues.push("enum must not be empty".to_string());
            }
            if let Some(t) = schema_type {
                for value in values {
                    if !value_matches_type(value, t) {
                        issues.push(format!("enum value {} does not match type '{}'", value, t));
                    }
                }
            }
        }

        let numeric = matches!(schema_type, Some("integer") | Some("number") | None);
        if !numeric
            && (self.minimum.is_some()
                || self.maximum.is_some()
                || self.exclusive_minimum.is_some()
                || self.exclusive_maximum.is_some())
        {
            issues.push("numeric bounds only apply to integer and number types".to_string());
        }
        if let (Some(min), Some(max)) = (&self.minimum, &self.maximum) {
            if number_as_f64(min) > number_as_f64(max) {
                issues.push(format!("minimum {} exceeds maximum {}", min, max));
            }
        }

        let stringy = matches!(schema_type, Some("string") | Some(FILE_TYPE) | None);
        if !stringy && (self.min_length.is_some() || self.max_length.is_some()) {
            issues.push("string length bounds only apply to string types".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                issues.push(format!("minLength {} exceeds maxLength {}", min, max));
            }
        }

        if self.content_encoding.is_some() && !stringy {
            issues.push("contentEncoding only applies to string types".to_string());
        }

        issues
    }

    /// Applies the `file` coercion to a cloned fragment: the wire
    /// representation of a file is a base64-encoded string.
    pub fn coerce_file(&self) -> Schema {
        let mut coerced = self.clone();
        if coerced.schema_type.as_deref() == Some(FILE_TYPE) {
            coerced.schema_type = Some("string".to_string());
            coerced.content_encoding = Some("base64".to_string());
        }
        coerced
    }
}

fn value_matches_type(value: &serde_json::Value, schema_type: &str) -> bool {
    match schema_type {
        "string" | FILE_TYPE => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn number_as_f64(n: &serde_json::Number) -> f64 {
    n.as_f64().unwrap_or(0.0)
}

/// Synthesizes descriptor parameter entries and their definitions from the
/// manifest's parameter declarations, plus the compiler's default debug
/// parameter (unless the author declared one with the same name).
pub fn synthesize_parameters(
    manifest: &Manifest,
) -> Result<(BTreeMap<String, Parameter>, Definitions)> {
    let mut parameters = BTreeMap::new();
    let mut definitions = Definitions::new();
    let mut issues = Vec::new();

    let mut declarations: Vec<ParameterDeclaration> = manifest.parameters.clone();
    if !declarations.iter().any(|p| p.name == DEBUG_PARAMETER) {
        declarations.push(debug_parameter());
    }

    for declaration in &declarations {
        let mut schema = declaration.schema.coerce_file();

        if declaration.schema.schema_type.as_deref() == Some(FILE_TYPE)
            && declaration.destination.path.is_none()
        {
            issues.push(format!(
                "parameter '{}': no destination path supplied for a file parameter",
                declaration.name
            ));
        }

        if declaration.sensitive {
            schema.write_only = Some(true);
        }

        for issue in schema.validate() {
            issues.push(format!("parameter '{}': {}", declaration.name, issue));
        }

        let destination = match default_destination(&declaration.destination, &declaration.name) {
            Ok(destination) => destination,
            Err(issue) => {
                issues.push(format!("parameter '{}': {}", declaration.name, issue));
                continue;
            }
        };

        let id = definition_id(&declaration.name, DefinitionKind::Parameter);
        if definitions.insert(id.clone(), schema).is_some() {
            return Err(Error::DuplicateDefinition(id));
        }

        parameters.insert(
            declaration.name.clone(),
            Parameter {
                definition: id,
                destination: Some(destination),
                apply_to: apply_to(&declaration.apply_to),
                required: declaration.schema.default.is_none(),
                description: None,
            },
        );
    }

    if !issues.is_empty() {
        return Err(Error::SchemaValidation { issues });
    }

    Ok((parameters, definitions))
}

/// Synthesizes descriptor output entries and their definitions from the
/// manifest's output declarations. Every output is captured from
/// `/cnab/app/outputs/<name>` inside the invocation image.
pub fn synthesize_outputs(
    manifest: &Manifest,
) -> Result<(BTreeMap<String, Output>, Definitions)> {
    let mut outputs = BTreeMap::new();
    let mut definitions = Definitions::new();
    let mut issues = Vec::new();

    for declaration in &manifest.outputs {
        let mut schema = declaration.schema.coerce_file();

        if declaration.schema.schema_type.as_deref() == Some(FILE_TYPE)
            && declaration.path.is_none()
        {
            issues.push(format!(
                "output '{}': no path supplied for a file output",
                declaration.name
            ));
        }

        if declaration.sensitive {
            schema.write_only = Some(true);
        }

        for issue in schema.validate() {
            issues.push(format!("output '{}': {}", declaration.name, issue));
        }

        let description = schema.description.clone();
        let id = definition_id(&declaration.name, DefinitionKind::Output);
        if definitions.insert(id.clone(), schema).is_some() {
            return Err(Error::DuplicateDefinition(id));
        }

        outputs.insert(
            declaration.name.clone(),
            Output {
                definition: id,
                description,
                apply_to: apply_to(&declaration.apply_to),
                path: format!("{}/{}", OUTPUTS_DIR, declaration.name),
            },
        );
    }

    if !issues.is_empty() {
        return Err(Error::SchemaValidation { issues });
    }

    Ok((outputs, definitions))
}

/// Kind of declaration a definition id was synthesized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Parameter,
    Output,
}

/// Builds the synthetic definition identifier for a declaration.
pub fn definition_id(name: &str, kind: DefinitionKind) -> String {
    match kind {
        DefinitionKind::Parameter => format!("{}-parameter", name),
        DefinitionKind::Output => format!("{}-output", name),
    }
}

/// Resolves a declaration's destination: exactly one of environment
/// variable or path. An empty destination defaults to the upper-cased
/// declaration name as an environment variable; both set is an error.
fn default_destination(
    destination: &Location,
    name: &str,
) -> std::result::Result<Location, String> {
    if destination.environment_variable.is_some() && destination.path.is_some() {
        return Err("destination must be either an environment variable or a path, not both"
            .to_string());
    }
    if destination.is_empty() {
        return Ok(Location {
            environment_variable: Some(name.to_uppercase()),
            path: None,
        });
    }
    Ok(destination.clone())
}

fn apply_to(list: &[String]) -> Option<Vec<String>> {
    if list.is_empty() {
        None
    } else {
        Some(list.to_vec())
    }
}

fn debug_parameter() -> ParameterDeclaration {
    ParameterDeclaration {
        name: DEBUG_PARAMETER.to_string(),
        destination: Location {
            environment_variable: Some(DEBUG_PARAMETER_ENV.to_string()),
            path: None,
        },
        schema: Schema {
            schema_type: Some("boolean".to_string()),
            description: Some(
                "Print debug information from the installer when executing the bundle".to_string(),
            ),
            default: Some(serde_json::Value::Bool(false)),
            ..Schema::default()
        },
        ..ParameterDeclaration::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_plain_fragment() {
        let schema = Schema {
            schema_type: Some("integer".to_string()),
            default: Some(json!(1)),
            minimum: Some(0.into()),
            maximum: Some(10.into()),
            ..Schema::default()
        };
        assert!(schema.validate().is_empty());
    }

    #[test]
    fn test_validate_flags_mismatched_default() {
        let schema = Schema {
            schema_type: Some("integer".to_string()),
            default: Some(json!("one")),
            ..Schema::default()
        };
        let issues = schema.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("does not match type"));
    }

    #[test]
    fn test_validate_flags_inverted_bounds() {
        let schema = Schema {
            schema_type: Some("integer".to_string()),
            minimum: Some(10.into()),
            maximum: Some(1.into()),
            ..Schema::default()
        };
        assert!(!schema.validate().is_empty());

        let schema = Schema {
            schema_type: Some("string".to_string()),
            min_length: Some(10),
            max_length: Some(1),
            ..Schema::default()
        };
        assert!(!schema.validate().is_empty());
    }

    #[test]
    fn test_coerce_file_rewrites_to_base64_string() {
        let schema = Schema {
            schema_type: Some(FILE_TYPE.to_string()),
            ..Schema::default()
        };
        let coerced = schema.coerce_file();
        assert_eq!(coerced.schema_type.as_deref(), Some("string"));
        assert_eq!(coerced.content_encoding.as_deref(), Some("base64"));

        // Non-file fragments pass through untouched.
        let plain = Schema {
            schema_type: Some("boolean".to_string()),
            ..Schema::default()
        };
        assert_eq!(plain.coerce_file(), plain);
    }

    #[test]
    fn test_definition_ids() {
        assert_eq!(
            definition_id("kubeconfig", DefinitionKind::Output),
            "kubeconfig-output"
        );
        assert_eq!(
            definition_id("db-password", DefinitionKind::Parameter),
            "db-password-parameter"
        );
    }
}
