//! Component descriptor models for `crux.json`.
//!
//! A descriptor ("cruxfile") is the static metadata describing a component:
//! its identity, semantic version, startup command and the schemas of its
//! inputs, outputs and parameters. It is loaded once when the component
//! starts and fetched read-only by orchestrators after connecting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ProtocolError, ProtocolResult};
use crate::payload::Payload;

/// Wire/in-memory treatment of a declared field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Structured value, passed through unchanged.
    #[default]
    Json,
    /// Table of rows; delimited text on the wire.
    Csv,
    /// Plain string, passed through unchanged.
    Text,
    /// Byte string; hex-encoded on the wire.
    Binary,
}

/// Declaration of a single input, output or parameter field.
///
/// # Example
///
/// ```json
/// { "type": "text", "default": "out.txt", "description": "target path" }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub kind: FieldType,

    /// Value used for a parameter when the requester omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Any other shape metadata (descriptions, column names, ...).
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl FieldSpec {
    /// A field of the given type with no default or metadata.
    pub fn of(kind: FieldType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Field name to declaration.
pub type Schema = BTreeMap<String, FieldSpec>;

/// A schema as written in the descriptor file: either inline, or a path
/// to a sibling JSON file containing it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum SchemaSource {
    Inline(Schema),
    File(PathBuf),
}

impl Default for SchemaSource {
    fn default() -> Self {
        SchemaSource::Inline(Schema::new())
    }
}

/// The descriptor file exactly as it appears on disk.
///
/// `startup` is optional here so that its absence can be reported as a
/// load error rather than a generic parse failure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DescriptorFile {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub startup: Option<String>,
    #[serde(default)]
    pub inputs: SchemaSource,
    #[serde(default)]
    pub outputs: SchemaSource,
    #[serde(default)]
    pub parameters: SchemaSource,
}

/// A fully resolved component descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name: String,

    /// Semantic version string, checked against pipeline constraints.
    pub version: String,

    /// Shell command that starts the component.
    pub startup: String,

    #[serde(default)]
    pub inputs: Schema,

    #[serde(default)]
    pub outputs: Schema,

    #[serde(default)]
    pub parameters: Schema,
}

impl Descriptor {
    /// Encode the descriptor as a payload for a `get_descriptor` reply.
    pub fn to_payload(&self) -> Payload {
        // Descriptor only contains strings and JSON values, serialization cannot fail
        serde_json::to_value(self)
            .map(Payload::from)
            .unwrap_or(Payload::Null)
    }

    /// Decode a descriptor from a `get_descriptor` reply payload.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the payload does not describe a descriptor.
    pub fn from_payload(payload: &Payload) -> ProtocolResult<Self> {
        serde_json::from_value(payload.to_json()).map_err(|e| {
            ProtocolError::MalformedMessage(format!("invalid descriptor payload: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_spec_keeps_metadata() {
        let spec: FieldSpec = serde_json::from_value(json!({
            "type": "csv",
            "columns": ["a", "b"]
        }))
        .unwrap();

        assert_eq!(spec.kind, FieldType::Csv);
        assert_eq!(spec.default, None);
        assert_eq!(spec.metadata.get("columns"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_field_type_defaults_to_json() {
        let spec: FieldSpec = serde_json::from_value(json!({"default": 3})).unwrap();
        assert_eq!(spec.kind, FieldType::Json);
        assert_eq!(spec.default, Some(json!(3)));
    }

    #[test]
    fn test_schema_source_inline_or_file() {
        let inline: SchemaSource =
            serde_json::from_value(json!({"text": {"type": "text"}})).unwrap();
        assert!(matches!(inline, SchemaSource::Inline(ref s) if s.contains_key("text")));

        let file: SchemaSource = serde_json::from_value(json!("inputs.json")).unwrap();
        assert_eq!(file, SchemaSource::File(PathBuf::from("inputs.json")));
    }

    #[test]
    fn test_descriptor_payload_round_trip() {
        let mut inputs = Schema::new();
        inputs.insert("text".to_string(), FieldSpec::of(FieldType::Text));
        let mut parameters = Schema::new();
        parameters.insert(
            "path".to_string(),
            FieldSpec::of(FieldType::Text).with_default(json!("out.txt")),
        );

        let descriptor = Descriptor {
            name: "dumper".to_string(),
            version: "1.0.0".to_string(),
            startup: "python3 dumper.py".to_string(),
            inputs,
            outputs: Schema::new(),
            parameters,
        };

        let decoded = Descriptor::from_payload(&descriptor.to_payload()).unwrap();
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_descriptor_from_bad_payload_is_malformed() {
        let result = Descriptor::from_payload(&Payload::from("nope"));
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }
}
