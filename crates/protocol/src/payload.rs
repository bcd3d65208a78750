//! Structural payload values.
//!
//! Every value that crosses the wire inside an [`Envelope`](crate::Envelope)
//! is a [`Payload`]: a closed tagged union that schema-driven packing can
//! pattern-match on without guessing at types.

use serde::de::{self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Deepest `Sequence`/`Mapping` nesting accepted when decoding.
pub const MAX_PAYLOAD_DEPTH: usize = 128;

/// String-keyed mapping of payload values.
///
/// This is the shape of component inputs, outputs and parameters.
pub type PayloadMap = BTreeMap<String, Payload>;

/// A structurally serializable value carried in an envelope.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Payload>),
    Mapping(PayloadMap),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Create an empty mapping.
    pub fn empty_mapping() -> Self {
        Payload::Mapping(PayloadMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&PayloadMap> {
        match self {
            Payload::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Payload]> {
        match self {
            Payload::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key if this payload is a mapping.
    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Consume the payload, returning the mapping it holds.
    pub fn into_mapping(self) -> Option<PayloadMap> {
        match self {
            Payload::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    ///
    /// JSON has no byte-string type, so `Bytes` become a hex string; non-finite
    /// floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Payload::Null => Value::Null,
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Int(i) => Value::from(*i),
            Payload::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Payload::String(s) => Value::String(s.clone()),
            Payload::Sequence(items) => Value::Array(items.iter().map(Payload::to_json).collect()),
            Payload::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Payload::Bytes(bytes) => Value::String(hex::encode(bytes)),
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Payload::Int(i),
                None => Payload::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::Sequence(items.into_iter().map(Payload::from).collect()),
            Value::Object(map) => Payload::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, Payload::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::String(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::String(s)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

impl From<i64> for Payload {
    fn from(i: i64) -> Self {
        Payload::Int(i)
    }
}

impl From<f64> for Payload {
    fn from(f: f64) -> Self {
        Payload::Float(f)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(items: Vec<Payload>) -> Self {
        Payload::Sequence(items)
    }
}

impl From<PayloadMap> for Payload {
    fn from(map: PayloadMap) -> Self {
        Payload::Mapping(map)
    }
}

// Decoding is hand-written so that nesting depth is bounded: a hostile frame
// of nested sequences must fail to decode instead of exhausting the stack.
// The accepted encoding is the same externally tagged one `Serialize` emits.

const VARIANTS: &[&str] = &[
    "Null", "Bool", "Int", "Float", "String", "Sequence", "Mapping", "Bytes",
];

#[derive(Deserialize)]
#[serde(variant_identifier)]
enum Tag {
    Null,
    Bool,
    Int,
    Float,
    String,
    Sequence,
    Mapping,
    Bytes,
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PayloadSeed { depth: 0 }.deserialize(deserializer)
    }
}

#[derive(Clone, Copy)]
struct PayloadSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for PayloadSeed {
    type Value = Payload;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Payload, D::Error> {
        if self.depth > MAX_PAYLOAD_DEPTH {
            return Err(de::Error::custom(format!(
                "payload nested deeper than {} levels",
                MAX_PAYLOAD_DEPTH
            )));
        }
        deserializer.deserialize_enum("Payload", VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for PayloadSeed {
    type Value = Payload;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a payload value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Payload, A::Error> {
        let nested = PayloadSeed {
            depth: self.depth + 1,
        };
        let (tag, variant) = data.variant::<Tag>()?;

        Ok(match tag {
            Tag::Null => {
                variant.unit_variant()?;
                Payload::Null
            }
            Tag::Bool => Payload::Bool(variant.newtype_variant()?),
            Tag::Int => Payload::Int(variant.newtype_variant()?),
            Tag::Float => Payload::Float(variant.newtype_variant()?),
            Tag::String => Payload::String(variant.newtype_variant()?),
            Tag::Sequence => Payload::Sequence(variant.newtype_variant_seed(SequenceSeed(nested))?),
            Tag::Mapping => Payload::Mapping(variant.newtype_variant_seed(MappingSeed(nested))?),
            Tag::Bytes => Payload::Bytes(variant.newtype_variant()?),
        })
    }
}

struct SequenceSeed(PayloadSeed);

impl<'de> DeserializeSeed<'de> for SequenceSeed {
    type Value = Vec<Payload>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for SequenceSeed {
    type Value = Vec<Payload>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence of payloads")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        // the length prefix is untrusted
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

struct MappingSeed(PayloadSeed);

impl<'de> DeserializeSeed<'de> for MappingSeed {
    type Value = PayloadMap;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MappingSeed {
    type Value = PayloadMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of payloads")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = PayloadMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(self.0)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }
}
