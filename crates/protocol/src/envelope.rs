//! The message envelope exchanged between every pair of crux peers.
//!
//! An envelope is a tagged operation `name`, an optional opaque `payload`
//! and a `success` flag. On the wire it is encoded with `bincode`; the
//! transport layer adds framing around the packed bytes.
//!
//! ```
//! use crux_protocol::{Envelope, Payload};
//!
//! let request = Envelope::new("process_start").with_payload("/srv/components/loader");
//! let bytes = request.pack().unwrap();
//! let decoded = Envelope::unpack(&bytes).unwrap();
//! assert_eq!(decoded, request);
//! assert_eq!(decoded.payload, Some(Payload::from("/srv/components/loader")));
//! ```

use serde::{Deserialize, Serialize};

use crate::descriptor_models::Schema;
use crate::error::{ProtocolError, ProtocolResult};
use crate::packing::{pack_io, unpack_io};
use crate::payload::Payload;

/// Well-known envelope names used by the component and daemon protocols.
pub mod names {
    // requests
    pub const EXECUTE: &str = "execute";
    pub const GET_DESCRIPTOR: &str = "get_descriptor";
    pub const SHUTDOWN: &str = "shutdown";
    pub const PROCESS_START: &str = "process_start";
    pub const PROCESS_LIST: &str = "process_list";
    pub const PROCESS_KILLALL: &str = "process_killall";
    pub const DAEMON_SHUTDOWN: &str = "daemon_shutdown";

    // replies
    pub const RETURN: &str = "return";
    pub const ACK: &str = "ack";
    pub const MALFORMED: &str = "malformed";
    pub const NOT_IMPLEMENTED: &str = "not_implemented";
    pub const FAILURE: &str = "failure";
    pub const INTERNAL_ERROR: &str = "internal_error";

    // notifications
    pub const PROCESS_STARTED: &str = "process_started";
}

/// The named, optionally payload-bearing, success-flagged message unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Operation or reply name. Must be non-empty to be packed.
    pub name: String,
    pub payload: Option<Payload>,
    pub success: bool,
}

/// On-the-wire shape. Every field is optional so that decoding can report
/// a missing name as `MalformedMessage` instead of a generic decode error.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    name: Option<String>,
    payload: Option<Payload>,
    success: Option<bool>,
}

impl Envelope {
    /// Create a successful envelope with no payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
            success: true,
        }
    }

    /// Create a failed envelope, optionally carrying a message.
    pub fn failure(name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            payload: message.map(Payload::String),
            success: false,
        }
    }

    /// A successful `return` reply carrying `payload`.
    pub fn reply(payload: impl Into<Payload>) -> Self {
        Self::new(names::RETURN).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// The payload as a string, if it is one.
    ///
    /// Failure replies conventionally carry a human-readable message here.
    pub fn message(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Payload::as_str)
    }

    /// Pack this envelope into its binary wire form.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the name is empty. No bytes are produced.
    pub fn pack(&self) -> ProtocolResult<Vec<u8>> {
        if self.name.is_empty() {
            return Err(ProtocolError::MalformedMessage(
                "message must have a name".to_string(),
            ));
        }

        let wire = WireEnvelope {
            name: Some(self.name.clone()),
            payload: self.payload.clone(),
            success: Some(self.success),
        };

        bincode::serialize(&wire)
            .map_err(|e| ProtocolError::MalformedMessage(format!("failed to pack message: {}", e)))
    }

    /// Pack this envelope, first encoding its mapping payload against `schema`.
    ///
    /// A missing or null payload is packed as-is.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if a payload key is not declared in the schema,
    /// `InvalidField` if a value cannot be encoded as its declared type, and
    /// `MalformedMessage` if the payload is present but not a mapping.
    pub fn pack_io(&self, schema: &Schema) -> ProtocolResult<Vec<u8>> {
        let mut packed = self.clone();
        packed.payload = match &self.payload {
            None => None,
            Some(Payload::Null) => Some(Payload::Null),
            Some(Payload::Mapping(map)) => Some(Payload::Mapping(pack_io(map, schema)?)),
            Some(_) => {
                return Err(ProtocolError::MalformedMessage(
                    "I/O payload must be a mapping".to_string(),
                ))
            }
        };
        packed.pack()
    }

    /// Unpack an envelope from its binary wire form.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the bytes do not decode, or decode to an
    /// envelope without a name.
    pub fn unpack(data: &[u8]) -> ProtocolResult<Self> {
        let wire: WireEnvelope = bincode::deserialize(data).map_err(|e| {
            ProtocolError::MalformedMessage(format!("failed to unpack message: {}", e))
        })?;

        let name = match wire.name {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(ProtocolError::MalformedMessage(
                    "message has no name".to_string(),
                ))
            }
        };

        Ok(Self {
            name,
            payload: wire.payload,
            success: wire.success.unwrap_or(true),
        })
    }

    /// Unpack an envelope and decode its mapping payload against `schema`.
    pub fn unpack_io(data: &[u8], schema: &Schema) -> ProtocolResult<Self> {
        let mut envelope = Self::unpack(data)?;
        if let Some(Payload::Mapping(map)) = &envelope.payload {
            envelope.payload = Some(Payload::Mapping(unpack_io(map, schema)?));
        }
        Ok(envelope)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Envelope name=\"{}\", payload={}, success={}>",
            self.name,
            self.payload
                .as_ref()
                .map(|p| p.to_json().to_string())
                .unwrap_or_else(|| "None".to_string()),
            self.success
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadMap;

    /// Bincode bytes of an envelope named `x` whose payload is `depth`
    /// nested single-element sequences, built by hand so the test never holds
    /// the nested value itself.
    fn deeply_nested_frame(depth: usize) -> Vec<u8> {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.push(b'x');
        bytes.push(1);
        for _ in 0..depth {
            bytes.extend_from_slice(&5u32.to_le_bytes()); // Sequence
            bytes.extend_from_slice(&1u64.to_le_bytes());
        }
        bytes.extend_from_slice(&0u32.to_le_bytes()); // Null
        bytes.push(0); // success: None
        bytes
    }

    #[test]
    fn test_unpack_rejects_hostile_nesting() {
        let result = Envelope::unpack(&deeply_nested_frame(200_000));
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }

    #[test]
    fn test_unpack_accepts_shallow_hand_built_frame() {
        let envelope = Envelope::unpack(&deeply_nested_frame(2)).unwrap();
        assert_eq!(envelope.name, "x");
        assert!(envelope.success);
        assert_eq!(
            envelope.payload,
            Some(Payload::Sequence(vec![Payload::Sequence(vec![Payload::Null])]))
        );
    }

    #[test]
    fn test_pack_without_name_fails() {
        let envelope = Envelope::new("");
        let result = envelope.pack();
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }

    #[test]
    fn test_unpack_garbage_is_malformed() {
        let result = Envelope::unpack(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }

    #[test]
    fn test_unpack_missing_name_is_malformed() {
        let wire = WireEnvelope {
            name: None,
            payload: Some(Payload::Int(1)),
            success: None,
        };
        let bytes = bincode::serialize(&wire).unwrap();

        let result = Envelope::unpack(&bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }

    #[test]
    fn test_success_defaults_to_true_when_absent() {
        let wire = WireEnvelope {
            name: Some("ack".to_string()),
            payload: None,
            success: None,
        };
        let bytes = bincode::serialize(&wire).unwrap();

        let envelope = Envelope::unpack(&bytes).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.payload, None);
    }

    #[test]
    fn test_round_trip_preserves_nested_payload() {
        let mut inner = PayloadMap::new();
        inner.insert("blob".to_string(), Payload::Bytes(vec![1, 2, 3]));
        inner.insert("ratio".to_string(), Payload::Float(0.25));

        let mut outer = PayloadMap::new();
        outer.insert("inner".to_string(), Payload::Mapping(inner));
        outer.insert(
            "rows".to_string(),
            Payload::Sequence(vec![Payload::Null, Payload::Bool(false)]),
        );

        let envelope = Envelope::new("execute").with_payload(outer);
        let decoded = Envelope::unpack(&envelope.pack().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_failure_carries_message() {
        let envelope = Envelope::failure(names::FAILURE, Some("no crux.json".to_string()));
        let decoded = Envelope::unpack(&envelope.pack().unwrap()).unwrap();

        assert!(!decoded.success);
        assert_eq!(decoded.message(), Some("no crux.json"));
    }

    #[test]
    fn test_pack_io_rejects_non_mapping_payload() {
        let envelope = Envelope::reply(Payload::Int(4));
        let result = envelope.pack_io(&Schema::new());
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }
}
