//! Typed replacement for the source's runtime-any event payload.
//!
//! spec.md §9 calls out the source's `interface{}` pattern for `Event.data`
//! and `Snapshot.payload` and asks for a typed wrapper at the API boundary
//! instead. `Payload` is that wrapper: either a JSON value (the common case,
//! and what the reference codec round-trips natively) or an opaque byte
//! sequence tagged with a content type, for callers who already have an
//! encoded representation and don't want a second serialization hop.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Json(serde_json::Value),
    Bytes {
        content_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl Payload {
    pub fn json(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }

    pub fn bytes(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Payload::Bytes {
            content_type: content_type.into(),
            data,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Bytes { .. } => None,
        }
    }
}

/// Bytes are represented as base64 in JSON so the reference codec can embed
/// them without escaping arbitrary binary data.
mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        base64::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payload_round_trips_through_serde() {
        let payload = Payload::json(serde_json::json!({"qty": 3}));
        let encoded = serde_json::to_vec(&payload).unwrap();
        let decoded: Payload = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn bytes_payload_round_trips_through_serde() {
        let payload = Payload::bytes("application/octet-stream", vec![0, 1, 2, 255, 254]);
        let encoded = serde_json::to_vec(&payload).unwrap();
        let decoded: Payload = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(payload, decoded);
    }
}
