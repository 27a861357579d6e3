use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::MessageKind;

/// Error details in a fabric message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricError {
    pub code: i32,
    pub message: String,
}

/// Envelope for all fabric communication.
///
/// Requests are addressed by `topic` and carry string metadata in
/// `other_fields` plus an opaque byte `payload`. Responses reuse the
/// request `id` for correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other_fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FabricError>,
}

impl Message {
    /// Creates a request for `topic`.
    pub fn request(
        id: impl Into<String>,
        topic: impl Into<String>,
        other_fields: BTreeMap<String, String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Request,
            topic: topic.into(),
            other_fields,
            payload,
            error: None,
        }
    }

    /// Creates a response to this request with a JSON payload.
    pub fn reply<T: Serialize>(&self, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: self.id.clone(),
            kind: MessageKind::Response,
            topic: self.topic.clone(),
            other_fields: BTreeMap::new(),
            payload: serde_json::to_vec(payload)?,
            error: None,
        })
    }

    /// Creates an error response for this request.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            kind: MessageKind::Error,
            topic: self.topic.clone(),
            other_fields: BTreeMap::new(),
            payload: Vec::new(),
            error: Some(FabricError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Deserializes the JSON payload into the given type.
    ///
    /// Returns `Ok(None)` for an empty payload.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        if self.payload.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.payload)?))
    }

    /// Returns the metadata value for `key`, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.other_fields.get(key).map(String::as_str)
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
