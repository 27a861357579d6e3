use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::fields;
use crate::types::{FileStoreResult, UnknownResult};

// ---------------------------------------------------------------------------
// Request metadata
// ---------------------------------------------------------------------------

/// Errors produced while decoding request metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("'{field}' of '{value}' could not be converted to an integer")]
    InvalidInteger { field: &'static str, value: String },

    #[error(transparent)]
    UnknownResult(#[from] UnknownResult),
}

/// Typed view of the metadata attached to one file-store request.
///
/// On the wire every field is a string in `other_fields`; empty values
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSegmentRequest {
    pub file_id: Option<String>,
    pub name: Option<String>,
    pub segment_number: Option<u64>,
    pub size: Option<u64>,
    pub hash_sha256: Option<String>,
    pub result: Option<FileStoreResult>,
    pub total_segments: Option<u64>,
}

impl StoreSegmentRequest {
    /// Decodes request metadata from a fabric message's `other_fields`.
    pub fn from_fields(other_fields: &BTreeMap<String, String>) -> Result<Self, FieldError> {
        let text = |key: &str| {
            other_fields
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
        };

        let result = match text(fields::RESULT) {
            Some(value) => Some(value.parse::<FileStoreResult>()?),
            None => None,
        };

        Ok(Self {
            file_id: text(fields::FILE_ID),
            name: text(fields::NAME),
            segment_number: parse_integer(other_fields, fields::SEGMENT_NUMBER)?,
            size: parse_integer(other_fields, fields::SIZE)?,
            hash_sha256: text(fields::HASH_SHA256),
            result,
            total_segments: parse_integer(other_fields, fields::TOTAL_SEGMENTS)?,
        })
    }

    /// Encodes the metadata into `other_fields`, skipping absent values.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                out.insert(key.to_string(), v);
            }
        };

        put(fields::FILE_ID, self.file_id.clone());
        put(fields::NAME, self.name.clone());
        put(
            fields::SEGMENT_NUMBER,
            self.segment_number.map(|n| n.to_string()),
        );
        put(fields::SIZE, self.size.map(|n| n.to_string()));
        put(fields::HASH_SHA256, self.hash_sha256.clone());
        put(fields::RESULT, self.result.map(|r| r.as_str().to_string()));
        put(
            fields::TOTAL_SEGMENTS,
            self.total_segments.map(|n| n.to_string()),
        );
        out
    }
}

fn parse_integer(
    other_fields: &BTreeMap<String, String>,
    field: &'static str,
) -> Result<Option<u64>, FieldError> {
    match other_fields.get(field).filter(|v| !v.is_empty()) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| FieldError::InvalidInteger {
                field,
                value: value.clone(),
            }),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Receiver's answer to one file-store request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub file_id: String,
    pub segments_received: u64,
    /// Present only when the request ended the transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FileStoreResult>,
}

/// Outcome of a completed send, returned to the caller of the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSendResult {
    pub file_id: String,
    pub size: u64,
    /// Hash algorithm name to hex digest.
    pub hashes: BTreeMap<String, String>,
}
