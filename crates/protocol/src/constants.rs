use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service type prefix of every file-transfer topic.
pub const SERVICE_TYPE: &str = "/filexfer/service/file-transfer";

/// Topic fragment for the "file store" method.
pub const FILE_STORE_METHOD: &str = "file/store";

/// Default segment size used by the sender (1 KiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 1024;

/// Maximum fabric message size in bytes (1 MiB).
///
/// Segments are base64-encoded inside a JSON envelope, so the usable
/// payload per message is roughly three quarters of this.
pub const FABRIC_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Timeout for a synchronous request/response round trip.
pub const FABRIC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed without any incoming frame before a connection is dropped.
pub const FABRIC_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often the server pings its peers.
pub const FABRIC_PING_PERIOD: Duration = Duration::from_secs(15);

/// Name of the hidden working subdirectory under the storage root.
pub const DEFAULT_WORKING_SUBDIR: &str = ".workdir";

/// Builds the file-store request topic.
///
/// A `service_id` scopes the topic to one store service when several
/// share the fabric.
pub fn file_store_topic(service_id: Option<&str>) -> String {
    match service_id {
        Some(id) if !id.is_empty() => format!("{SERVICE_TYPE}/{id}/{FILE_STORE_METHOD}"),
        _ => format!("{SERVICE_TYPE}/{FILE_STORE_METHOD}"),
    }
}

/// Metadata field names carried in `other_fields`.
pub mod fields {
    pub const FILE_ID: &str = "file_id";
    pub const NAME: &str = "name";
    pub const SEGMENT_NUMBER: &str = "segment_number";
    pub const SIZE: &str = "size";
    pub const HASH_SHA256: &str = "hash_sha256";
    pub const RESULT: &str = "result";
    pub const SEGMENTS_RECEIVED: &str = "segments_received";
    pub const TOTAL_SEGMENTS: &str = "total_segments";
}

/// Kind of fabric message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Error,

    /// Forward compatibility: unknown kinds deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common fabric error codes.
pub const ERR_CODE_BAD_REQUEST: i32 = 400;
pub const ERR_CODE_NOT_FOUND: i32 = 404;
pub const ERR_CODE_INTERNAL: i32 = 500;
