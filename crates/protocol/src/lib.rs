//! Wire protocol types for segmented file transfer over a request/response fabric.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{MessageKind, file_store_topic};
pub use envelope::{FabricError, Message};
pub use messages::{FieldError, FileSendResult, SegmentResponse, StoreSegmentRequest};
pub use types::{FileStoreResult, HashType, UnknownResult};
