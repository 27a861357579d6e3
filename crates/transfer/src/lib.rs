//! Segmented file transfer: streaming segment reader on the sending side,
//! sequenced reconstruction with integrity checks on the receiving side.

mod chunked;
mod registry;
mod store;
mod types;
mod validation;

use std::sync::{Mutex, MutexGuard, PoisonError};

use filexfer_protocol::FieldError;

pub use chunked::{SegmentReader, checksum_bytes, segment_count};
pub use filexfer_protocol::constants::{DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_WORKING_SUBDIR};
pub use registry::FileEntryRegistry;
pub use store::FileStoreManager;
pub use types::FileEntry;
pub use validation::{resolve_destination, validate_file_id};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unexpected segment: expected {expected}, received {received}")]
    Sequence { expected: u64, received: u64 },

    #[error("integrity error: {0}")]
    Integrity(String),
}

impl From<FieldError> for TransferError {
    fn from(e: FieldError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
