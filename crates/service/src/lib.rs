//! File store service.
//!
//! Answers requests on the file-store topic by feeding each segment to a
//! [`FileStoreManager`] and replying with the segment response, or with an
//! error response carrying a status code.

mod service;

pub use service::FileStoreService;

use filexfer_protocol::constants::{ERR_CODE_BAD_REQUEST, ERR_CODE_INTERNAL, ERR_CODE_NOT_FOUND};
use filexfer_transfer::TransferError;

/// Errors produced while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

impl ServiceError {
    /// Fabric error code reported to the sender.
    pub fn code(&self) -> i32 {
        match self {
            Self::UnknownTopic(_) => ERR_CODE_NOT_FOUND,
            Self::Transfer(TransferError::Io(_)) => ERR_CODE_INTERNAL,
            Self::Transfer(_) => ERR_CODE_BAD_REQUEST,
            Self::Json(_) | Self::Task(_) => ERR_CODE_INTERNAL,
        }
    }
}
