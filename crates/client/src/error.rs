//! Send error types.

/// Errors produced while sending a file.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("service error {code}: {message}")]
    Service { code: i32, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cancelled")]
    Cancelled,

    #[error("transfer error: {0}")]
    Transfer(#[from] filexfer_transfer::TransferError),
}
