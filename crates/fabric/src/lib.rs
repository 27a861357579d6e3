//! Request/response messaging fabric over WebSocket.
//!
//! The server accepts any number of peers, hands every request to a
//! [`RequestHandler`], and manages connection lifecycle (ping/pong,
//! graceful shutdown). The client correlates responses to requests by
//! UUID and bounds every round trip with a timeout.

mod client;
mod connection;
mod handler;
mod server;

pub use client::{ClientConfig, FabricClient};
pub use connection::{PeerConnection, QueueError, Sender};
pub use handler::{HandlerFuture, RequestHandler};
pub use server::{FabricServer, ServerConfig};

/// Outbound queue capacity per connection.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the fabric.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}

impl From<FabricError> for filexfer_client::SendError {
    fn from(e: FabricError) -> Self {
        match e {
            FabricError::Timeout => Self::Timeout,
            FabricError::Io(e) => Self::Io(e),
            FabricError::Json(e) => Self::Json(e),
            other => Self::Transport(other.to_string()),
        }
    }
}
