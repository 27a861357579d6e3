//! Sending side of segmented file transfer.
//!
//! This crate holds the **sender state machine** only. It has no transport
//! dependency: callers provide a `FabricConnection` that delivers one request
//! and returns its response.
//!
//! # Protocol
//!
//! 1. **Segment**: read the source in bounded segments, hashing as we go
//! 2. **Send**: one request per segment, strictly in order
//! 3. **Store**: the terminal segment carries size and SHA-256
//! 4. **Cancel**: any failure after the receiver assigned a file id sends
//!    a single best-effort cancel

pub mod client;
pub mod connection;
pub mod error;
pub mod types;

// Re-export primary types for convenience.
pub use client::FileTransferClient;
pub use connection::FabricConnection;
pub use error::SendError;
pub use types::{ProgressObserver, SegmentProgress};
