//! Messaging fabric boundary.
//!
//! `FabricConnection` is implemented by whatever transport carries the
//! requests; the reference WebSocket fabric provides one, tests use mocks.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use filexfer_protocol::envelope::Message;

use crate::error::SendError;

/// Synchronous request/response delivery to a topic.
pub trait FabricConnection: Send + Sync {
    /// Sends a request to `topic` and waits for the response.
    ///
    /// Error responses are returned as messages; only delivery failures
    /// (disconnect, timeout) are errors here.
    fn request(
        &self,
        topic: &str,
        other_fields: BTreeMap<String, String>,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<Message, SendError>> + Send + '_>>;
}
