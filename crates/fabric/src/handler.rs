//! Handler trait for processing fabric requests.
//!
//! Implementors provide the service logic; the server framework handles
//! connections, framing and keepalive.

use std::future::Future;
use std::pin::Pin;

use filexfer_protocol::envelope::Message;

use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling requests arriving on a fabric connection.
///
/// Requests from one peer are handled in arrival order; requests from
/// different peers run concurrently.
pub trait RequestHandler: Send + Sync + 'static {
    /// Called for every request. The handler replies through `sender`,
    /// normally with [`Message::reply`] or [`Message::reply_error`].
    fn on_request(&self, sender: Sender, msg: Message) -> HandlerFuture<'_>;

    /// Called when a peer disconnects (cleanup hook).
    fn on_peer_disconnected(&self, remote_addr: &str) -> HandlerFuture<'_> {
        let _ = remote_addr;
        Box::pin(async {})
    }
}
