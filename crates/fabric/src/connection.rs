//! Peer connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use filexfer_protocol::constants::{FABRIC_PING_PERIOD, FABRIC_PONG_WAIT, MessageKind};
use filexfer_protocol::envelope::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::SEND_BUFFER_SIZE;
use crate::handler::RequestHandler;

/// Handle for sending messages to a connected peer.
///
/// Cloneable and cheap: wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Queues a [`Message`] as JSON text.
    ///
    /// Returns `Err` only if the queue is full or the peer is gone.
    pub fn send_msg(&self, msg: Message) -> Result<(), QueueError> {
        let json = serde_json::to_string(&msg).map_err(|_| QueueError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            warn!(id = %msg.id, "send buffer full or closed, dropping message");
            QueueError
        })
    }

    /// Queues an error response for the given request.
    pub fn send_error(&self, req: &Message, code: i32, message: &str) -> Result<(), QueueError> {
        self.send_msg(req.reply_error(code, message))
    }

    /// Returns `true` if the connection is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Error returned when the outbound queue is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct QueueError;

/// Active connection to a peer.
///
/// Owns the read/write pump tasks and provides a [`Sender`] for replies.
pub struct PeerConnection {
    pub remote_addr: String,
    sender: Sender,
    cancel: CancellationToken,
}

impl PeerConnection {
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Signals the pumps to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Starts the read and write pumps for an accepted WebSocket.
///
/// The pumps run as background tasks and stop when the peer goes away or
/// `server_cancel` fires.
pub fn spawn_connection<S, H>(
    ws_stream: S,
    remote_addr: String,
    handler: Arc<H>,
    server_cancel: CancellationToken,
) -> PeerConnection
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>>
        + Sink<WsMessage, Error = tungstenite::Error>
        + Send
        + 'static,
    H: RequestHandler,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let sender = Sender { tx };

    let conn = PeerConnection {
        remote_addr: remote_addr.clone(),
        sender: sender.clone(),
        cancel: cancel.clone(),
    };

    let (ws_sink, ws_stream) = ws_stream.split();

    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    tokio::spawn(async move {
        read_pump(ws_stream, sender, &handler, cancel.clone()).await;
        // Reader gone: stop the writer too.
        cancel.cancel();
        handler.on_peer_disconnected(&remote_addr).await;
        info!(peer = %remote_addr, "peer disconnected");
    });

    conn
}

/// Write pump: drains the outbound queue and sends keepalive pings.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<WsMessage>,
    cancel: CancellationToken,
) where
    S: Sink<WsMessage, Error = tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(FABRIC_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}

/// Read pump: parses requests and hands them to the handler in order.
///
/// Any incoming frame resets the liveness deadline. Oversized frames never
/// get here: tungstenite fails the stream once the configured limit is hit.
async fn read_pump<S, H>(
    mut stream: S,
    sender: Sender,
    handler: &Arc<H>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Send + Unpin,
    H: RequestHandler,
{
    let deadline = tokio::time::sleep(FABRIC_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("pong timeout, closing connection");
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(ws_msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + FABRIC_PONG_WAIT);
                        match ws_msg {
                            WsMessage::Text(text) => {
                                dispatch_text(handler, &sender, &text).await;
                            }
                            WsMessage::Binary(data) => {
                                warn!(bytes = data.len(), "binary frames are not supported, dropping");
                            }
                            WsMessage::Ping(data) => {
                                let _ = sender.tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Pong(_) => trace!("received pong"),
                            WsMessage::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            WsMessage::Frame(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        error!("read pump error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

/// Dispatches a text (JSON) message to the handler.
async fn dispatch_text<H: RequestHandler>(handler: &Arc<H>, sender: &Sender, text: &str) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            error!("invalid message JSON: {e}");
            return;
        }
    };

    match msg.kind {
        MessageKind::Request => handler.on_request(sender.clone(), msg).await,
        kind => warn!(?kind, id = %msg.id, "ignoring non-request message"),
    }
}
