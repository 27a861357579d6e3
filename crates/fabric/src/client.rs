//! Fabric WebSocket client.
//!
//! Implements the request/response pattern with UUID correlation and
//! ping/pong keepalive.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use filexfer_client::{FabricConnection, SendError};
use filexfer_protocol::constants::{
    FABRIC_MAX_MESSAGE_SIZE, FABRIC_PONG_WAIT, FABRIC_REQUEST_TIMEOUT,
};
use filexfer_protocol::envelope::Message;
use futures_util::{Stream, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::FabricError;
use crate::connection::write_pump;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on one request/response round trip.
    pub request_timeout: Duration,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: FABRIC_REQUEST_TIMEOUT,
            max_message_size: FABRIC_MAX_MESSAGE_SIZE,
        }
    }
}

/// WebSocket client connected to one fabric server.
pub struct FabricClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    request_timeout: Duration,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl FabricClient {
    /// Connects with the default configuration.
    pub async fn connect(url: &str) -> Result<Self, FabricError> {
        Self::connect_with_config(url, ClientConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: ClientConfig) -> Result<Self, FabricError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.max_frame_size = Some(config.max_message_size);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(crate::SEND_BUFFER_SIZE);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(write_pump(write, write_rx, cancel.clone()));

        let read_handle = {
            let pending = pending.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                read_pump(read, pending, write_tx, cancel.clone()).await;
                cancel.cancel();
            })
        };

        debug!(url = %url, "connected to fabric");
        Ok(Self {
            write_tx,
            pending,
            request_timeout: config.request_timeout,
            _read_handle: read_handle,
            _write_handle: write_handle,
            cancel,
        })
    }

    /// Sends a request to `topic` and waits for the response.
    ///
    /// Error responses are returned as messages; inspect
    /// [`Message::error`].
    pub async fn send_request(
        &self,
        topic: &str,
        other_fields: BTreeMap<String, String>,
        payload: Vec<u8>,
    ) -> Result<Message, FabricError> {
        if self.cancel.is_cancelled() {
            return Err(FabricError::Closed);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::request(&id, topic, other_fields, payload);
        let json = serde_json::to_string(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self
            .write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(FabricError::Closed);
        }

        let result = tokio::time::timeout(self.request_timeout, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(FabricError::Closed),
            Err(_) => Err(FabricError::Timeout),
        }
    }

    /// Returns `true` until the connection is closed from either side.
    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Gracefully closes the connection.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl FabricConnection for FabricClient {
    fn request(
        &self,
        topic: &str,
        other_fields: BTreeMap<String, String>,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<Message, SendError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.send_request(&topic, other_fields, payload)
                .await
                .map_err(SendError::from)
        })
    }
}

impl Drop for FabricClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
    }
}

/// Routes responses to their waiting requests.
///
/// On exit every outstanding request fails with `Closed`.
async fn read_pump<S>(
    mut read: S,
    pending: PendingMap,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(FABRIC_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("pong timeout, connection dead, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + FABRIC_PONG_WAIT);
                        match msg {
                            tungstenite::Message::Text(text) => {
                                route_response(&text, &pending).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Fail outstanding requests immediately.
    pending.lock().await.clear();
}

async fn route_response(text: &str, pending: &PendingMap) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    trace!(kind = ?msg.kind, id = %msg.id, "received message");

    match pending.lock().await.remove(&msg.id) {
        Some(tx) => {
            let _ = tx.send(msg);
        }
        None => warn!(id = %msg.id, "no pending request for response, dropping"),
    }
}
