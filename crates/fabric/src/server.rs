//! Fabric WebSocket server.
//!
//! Listens on a TCP port, upgrades every connection to WebSocket and
//! dispatches incoming requests to one [`RequestHandler`].

use std::net::SocketAddr;
use std::sync::Arc;

use filexfer_protocol::constants::FABRIC_MAX_MESSAGE_SIZE;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;

use crate::FabricError;
use crate::connection::{self, PeerConnection};
use crate::handler::RequestHandler;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            max_message_size: FABRIC_MAX_MESSAGE_SIZE,
        }
    }
}

/// The fabric WebSocket server.
pub struct FabricServer<H: RequestHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    peers: Mutex<Vec<PeerConnection>>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<H: RequestHandler> FabricServer<H> {
    /// Creates a new server with the given handler.
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            peers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Number of peers currently connected.
    pub async fn peer_count(&self) -> usize {
        let mut peers = self.peers.lock().await;
        peers.retain(|p| p.sender().is_connected());
        peers.len()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), FabricError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("fabric server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    for peer in self.peers.lock().await.drain(..) {
                        peer.close();
                    }
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one TCP connection to WebSocket and starts its pumps.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), FabricError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
        tracing::info!(%peer_addr, "WebSocket connection established");

        let conn = connection::spawn_connection(
            ws_stream,
            peer_addr.to_string(),
            Arc::clone(&self.handler),
            self.cancel.clone(),
        );

        let mut peers = self.peers.lock().await;
        peers.retain(|p| p.sender().is_connected());
        peers.push(conn);
        Ok(())
    }
}
