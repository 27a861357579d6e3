//! Application orchestrator: wires the store manager to the fabric server.

use std::sync::Arc;

use filexfer_fabric::{FabricServer, ServerConfig};
use filexfer_service::FileStoreService;
use filexfer_transfer::FileStoreManager;

use crate::config::Config;

/// Runs the service until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let manager = FileStoreManager::new(&config.storage_dir, config.working_dir.as_deref())?;
    let service = FileStoreService::new(manager, config.service_id.as_deref());
    let topic = service.topic().to_string();

    let server_config = ServerConfig {
        port: config.port,
        max_message_size: config.max_message_size,
    };
    let server = FabricServer::new(server_config, service);
    let cancel = server.cancel_token();

    let server_run = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { server_run.run().await });

    tracing::info!(topic = %topic, "accepting file store requests");

    tokio::select! {
        result = &mut server_task => {
            // Returns early only when the listener fails to bind.
            result??;
            return Ok(());
        }
        _ = cancel.cancelled() => {
            tracing::info!("shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }

    server.shutdown();
    server_task.await??;

    let pending = server.handler().manager().active_transfers();
    if !pending.is_empty() {
        tracing::info!(count = pending.len(), "incomplete transfers left for purge on next start");
    }
    Ok(())
}
