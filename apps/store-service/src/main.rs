//! File store service entry point.

mod app;
mod config;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting file store service"
    );

    let config = config::Config::load()?;
    tracing::info!(storage_dir = %config.storage_dir.display(), port = config.port, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("file store service shut down cleanly");
    Ok(())
}
