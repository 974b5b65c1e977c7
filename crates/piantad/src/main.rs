//! Pianta Daemon - talks for the plant and stores its telemetry

use anyhow::Result;
use piantad::{AnthropicClient, AppState, DaemonConfig, SqliteStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Pianta Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = DaemonConfig::load();
    config.validate()?;

    let store = SqliteStore::open(&config.store.db_path)?;
    let model = AnthropicClient::new(&config.llm)?;
    info!(
        "  model {} (fallback: {})",
        config.llm.model,
        config.llm.fallback_model.as_deref().unwrap_or("none")
    );

    let state = AppState::new(config, Arc::new(store), Arc::new(model));
    piantad::server::run(state).await?;

    Ok(())
}
