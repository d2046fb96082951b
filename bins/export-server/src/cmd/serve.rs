use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use export_api::BatchStorage;
use export_api_server::AppState;
use export_engine::{Pager, Tailer};
use storage_file::FileStorage;
use storage_memory::MemoryStorage;

use crate::config::{ServeArgs, ServerConfig, StorageConfig};
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("export-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");

    // --- Open storage ---
    let storage = open_storage(&config.storage).await?;
    tracing::info!(kind = config.storage.kind(), "opened storage");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    let tailer = Arc::new(Tailer::new(storage.clone(), config.tail.clone()));
    let pager = Arc::new(Pager::new(storage));
    let state = AppState::new(tailer, pager, config.ws_buffer, config.page_count, token.clone());

    tracing::info!(
        port = config.api_port,
        poll_interval_ms = config.tail.poll_interval_ms,
        emit_empty = config.tail.emit_empty,
        "starting export api"
    );
    let port = config.api_port;
    let mut api = tokio::spawn(async move { export_api_server::run(port, state).await });

    // --- Wait for Ctrl+C or an early API failure ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(ServerError::Signal)?;
            tracing::info!("shutdown signal received");
            token.cancel();
            api.await?.map_err(ServerError::Api)?;
        }
        served = &mut api => {
            token.cancel();
            served?.map_err(ServerError::Api)?;
            tracing::warn!("export api stopped before shutdown signal");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn open_storage(config: &StorageConfig) -> Result<Arc<dyn BatchStorage>, ServerError> {
    Ok(match config {
        StorageConfig::Memory(cfg) => Arc::new(MemoryStorage::open(cfg).await?),
        StorageConfig::File(cfg) => Arc::new(FileStorage::new(cfg)),
    })
}
