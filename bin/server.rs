// Exit Watch - Web Server
// REST API with Axum, plus the hourly ingestion task

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use exit_watch::api::{build_router, AppState};
use exit_watch::{
    init_tracing, scheduler, AllowlistManager, Config, IngestionPipeline, QueryEngine, SqliteStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;

    // Without a database there is nothing to serve
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    info!(path = %config.db_path.display(), "database opened");

    // Ingestion runs now, then every refresh interval, off the request path
    let pipeline = IngestionPipeline::from_config(&config, store.clone())?;
    let ingestion = scheduler::spawn(Arc::new(pipeline), config.refresh_interval);

    let state = AppState {
        queries: QueryEngine::new(store.clone(), store.clone()),
        allowlist: AllowlistManager::new(store),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    ingestion.abort();
    info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
