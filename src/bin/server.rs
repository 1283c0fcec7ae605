use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use rust_metrics_pipeline::{
    config::ServerConfig,
    logging, repository,
    server::{self, AppState},
    service::MetricsService,
    shutdown::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    logging::init(&config.log_level);

    // ── 1. Open storage ─────────────────────────────────────────
    let settings = config.storage_settings();
    info!("Opening {:?} storage", settings.backend());
    let repo = repository::open(&settings)
        .await
        .context("opening metric storage")?;

    // ── 2. Build shared state ───────────────────────────────────
    let service = Arc::new(MetricsService::new(repo, config.signer(), config.persistence()));
    let state = Arc::new(AppState {
        service: service.clone(),
    });

    // ── 3. Build Axum router ────────────────────────────────────
    let app = server::create_router(state);

    // ── 4. Bind & serve ─────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("binding {}", config.address))?;
    info!("Server listening on http://{}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // ── 5. Final flush ──────────────────────────────────────────
    service.shutdown().await.context("flushing on shutdown")?;
    info!("Server stopped");
    Ok(())
}
