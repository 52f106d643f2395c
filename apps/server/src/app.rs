//! Wires storage, the upload service, the sweeper and the HTTP listener.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use orderdesk_blob_store::FsBlobStore;
use orderdesk_upload_server::{
    AppState, MemoryCatalog, UploadService, create_router, spawn_sweeper,
};

use crate::config::ServerConfig;

/// Serves the upload API until `shutdown` is cancelled.
pub async fn run(config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let blobs = Arc::new(
        FsBlobStore::new(&config.storage.root)
            .with_context(|| format!("failed to open storage at {}", config.storage.root.display()))?,
    );
    let catalog = Arc::new(MemoryCatalog::seeded(
        blobs.clone(),
        config.catalog.orders.iter().copied(),
        config.catalog.products.iter().copied(),
    ));
    let service = UploadService::new(blobs.clone(), catalog, config.service_config());

    let sweeper = spawn_sweeper(service.clone(), config.sweep_config(), shutdown.clone());
    let router = create_router(AppState::new(service));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(
        addr = %listener.local_addr()?,
        root = %blobs.root().display(),
        orders = config.catalog.orders.len(),
        products = config.catalog.products.len(),
        "upload server listening"
    );

    let stop = shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await;

    // Stop the sweeper even if the server failed.
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("sweeper task failed: {e}");
    }
    served.context("server error")?;

    info!("upload server stopped");
    Ok(())
}
