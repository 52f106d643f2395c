mod app;
mod config;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,orderdesk=debug,tower_http=debug")),
        )
        .init();

    let config = ServerConfig::load()?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::warn!("failed to listen for ctrl-c: {e}"),
        }
    });

    app::run(config, shutdown).await
}
