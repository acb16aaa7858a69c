mod routes;

use anyhow::Context;
use routes::{router, AppState};
use sift_ai::AiService;
use sift_config::ConfigManager;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let manager = ConfigManager::new().context("failed to locate config directory")?;
    let config = manager
        .load()
        .with_context(|| format!("failed to load {}", manager.config_path().display()))?;

    let ai = AiService::from_config(&config.ai);
    tracing::info!(remote = ai.is_remote(), model = %config.ai.model, "triage service ready");

    let app = router(
        AppState { ai: Arc::new(ai) },
        config.server.body_limit_bytes,
    );
    let bind = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;
    tracing::info!(bind = %bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    tracing::info!("server shut down");
    Ok(())
}
