//! Voxrelay server binary

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxrelay_core::ProxyConfig;
use voxrelay_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProxyConfig::from_env()?;

    // RUST_LOG takes precedence over LOG_LEVEL
    let level = config.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("voxrelay_server={level},voxrelay_core={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Voxrelay");
    info!("Gemini model: {}", config.gemini_model);
    info!("Encoder: {}", config.ffmpeg_path);

    let addr = config.bind_addr();
    let state = AppState::new(config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
