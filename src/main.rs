mod config;
mod error;
mod models;
mod routes;
mod services;
mod state;
mod store;

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::services::cleanup::start_cleanup_loop;
use crate::services::media_engine::FfmpegEngine;
use crate::services::worker::start_worker;
use crate::state::AppState;
use crate::store::redis_store::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(port = config.port, "starting mediaqueue-server");

    std::fs::create_dir_all(&config.uploads_dir)?;
    std::fs::create_dir_all(&config.results_dir)?;
    std::fs::create_dir_all(&config.scratch_dir)?;

    let store: Arc<dyn store::KvStore> = Arc::new(RedisStore::connect(&config.valkey_url()).await?);
    let engine: Arc<dyn services::media_engine::MediaEngine> = Arc::new(FfmpegEngine::new());
    let state = Arc::new(AppState::new(store, config.clone(), engine));

    let cancel = CancellationToken::new();
    start_worker(state.clone(), cancel.clone());
    start_cleanup_loop(state.clone(), cancel.clone());

    let app = routes::create_router(state.clone());
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    tracing::info!("shutting down");
    cancel.cancel();

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }
}
