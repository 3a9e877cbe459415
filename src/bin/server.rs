use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tuya_relay::{
    AppState, Collector, HeaderSource, RateLimiter, ServerConfig, Store, TuyaClient, build_app,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,tuya_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("Invalid configuration")?;

    let allowed_origin = config
        .allowed_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("ALLOWED_ORIGIN is not a valid header value")?;

    let client = match config.static_headers.clone() {
        Some(fixed) => {
            tracing::warn!("Using static auth headers from configuration; requests are not signed");
            TuyaClient::with_header_source(config.credentials.clone(), HeaderSource::Static(fixed))
        }
        None => TuyaClient::new(config.credentials.clone()),
    };
    let client = Arc::new(client.context("Failed to build upstream HTTP client")?);

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("Failed to open store at {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "Snapshot store opened");

    // Collector: once now, then every window
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector = Arc::new(Collector::new(Arc::clone(&client), store.clone()));
    let collector_task = collector.spawn(config.window, shutdown_rx);

    let state = AppState {
        client,
        store: store.clone(),
        limiter: Arc::new(RateLimiter::new(config.window)),
    };
    let app = build_app(state, allowed_origin);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        %addr,
        window_secs = config.window.as_secs(),
        device_id = %config.credentials.device_id,
        "Server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    // Stop the collector before the store goes away.
    let _ = shutdown_tx.send(true);
    if let Err(e) = collector_task.await {
        tracing::error!(error = %e, "Collector task panicked");
    }
    drop(store);

    served?;
    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
