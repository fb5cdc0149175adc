//! Mini Memcached - a memcached-compatible in-process cache server

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_memcached::{api::create_router, spawn_scavenger_task, AppState, Config};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the partitioned store and cache engine
/// 4. Start the delayed-delete scavenger
/// 5. Serve the HTTP API until Ctrl+C/SIGTERM, then close the engine
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_memcached=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mini Memcached Cache Server");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        partitions = config.partitions,
        block_size = config.block_size,
        max_bytes = config.max_bytes,
        max_items = config.max_items,
        buckets = config.partition_buckets,
        port = config.server_port,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to build cache store")?;
    let cache = state.cache.clone();
    info!(capacity = cache.memory_capacity(), "Cache store initialized");

    let scavenger = spawn_scavenger_task(cache.clone(), config.scavenger_interval);

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scavenger))
        .await
        .context("server error")?;

    cache.close();
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the scavenger.
async fn shutdown_signal(scavenger: JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    scavenger.abort();
    warn!("Scavenger task aborted");
}
