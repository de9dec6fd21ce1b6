//! # Quan POS Server
//!
//! HTTP + WebSocket back end for table service.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. tracing (RUST_LOG, default "info,quan=debug")                       │
//! │  2. AppConfig: defaults < TOML (--config / QUAN_CONFIG) < QUAN_* env    │
//! │  3. Engine::open → SQLite + migrations                                  │
//! │  4. bootstrap admin (first start only)                                  │
//! │  5. escalation worker + realtime heartbeat                              │
//! │  6. axum::serve until Ctrl-C / SIGTERM, then stop background tasks      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quan_engine::{AppConfig, Engine};
use quan_server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,quan=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Quan POS server...");

    // Load configuration
    let config = AppConfig::load(config_path_arg()).context("loading configuration")?;
    info!(
        bind = %config.server.bind_address(),
        database = %config.database.resolved_path().display(),
        escalation = config.escalation.enabled,
        "Configuration loaded"
    );

    // Connect to database
    let engine = Engine::open(&config).await.context("opening database")?;

    if let Some(admin) = engine.auth.ensure_bootstrap_admin(&config.auth).await? {
        info!(username = %admin.username, "Bootstrap admin ready");
    }

    // Background tasks
    let tasks = engine.spawn_background(&config);

    // Start server
    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "Listening");

    let app = router(AppState {
        engine: engine.clone(),
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tasks.shutdown().await;
    engine.db().close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// `--config <path>` from the command line.
fn config_path_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
