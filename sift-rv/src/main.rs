//! sift-rv - Review Service
//!
//! HTTP service for model-assisted document screening: projects hold a
//! fixed document pool, a label store, and a background-trained ranking
//! that drives the review loop.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sift_common::events::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sift_rv::AppState;

/// Command-line arguments for sift-rv
#[derive(Parser, Debug)]
#[command(name = "sift-rv")]
#[command(about = "Review service for model-assisted document screening")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5730", env = "SIFT_RV_PORT")]
    port: u16,

    /// Path to the SQLite database file
    #[arg(short, long, default_value = "sift.db", env = "SIFT_RV_DATABASE")]
    database: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sift_rv=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting sift-rv review service on port {}", args.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", args.database.display());

    let db_pool = sift_rv::db::init_database_pool(&args.database)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);
    let state = AppState::new(db_pool, event_bus);
    let app = sift_rv::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
