//! Switchyard - event router daemon
//!
//! Reads newline-delimited JSON events from stdin and routes them to the
//! handlers declared in the config file.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `SWITCHYARD_CONFIG`: Path to the TOML config (default: "config/switchyard.toml")
//! - `RUST_LOG`: Logging filter (default: "info")
//!
//! ## Example
//!
//! ```text
//! echo '{"category": "image.pull", "attributes": {"image": "alpine"}}' | switchyard
//! ```

use std::sync::Arc;
use switchyard::{LineSource, Router, SwitchyardConfig};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Resolves on Ctrl+C or SIGTERM.
async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SwitchyardConfig::load()?;
    let registry = config.build_registry();
    info!(
        categories = ?registry.categories(),
        handler_count = registry.handler_count(),
        "Handler registry built"
    );

    let source = Arc::new(LineSource::new("stdin", BufReader::new(tokio::io::stdin())));
    let router = Router::new(config.router.clone(), registry, source.clone())?;

    router.start().await?;

    tokio::select! {
        _ = termination_signal() => {}
        forwarded = source.finished() => {
            info!(events = forwarded, "Input exhausted, shutting down");
        }
    }

    let drained = router.shutdown(config.router.shutdown_grace()).await?;
    let stats = router.stats();
    info!(
        events_received = stats.events_received,
        events_completed = stats.events_completed,
        handler_failures = stats.handler_failures,
        drained,
        "Switchyard shutdown complete"
    );

    Ok(())
}
