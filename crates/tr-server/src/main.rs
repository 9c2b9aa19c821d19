//! term-relay server daemon
//!
//! Listens for relay clients and runs the commands they send.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use tr_core::config;
use tr_core::logging::{init_tracing, BoundedLogFile, DEFAULT_LOG_MAX_LINES};
use tr_server::{ConfigSource, RelayServer, ServerState};

#[derive(Parser)]
#[command(name = "tr-server")]
#[command(about = "term-relay server - runs commands received from relay clients")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write logs to this bounded file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    let log_file = args
        .log_file
        .as_ref()
        .map(|path| BoundedLogFile::new(path, DEFAULT_LOG_MAX_LINES));
    init_tracing(log_level, log_file);

    tracing::info!("term-relay server starting...");

    let source = ConfigSource {
        path: Some(
            args.config
                .clone()
                .unwrap_or_else(config::default_server_config_path),
        ),
        port_override: args.port,
    };
    let initial = source.load().context("Failed to load configuration")?;
    tracing::info!(
        "Using configuration from {:?} (port {})",
        source.path,
        initial.port
    );

    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let state = Arc::new(ServerState::new());
    let server = RelayServer::new(source, Arc::clone(&state), cancel);
    server.run().await.context("Server failed")?;

    let remaining = state.registry.len().await;
    if remaining > 0 {
        tracing::info!("Dropping {} connected client(s)", remaining);
    }
    tracing::info!("term-relay server stopped");
    Ok(())
}
