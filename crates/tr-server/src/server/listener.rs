//! TCP accept loop
//!
//! The server config is re-read before every accept. If the port changed,
//! the listener is rebound before the next connection is taken.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use tr_core::config::{self, ServerConfig};

use crate::server::handler::SessionHandler;
use crate::state::ServerState;

/// Where the server config comes from, plus command-line overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Config file; defaults are used when absent
    pub path: Option<PathBuf>,
    /// Port that takes precedence over the file
    pub port_override: Option<u16>,
}

impl ConfigSource {
    /// Load the current configuration
    ///
    /// A missing file is created with defaults; a broken one falls back to
    /// defaults with a warning.
    pub fn load(&self) -> Result<ServerConfig> {
        let mut loaded = match &self.path {
            Some(path) => config::load_or_create(path)
                .with_context(|| format!("Failed to load server config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port_override {
            loaded.port = port;
        }
        Ok(loaded)
    }

    /// Re-read the configuration between accepts
    ///
    /// Unlike [`ConfigSource::load`], a missing or broken file is an error
    /// so the caller can keep its previous settings.
    pub fn reload(&self) -> Result<ServerConfig> {
        let mut loaded = match &self.path {
            Some(path) => config::load_config(path)
                .with_context(|| format!("Failed to reload server config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port_override {
            loaded.port = port;
        }
        Ok(loaded)
    }
}

/// Accepts relay clients and spawns a session task per connection
pub struct RelayServer {
    source: ConfigSource,
    state: Arc<ServerState>,
    cancel: CancellationToken,
}

impl RelayServer {
    pub fn new(source: ConfigSource, state: Arc<ServerState>, cancel: CancellationToken) -> Self {
        Self {
            source,
            state,
            cancel,
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Run the accept loop until cancelled
    pub async fn run(&self) -> Result<()> {
        let mut current = self.source.load()?;
        let mut listener = bind(&current).await?;

        loop {
            let latest = match self.source.reload() {
                Ok(latest) => latest,
                Err(e) => {
                    tracing::warn!("{:#}; keeping previous configuration", e);
                    current.clone()
                }
            };

            if latest.bind_address() != current.bind_address() {
                match bind(&latest).await {
                    Ok(rebound) => {
                        tracing::info!(
                            "Listen address changed from {} to {}",
                            current.bind_address(),
                            latest.bind_address()
                        );
                        listener = rebound;
                    }
                    Err(e) => {
                        tracing::error!("{:#}; still listening on {}", e, current.bind_address());
                    }
                }
            }
            current = latest;

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            self.handle_connection(socket, peer_addr, &current);
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Spawn the session task for one accepted socket
    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr, current: &ServerConfig) {
        tracing::info!("New connection from {}", peer_addr);

        let handler = SessionHandler::new(
            Arc::clone(&self.state.registry),
            self.state.runner_for(&current.executor),
            peer_addr.ip(),
        );
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            handler.run(socket, cancel).await;
            tracing::debug!("Connection from {} closed", peer_addr);
        });
    }
}

async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;

    let local_addr = listener.local_addr()?;
    tracing::info!("Listening on {}", local_addr);
    Ok(listener)
}
