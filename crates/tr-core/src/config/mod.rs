//! Configuration management for term-relay

mod client;
mod host;
mod server;
pub mod serde_utils;

pub use client::{default_identity, ClientConfig, DispatchConfig};
pub use host::HostEntry;
pub use server::{ExecutorConfig, ServerConfig, TerminalEmulator};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("term-relay")
}

/// Default path of the client configuration file
pub fn default_client_config_path() -> PathBuf {
    default_config_dir().join("client.toml")
}

/// Default path of the server configuration file
pub fn default_server_config_path() -> PathBuf {
    default_config_dir().join("server.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
        }
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Load configuration, writing the defaults to disk first if the file is missing
///
/// A file that exists but does not parse is reported with a warning and the
/// defaults are used for this run; the broken file is left untouched.
pub fn load_or_create<T>(path: &Path) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + serde::Serialize + Default,
{
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            tracing::info!("No config at {:?}, writing defaults", path);
            let config = T::default();
            save_config(path, &config)?;
            Ok(config)
        }
        Err(e) => {
            tracing::warn!("Failed to load config from {:?}: {}; using defaults", path, e);
            Ok(T::default())
        }
    }
}
