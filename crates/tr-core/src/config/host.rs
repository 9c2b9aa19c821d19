//! Per-host configuration entry

use serde::{Deserialize, Serialize};

/// One remote host the client may dispatch to, as written in the config file
///
/// Missing fields are allowed on disk; the client prompts for them in manual
/// mode and writes them back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Hostname or IP address of the server
    #[serde(default)]
    pub address: String,

    /// Listening port of the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Identity sent as the handshake line
    #[serde(default)]
    pub name: String,

    /// `;`-separated commands sent after the handshake in automatic mode
    #[serde(default)]
    pub auto_command: String,
}

impl HostEntry {
    /// Create a complete entry with no auto-command script
    pub fn new(address: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: Some(port),
            name: name.into(),
            auto_command: String::new(),
        }
    }

    /// Set the auto-command script
    pub fn with_auto_command(mut self, script: impl Into<String>) -> Self {
        self.auto_command = script.into();
        self
    }

    /// Whether address, port and name are all present
    pub fn is_complete(&self) -> bool {
        !self.address.trim().is_empty() && self.port.is_some() && !self.name.trim().is_empty()
    }
}
