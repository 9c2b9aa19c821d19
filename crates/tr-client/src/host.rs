//! Host descriptors: configuration plus live retry state for one server

use std::fmt;

use tokio::time::Instant;

use tr_core::config::HostEntry;
use tr_core::ConnectionState;

/// Address, port and identity used to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    /// Hostname or IP address
    pub address: String,
    /// TCP port
    pub port: u16,
    /// Identity sent as the handshake line
    pub name: String,
}

impl HostTarget {
    /// Key used for this host in the dispatcher's session map
    pub fn key(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.address, self.port)
    }
}

/// One remote target and its connection bookkeeping
///
/// Retry state persists across attempts for the whole run.
#[derive(Debug, Clone)]
pub struct HostDescriptor {
    target: HostTarget,
    auto_command: String,
    state: ConnectionState,
    last_attempt: Option<Instant>,
    retry_count: u32,
    script_delivered: bool,
}

impl HostDescriptor {
    /// Create a descriptor with no auto-command script
    pub fn new(address: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            target: HostTarget {
                address: address.into(),
                port,
                name: name.into(),
            },
            auto_command: String::new(),
            state: ConnectionState::Disconnected,
            last_attempt: None,
            retry_count: 0,
            script_delivered: false,
        }
    }

    /// Build a descriptor from a config entry; `None` if a field is missing
    pub fn from_entry(entry: &HostEntry) -> Option<Self> {
        if !entry.is_complete() {
            return None;
        }
        let port = entry.port?;
        Some(
            Self::new(entry.address.trim(), port, entry.name.trim())
                .with_auto_command(entry.auto_command.clone()),
        )
    }

    /// Set the auto-command script
    pub fn with_auto_command(mut self, script: impl Into<String>) -> Self {
        self.auto_command = script.into();
        self
    }

    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn key(&self) -> String {
        self.target.key()
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    pub fn auto_command(&self) -> &str {
        &self.auto_command
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether this host's auto-command script went out during this run
    pub fn is_delivered(&self) -> bool {
        self.script_delivered
    }

    /// The auto-command script as individual commands
    pub fn commands(&self) -> Vec<String> {
        split_script(&self.auto_command)
    }

    pub(crate) fn begin_attempt(&mut self, now: Instant) {
        self.state = ConnectionState::Connecting;
        self.last_attempt = Some(now);
    }

    pub(crate) fn record_success(&mut self) {
        self.state = ConnectionState::Connected;
        self.retry_count = 0;
    }

    /// Count a failed attempt; the count saturates at `max_retries`
    pub(crate) fn record_failure(&mut self, max_retries: u32) {
        self.state = ConnectionState::Failed;
        self.retry_count = (self.retry_count + 1).min(max_retries);
    }

    /// A live session broke after connecting; not counted as a retry
    pub(crate) fn mark_failed(&mut self) {
        self.state = ConnectionState::Failed;
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub(crate) fn mark_delivered(&mut self) {
        self.script_delivered = true;
    }
}

/// Split an auto-command script into commands
///
/// Pieces are separated by `;`, trimmed, and empty pieces are dropped. There
/// is no escaping, so a command cannot itself contain `;`.
pub fn split_script(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
