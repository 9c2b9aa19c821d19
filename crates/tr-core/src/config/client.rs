//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::host::HostEntry;
use super::serde_utils::{duration_millis, duration_secs, option_duration_secs};
use crate::logging::DEFAULT_LOG_MAX_LINES;
use crate::types::ExecutionMode;

/// Address of the host written into a freshly created client config
const DEFAULT_HOST_ADDRESS: &str = "192.168.0.66";

/// Port written into a freshly created client config
const DEFAULT_HOST_PORT: u16 = 8887;

/// Configuration for the dispatching client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Automatic (scripted) or manual (interactive) execution
    pub mode: ExecutionMode,

    /// Route diagnostics to the bounded log file instead of the console
    pub silent: bool,

    /// Path of the bounded log file
    pub log_file: PathBuf,

    /// Number of lines kept in the log file
    pub log_max_lines: usize,

    /// Retry and pacing settings
    pub dispatch: DispatchConfig,

    /// Hosts to dispatch to
    pub hosts: Vec<HostEntry>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Automatic,
            silent: false,
            log_file: PathBuf::from("logs").join("tr-client.log"),
            log_max_lines: DEFAULT_LOG_MAX_LINES,
            dispatch: DispatchConfig::default(),
            hosts: vec![HostEntry::new(
                DEFAULT_HOST_ADDRESS,
                DEFAULT_HOST_PORT,
                default_identity(),
            )],
        }
    }
}

impl ClientConfig {
    /// Hosts that have every field needed to connect
    pub fn complete_hosts(&self) -> Vec<HostEntry> {
        self.hosts.iter().filter(|h| h.is_complete()).cloned().collect()
    }
}

/// Retry, timeout and pacing settings for the dispatcher
///
/// The pacing delays stand in for acknowledgements the protocol does not
/// have; they make overruns unlikely, not impossible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Cooldown between connect attempts to the same host
    #[serde(with = "duration_millis")]
    pub retry_interval: Duration,

    /// Consecutive failures after which a host is given up
    pub max_retries: u32,

    /// Delay after each command sent
    #[serde(with = "duration_millis")]
    pub command_delay: Duration,

    /// Delay after the handshake line
    #[serde(with = "duration_millis")]
    pub handshake_delay: Duration,

    /// Connect timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Bound on a single write
    #[serde(with = "duration_secs")]
    pub io_timeout: Duration,

    /// Bound on waiting for a response line (unbounded when absent)
    #[serde(
        default,
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(5000),
            max_retries: 5,
            command_delay: Duration::from_millis(1000),
            handshake_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            read_timeout: None,
        }
    }
}

/// Default identity name: this machine's hostname
pub fn default_identity() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}
