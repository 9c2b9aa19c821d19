//! Core error types for term-relay

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tr_protocol::ProtocolError;

/// Top-level error type for the term-relay crates
#[derive(Error, Debug)]
pub enum RelayError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Command execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Single-instance lock error
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a client-side connection session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation requires a connected session
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// The response reader was handed to a listener task
    #[error("Reader for {0} is owned by a listener")]
    ReaderDetached(String),

    /// Host name did not resolve to any address
    #[error("Could not resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection refused, unreachable, or otherwise failed
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation did not finish within the configured timeout
    #[error("Timed out after {timeout:?} talking to {target}")]
    Timeout { target: String, timeout: Duration },

    /// Writing a command failed
    #[error("Failed to send to {target}: {source}")]
    Send {
        target: String,
        #[source]
        source: ProtocolError,
    },

    /// Reading a response failed
    #[error("Failed to read from {target}: {source}")]
    Receive {
        target: String,
        #[source]
        source: ProtocolError,
    },

    /// Peer closed the stream
    #[error("Connection to {0} closed by peer")]
    Closed(String),
}

impl SessionError {
    /// Whether this error happened while establishing the connection
    ///
    /// Connection errors are retried in automatic mode; everything else is a
    /// protocol error that only tears down the affected session.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SessionError::Resolve { .. }
                | SessionError::Connect { .. }
                | SessionError::Timeout { .. }
        )
    }
}

/// Errors raised by the multi-host dispatcher
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No hosts configured
    #[error("No hosts defined")]
    NoHosts,

    /// Nothing connected and every host used up its retry budget
    #[error("All {hosts} host(s) exhausted their retries")]
    AllHostsExhausted { hosts: usize },

    /// Single-shot connect found no reachable host
    #[error("Could not connect to any host")]
    NothingConnected,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Port outside 0-65535 or not a number
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors raised while running a command on the server
#[derive(Error, Debug)]
pub enum ExecError {
    /// The interpreter or terminal emulator could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the process output failed
    #[error("Failed to read process output: {0}")]
    Output(#[source] std::io::Error),
}

/// Errors raised by the single-instance lock
#[derive(Error, Debug)]
pub enum LockError {
    /// Another live process holds the lock
    #[error("Another instance is already running (pid {0})")]
    AlreadyRunning(u32),

    /// I/O error on the lock file
    #[error("Lock file error: {0}")]
    Io(#[from] std::io::Error),
}
