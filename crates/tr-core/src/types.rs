//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a host or session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No open connection
    #[default]
    Disconnected,
    /// Connect attempt in progress
    Connecting,
    /// Connected and usable
    Connected,
    /// Last connect or I/O attempt failed
    Failed,
}

impl ConnectionState {
    /// Whether the state allows sending and receiving
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// How the client drives its hosts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Connect, deliver each host's auto-command script, then exit
    #[default]
    Automatic,
    /// Connect, then fan operator input out until `exit`
    Manual,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Automatic => write!(f, "automatic"),
            ExecutionMode::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "automatic" | "auto" => Ok(ExecutionMode::Automatic),
            "manual" => Ok(ExecutionMode::Manual),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}
