//! Server configuration

use serde::{Deserialize, Serialize};

/// Configuration for the command-executing server
///
/// The file is re-read before every accepted connection, so a port change
/// takes effect without a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub bind_host: String,

    /// Listening port
    pub port: u16,

    /// Command execution settings
    pub executor: ExecutorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8887,
            executor: ExecutorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Address to bind the listener to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Settings for running received commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// File extensions treated as shell scripts to open in a terminal
    pub script_extensions: Vec<String>,

    /// Terminal emulators tried in order when launching a script
    pub terminal_emulators: Vec<TerminalEmulator>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            script_extensions: vec!["sh".to_string()],
            terminal_emulators: vec![
                TerminalEmulator::new("gnome-terminal", &["--"]),
                TerminalEmulator::new("konsole", &["-e"]),
                TerminalEmulator::new("xfce4-terminal", &["-x"]),
                TerminalEmulator::new("xterm", &["-e"]),
            ],
        }
    }
}

/// A terminal emulator and the arguments that precede the command it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalEmulator {
    /// Program name or path
    pub program: String,
    /// Arguments placed before the script invocation
    #[serde(default)]
    pub args: Vec<String>,
}

impl TerminalEmulator {
    /// Create a terminal emulator entry
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}
