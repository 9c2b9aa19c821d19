//! Command lines and sentinel responses of the term-relay protocol
//!
//! # Message Flow
//!
//! 1. Client connects and sends its identity name as the first line
//! 2. Every later line is a command, interpreted by the server:
//!    - `exit` → server replies [`GOODBYE`] and closes
//!    - `-i <name>` → client record (or not-found line), then [`END_OF_INFO`]
//!    - `-h` → one line listing registered client names
//!    - anything else → output lines of running it as a shell command
//!
//! There are no request identifiers: responses belong to a connection, not
//! to a particular command.

use std::fmt;

/// Sentinel the server writes before closing in reply to `exit`
pub const GOODBYE: &str = "Goodbye!";

/// Sentinel terminating an info block
pub const END_OF_INFO: &str = "END_OF_INFO";

/// Command ending the session
pub const EXIT_COMMAND: &str = "exit";

/// Command listing registered client names
pub const HELP_COMMAND: &str = "-h";

/// Prefix of the info query
pub const INFO_PREFIX: &str = "-i ";

/// A command line as understood by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// End the session
    Exit,
    /// Look up a registered client by name
    Info(String),
    /// List registered client names
    Help,
    /// Run the line through the local command interpreter
    Shell(String),
}

impl ServerCommand {
    /// Interpret a received command line
    ///
    /// `exit` is matched trimmed and case-insensitively, `-h` only exactly,
    /// and `-i ` only as a literal prefix; the info target is trimmed.
    pub fn parse(line: &str) -> Self {
        if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) {
            ServerCommand::Exit
        } else if let Some(target) = line.strip_prefix(INFO_PREFIX) {
            ServerCommand::Info(target.trim().to_string())
        } else if line == HELP_COMMAND {
            ServerCommand::Help
        } else {
            ServerCommand::Shell(line.to_string())
        }
    }

    /// Whether this command ends the session
    pub fn is_exit(&self) -> bool {
        matches!(self, ServerCommand::Exit)
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerCommand::Exit => write!(f, "{}", EXIT_COMMAND),
            ServerCommand::Info(name) => write!(f, "{}{}", INFO_PREFIX, name),
            ServerCommand::Help => write!(f, "{}", HELP_COMMAND),
            ServerCommand::Shell(line) => write!(f, "{}", line),
        }
    }
}

/// Whether a response line is the end-of-session sentinel
pub fn is_goodbye(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(GOODBYE)
}

/// Response line for `-h`
pub fn client_names_line<S: AsRef<str>>(names: &[S]) -> String {
    let joined = names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Client names: {}", joined)
}

/// Response line for an info query that matched nobody
pub fn not_found_line(name: &str) -> String {
    format!("No client found with name: {}", name)
}
