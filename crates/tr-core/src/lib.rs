//! tr-core: Core types, errors and configuration for term-relay
//!
//! Shared by the dispatching client and the command-executing server:
//! the error taxonomy, connection state, TOML configuration, the
//! single-instance lock file and the bounded log writer.

pub mod config;
pub mod error;
pub mod lockfile;
pub mod logging;
pub mod types;

pub use error::RelayError;
pub use types::{ConnectionState, ExecutionMode};
