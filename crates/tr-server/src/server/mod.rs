//! Relay server: accept loop and per-connection handler

mod handler;
mod listener;

pub use handler::{Reply, SessionHandler};
pub use listener::{ConfigSource, RelayServer};
