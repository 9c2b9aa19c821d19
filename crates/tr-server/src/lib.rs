//! tr-server: runs commands received from term-relay clients
//!
//! The server accepts TCP connections, registers each client under the name
//! it sends first, and answers every later line: built-in queries about the
//! connected clients, or the output of running the line as a shell command.

pub mod executor;
pub mod registry;
pub mod server;
pub mod state;

pub use executor::{CommandExecutor, CommandRunner};
pub use registry::{ClientId, ClientRecord, ClientRegistry};
pub use server::{ConfigSource, RelayServer, SessionHandler};
pub use state::ServerState;
