//! tr-client: dispatches commands to term-relay servers
//!
//! The client connects to one or more servers, sends its identity as the
//! first line, then either delivers a configured script (automatic mode) or
//! relays operator commands to every connected server and prints their
//! responses (manual mode).

pub mod console;
pub mod dispatch;
pub mod host;
pub mod session;

pub use dispatch::{CloseReason, Dispatcher, ResponseEvent, ResponseSink, RetryPolicy};
pub use host::{split_script, HostDescriptor, HostTarget};
pub use session::{ConnectionSession, ResponseReader, SessionTimeouts};
