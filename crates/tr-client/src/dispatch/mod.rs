//! Connect-with-retry, fan-out and fan-in across many hosts

mod dispatcher;
mod listener;
mod retry;

pub use dispatcher::{Dispatcher, ResponseSink};
pub use listener::{spawn_listener, CloseReason, ResponseEvent};
pub use retry::RetryPolicy;
