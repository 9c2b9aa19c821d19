//! tr-protocol: Line protocol for term-relay
//!
//! Client and server talk over a plain TCP stream of newline-terminated
//! UTF-8 lines. The first line a client sends is its identity name; every
//! later line is a command. Responses are unframed lines, with a couple of
//! fixed sentinel lines marking the end of a block.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{LineCodec, MAX_LINE_LENGTH};
pub use error::ProtocolError;
pub use message::{
    client_names_line, is_goodbye, not_found_line, ServerCommand, END_OF_INFO, EXIT_COMMAND,
    GOODBYE, HELP_COMMAND, INFO_PREFIX,
};
