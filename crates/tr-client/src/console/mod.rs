//! Operator-facing console: prompts and colored output

pub mod output;
pub mod prompt;

pub use output::{
    format_hosts, format_response, print_error, print_info, print_success, print_warning,
    ConsoleSink, COMMAND_PROMPT,
};
pub use prompt::{complete_host, parse_port, parse_selection, prompt_line, spawn_stdin_reader};
