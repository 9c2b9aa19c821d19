//! Terminal output for the interactive client
//!
//! Status lines are colored with crossterm; host lists are rendered with
//! tabled.

use std::io::Write;

use tabled::{settings::Style, Table, Tabled};

use crate::dispatch::{CloseReason, ResponseSink};
use crate::host::HostDescriptor;

/// Prompt shown before each operator command
pub const COMMAND_PROMPT: &str = ">>> ";

/// Format hosts as a numbered table, numbering from 1
pub fn format_hosts(hosts: &[HostDescriptor]) -> String {
    if hosts.is_empty() {
        return "No hosts configured".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "SCRIPT")]
        script: String,
    }

    let rows: Vec<HostRow> = hosts
        .iter()
        .enumerate()
        .map(|(i, h)| HostRow {
            index: i + 1,
            name: h.name().to_string(),
            address: h.target().address.clone(),
            port: h.target().port,
            script: truncate(h.auto_command(), 32),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format one response line the way the console prints it
pub fn format_response(host: &str, line: &str) -> String {
    format!("[{}] {}", host, line)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.is_empty() {
        return "-".to_string();
    }
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a check mark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Writes interactive responses to the terminal
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ResponseSink for ConsoleSink {
    fn prompt(&mut self) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", COMMAND_PROMPT);
        let _ = stdout.flush();
    }

    fn line(&mut self, host: &str, line: &str) {
        println!("{}", format_response(host, line));
    }

    fn closed(&mut self, host: &str, reason: &CloseReason) {
        match reason {
            CloseReason::Goodbye | CloseReason::Cancelled => {}
            CloseReason::PeerClosed => print_warning(&format!("{} closed the connection", host)),
            CloseReason::Error(e) => print_error(&format!("Lost connection to {}: {}", host, e)),
        }
    }
}
