//! Operator prompts: missing host fields, host selection, command input

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;

use tr_core::config::HostEntry;
use tr_core::error::ConfigError;

/// Capacity of the operator input channel
const INPUT_CHANNEL_CAPACITY: usize = 16;

/// Print `label` and read one trimmed line from stdin
pub fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    let read = io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    if read == 0 {
        bail!("Input closed");
    }

    Ok(line.trim().to_string())
}

/// Parse a port typed by the operator
pub fn parse_port(input: &str) -> Result<u16, ConfigError> {
    input
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(input.trim().to_string()))
}

/// Ask for every missing field of `entry`
///
/// An empty name falls back to `default_name`.
pub fn complete_host(mut entry: HostEntry, default_name: &str) -> Result<HostEntry> {
    while entry.address.trim().is_empty() {
        entry.address = prompt_line("Server address: ")?;
    }

    while entry.port.is_none() {
        let input = prompt_line("Server port: ")?;
        match parse_port(&input) {
            Ok(port) => entry.port = Some(port),
            Err(e) => eprintln!("{}", e),
        }
    }

    if entry.name.trim().is_empty() {
        let name = prompt_line(&format!("Client name [{}]: ", default_name))?;
        entry.name = if name.is_empty() {
            default_name.to_string()
        } else {
            name
        };
    }

    Ok(entry)
}

/// Parse a host selection: a 1-based index or `all`
///
/// Returns zero-based indices into the host list.
pub fn parse_selection(input: &str, count: usize) -> Result<Vec<usize>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return Ok((0..count).collect());
    }

    let index: usize = input
        .parse()
        .with_context(|| format!("'{}' is neither a host number nor 'all'", input))?;
    if index == 0 || index > count {
        bail!("Host number must be between 1 and {}", count);
    }

    Ok(vec![index - 1])
}

/// Read operator lines on a dedicated thread
///
/// Stdin reads block, so they stay off the runtime. The channel closes at
/// end of input.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);

    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(" 8887 ").unwrap(), 8887);
        assert_eq!(parse_port("0").unwrap(), 0);
        assert!(matches!(
            parse_port("65536"),
            Err(ConfigError::InvalidPort(p)) if p == "65536"
        ));
        assert!(parse_port("http").is_err());
    }

    #[test]
    fn test_parse_selection_index() {
        assert_eq!(parse_selection("2", 3).unwrap(), vec![1]);
        assert_eq!(parse_selection(" 1 ", 1).unwrap(), vec![0]);
    }

    #[test]
    fn test_parse_selection_all() {
        assert_eq!(parse_selection("ALL", 3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_selection_out_of_range() {
        assert!(parse_selection("0", 3).is_err());
        assert!(parse_selection("4", 3).is_err());
        assert!(parse_selection("two", 3).is_err());
    }

    #[test]
    fn test_complete_host_keeps_filled_fields() {
        let entry = HostEntry::new("10.0.0.5", 8887, "till-1");
        let completed = complete_host(entry.clone(), "fallback").unwrap();
        assert_eq!(completed.address, entry.address);
        assert_eq!(completed.port, Some(8887));
        assert_eq!(completed.name, "till-1");
    }
}
