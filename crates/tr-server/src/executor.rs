//! Command execution on the server host
//!
//! Ordinary commands run through the platform shell with stdout and stderr
//! merged line by line. A command naming an existing script file is opened
//! in a terminal emulator instead.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use tr_core::config::{ExecutorConfig, TerminalEmulator};
use tr_core::error::ExecError;

/// Reported when a script is sent to a Windows server
pub const WINDOWS_SCRIPT_UNSUPPORTED: &str = "Shell scripts (.sh) are not supported on Windows.";

/// Reported when no configured terminal emulator is installed
pub const NO_TERMINAL_FOUND: &str = "No terminal emulator found.";

/// Runs one command line and returns its output lines
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion
    ///
    /// Only a failure to start the process is an error; a non-zero exit
    /// status is not.
    async fn run(&self, command: &str) -> Result<Vec<String>, ExecError>;
}

/// Runs commands through the local shell or a terminal emulator
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Whether `command` names a file with a script extension
    pub fn is_script(&self, command: &str) -> bool {
        Path::new(command)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .script_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// First configured terminal emulator found on `PATH`
    fn find_terminal(&self) -> Option<(&TerminalEmulator, PathBuf)> {
        self.config
            .terminal_emulators
            .iter()
            .find_map(|t| which::which(&t.program).ok().map(|path| (t, path)))
    }

    async fn launch_in_terminal(&self, script: &str) -> Result<Vec<String>, ExecError> {
        let Some((emulator, program)) = self.find_terminal() else {
            tracing::warn!("No terminal emulator available for {}", script);
            return Ok(vec![NO_TERMINAL_FOUND.to_string()]);
        };

        tracing::info!("Opening {} in {}", script, emulator.program);
        let mut command = Command::new(program);
        command.args(&emulator.args).arg("/bin/bash").arg(script);
        capture(command, &emulator.program).await
    }
}

#[async_trait]
impl CommandRunner for CommandExecutor {
    async fn run(&self, command: &str) -> Result<Vec<String>, ExecError> {
        let command = command.trim();

        if self.is_script(command) {
            if cfg!(windows) {
                return Ok(vec![WINDOWS_SCRIPT_UNSUPPORTED.to_string()]);
            }
            if Path::new(command).is_file() {
                return self.launch_in_terminal(command).await;
            }
        }

        let (program, shell) = shell_command(command);
        capture(shell, program).await
    }
}

#[cfg(windows)]
fn shell_command(command: &str) -> (&'static str, Command) {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    ("cmd", shell)
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> (&'static str, Command) {
    let mut shell = Command::new("/bin/sh");
    shell.arg("-c").arg(command);
    ("/bin/sh", shell)
}

/// Spawn `command` and collect stdout and stderr lines in arrival order
async fn capture(mut command: Command, program: &str) -> Result<Vec<String>, ExecError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(ExecError::Output(io::Error::new(
            io::ErrorKind::Other,
            "process output was not captured",
        )));
    };

    let mut stdout = BufReader::new(stdout).split(b'\n');
    let mut stderr = BufReader::new(stderr).split(b'\n');
    let (mut stdout_open, mut stderr_open) = (true, true);
    let mut lines = Vec::new();

    while stdout_open || stderr_open {
        tokio::select! {
            segment = stdout.next_segment(), if stdout_open => {
                match segment.map_err(ExecError::Output)? {
                    Some(bytes) => lines.push(decode_line(&bytes)),
                    None => stdout_open = false,
                }
            }
            segment = stderr.next_segment(), if stderr_open => {
                match segment.map_err(ExecError::Output)? {
                    Some(bytes) => lines.push(decode_line(&bytes)),
                    None => stderr_open = false,
                }
            }
        }
    }

    let status = child.wait().await.map_err(ExecError::Output)?;
    tracing::debug!("{} exited with {}", program, status);

    Ok(lines)
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
