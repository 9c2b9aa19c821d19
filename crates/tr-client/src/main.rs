//! term-relay client
//!
//! Connects to the configured servers and either delivers each host's
//! auto-command script (automatic mode) or relays operator commands to every
//! connected server (manual mode).

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use tr_client::console::{self, ConsoleSink};
use tr_client::{Dispatcher, HostDescriptor};
use tr_core::config::{self, default_identity, ClientConfig, HostEntry};
use tr_core::error::ConfigError;
use tr_core::lockfile::{LockFile, LOCK_FILE_NAME};
use tr_core::logging::{init_tracing, BoundedLogFile};
use tr_core::ExecutionMode;

#[derive(Parser)]
#[command(name = "tr-client")]
#[command(about = "term-relay client - dispatches commands to remote servers")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Execution mode (automatic, manual); overrides the config file
    #[arg(short, long)]
    mode: Option<ExecutionMode>,

    /// Log to the bounded log file instead of the console
    #[arg(short, long)]
    silent: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run in foreground with verbose output; also allows automatic mode
    /// from an interactive terminal
    #[arg(short, long)]
    foreground: bool,

    /// Path to the single-instance lock file
    #[arg(long)]
    lock_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let lock_path = args
        .lock_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(LOCK_FILE_NAME));
    let _lock = LockFile::acquire(&lock_path)
        .with_context(|| format!("Failed to acquire lock file {}", lock_path.display()))?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_client_config_path);
    let (mut client_config, load_note) = load_client_config(&config_path)?;

    if let Some(mode) = args.mode {
        client_config.mode = mode;
    }
    if args.silent {
        client_config.silent = true;
    }

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    let log_file = client_config
        .silent
        .then(|| BoundedLogFile::new(&client_config.log_file, client_config.log_max_lines));
    init_tracing(log_level, log_file);

    tracing::info!("term-relay client starting in {} mode", client_config.mode);
    match load_note {
        Some(note) => tracing::warn!("{}", note),
        None => tracing::debug!("Loaded configuration from {:?}", config_path),
    }

    let interactive = std::io::stdin().is_terminal();
    match client_config.mode {
        ExecutionMode::Manual if !interactive => {
            anyhow::bail!("Manual mode needs an interactive terminal");
        }
        ExecutionMode::Automatic if interactive && !args.foreground => {
            anyhow::bail!(
                "Automatic mode does not run from an interactive terminal.\n\
                 Use --mode manual, or pass --foreground to run the script anyway."
            );
        }
        _ => {}
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match client_config.mode {
        ExecutionMode::Automatic => run_automatic(&client_config, &cancel).await,
        ExecutionMode::Manual => run_manual(&config_path, client_config, &cancel).await,
    }
}

/// Load the config file, writing defaults if it is missing
///
/// Runs before logging is up, so anything worth reporting comes back as a
/// note.
fn load_client_config(path: &Path) -> Result<(ClientConfig, Option<String>)> {
    match config::load_config::<ClientConfig>(path) {
        Ok(loaded) => Ok((loaded, None)),
        Err(ConfigError::NotFound(_)) => {
            let defaults = ClientConfig::default();
            config::save_config(path, &defaults)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            Ok((
                defaults,
                Some(format!("No config found, wrote defaults to {}", path.display())),
            ))
        }
        Err(e) => Ok((
            ClientConfig::default(),
            Some(format!(
                "Failed to load config from {}: {}; using defaults",
                path.display(),
                e
            )),
        )),
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }

        cancel.cancel();
    });
}

async fn run_automatic(client_config: &ClientConfig, cancel: &CancellationToken) -> Result<()> {
    let mut dispatcher =
        Dispatcher::from_config(client_config).context("No usable hosts in configuration")?;

    let delivered = dispatcher
        .run_automatic(cancel)
        .await
        .context("Script delivery failed")?;

    tracing::info!("Done, {} host(s) received their script", delivered);
    Ok(())
}

async fn run_manual(
    config_path: &Path,
    mut client_config: ClientConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    if fill_missing_hosts(&mut client_config)? {
        config::save_config(config_path, &client_config).context("Failed to save configuration")?;
        console::print_success(&format!("Saved configuration to {}", config_path.display()));
    }

    let hosts: Vec<HostDescriptor> = client_config
        .hosts
        .iter()
        .filter_map(HostDescriptor::from_entry)
        .collect();

    println!("{}", console::format_hosts(&hosts));
    let selection = if hosts.len() > 1 {
        select_hosts(hosts.len())?
    } else {
        (0..hosts.len()).collect()
    };
    let selected: Vec<HostDescriptor> = hosts
        .into_iter()
        .enumerate()
        .filter(|(i, _)| selection.contains(i))
        .map(|(_, h)| h)
        .collect();

    let mut dispatcher = Dispatcher::new(
        ExecutionMode::Manual,
        client_config.dispatch.clone(),
        selected,
    )
    .context("No usable hosts in configuration")?;

    let connected = match dispatcher.connect_once().await {
        Ok(connected) => connected,
        Err(e) => {
            console::print_error(&e.to_string());
            return Err(e).context("Could not start interactive session");
        }
    };
    console::print_success(&format!(
        "Connected to {} host(s); type 'exit' to quit",
        connected
    ));

    let mut input = console::spawn_stdin_reader();
    dispatcher
        .run_interactive(&mut input, &mut ConsoleSink, cancel)
        .await;

    console::print_info("All sessions closed");
    Ok(())
}

/// Prompt for any host fields the config leaves out
///
/// Returns whether the config changed.
fn fill_missing_hosts(client_config: &mut ClientConfig) -> Result<bool> {
    if client_config.hosts.is_empty() {
        client_config.hosts.push(HostEntry::default());
    }

    let identity = default_identity();
    let mut changed = false;
    for entry in client_config.hosts.iter_mut() {
        if !entry.is_complete() {
            *entry = console::complete_host(entry.clone(), &identity)?;
            changed = true;
        }
    }

    Ok(changed)
}

fn select_hosts(count: usize) -> Result<Vec<usize>> {
    loop {
        let input = console::prompt_line(&format!("Select host (1-{}) or 'all': ", count))?;
        match console::parse_selection(&input, count) {
            Ok(selection) => return Ok(selection),
            Err(e) => console::print_warning(&e.to_string()),
        }
    }
}
