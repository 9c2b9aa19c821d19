//! CLI integration tests
//!
//! Tests the tr-client binary using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tr_client() -> Command {
    Command::cargo_bin("tr-client")
        .expect("Failed to locate tr-client binary - ensure it's built before running tests")
}

/// A loopback port nothing listens on
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn write_config(dir: &Path, port: u16) -> std::path::PathBuf {
    let path = dir.join("client.toml");
    let content = format!(
        r#"mode = "automatic"

[dispatch]
retry_interval = 10
max_retries = 1
command_delay = 10
handshake_delay = 10
connect_timeout = 2
io_timeout = 2

[[hosts]]
address = "127.0.0.1"
port = {}
name = "till-1"
auto_command = "echo hi; exit"
"#,
        port
    );
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_cli_help() {
    tr_client()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tr-client"))
        .stdout(predicate::str::contains("dispatches commands"));
}

#[test]
fn test_cli_version() {
    tr_client()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tr-client"));
}

#[test]
fn test_cli_rejects_unknown_mode() {
    tr_client()
        .args(["--mode", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sideways"));
}

#[test]
fn test_cli_refuses_second_instance() {
    let dir = TempDir::new().unwrap();
    let lock = dir.path().join("tr-client.lock");
    // This test process is alive, so the lock is not stale
    std::fs::write(&lock, std::process::id().to_string()).unwrap();

    tr_client()
        .arg("--lock-file")
        .arg(&lock)
        .arg("--config")
        .arg(dir.path().join("client.toml"))
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("lock file"));

    assert!(lock.exists());
    assert!(!dir.path().join("client.toml").exists());
}

#[test]
fn test_cli_manual_mode_needs_terminal() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), closed_port());
    let lock = dir.path().join("tr-client.lock");

    tr_client()
        .arg("--config")
        .arg(&config)
        .arg("--lock-file")
        .arg(&lock)
        .args(["--mode", "manual"])
        .write_stdin("exit\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("interactive terminal"));

    assert!(!lock.exists());
}

#[test]
fn test_cli_automatic_mode_fails_when_nothing_delivered() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), closed_port());
    let lock = dir.path().join("tr-client.lock");

    tr_client()
        .arg("--config")
        .arg(&config)
        .arg("--lock-file")
        .arg(&lock)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Script delivery failed"));

    assert!(!lock.exists());
}

#[test]
fn test_cli_writes_default_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("client.toml");

    // Manual mode without a terminal exits right after loading config
    tr_client()
        .arg("--config")
        .arg(&config)
        .arg("--lock-file")
        .arg(dir.path().join("tr-client.lock"))
        .args(["--mode", "manual"])
        .write_stdin("")
        .assert()
        .failure();

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("192.168.0.66"));
    assert!(written.contains("8887"));
}
