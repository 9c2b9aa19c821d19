//! Multi-host dispatcher
//!
//! Owns every host descriptor and every open session for the run. Sessions
//! are keyed by `address:port`; each host has at most one at a time.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tr_core::config::{ClientConfig, DispatchConfig};
use tr_core::error::{DispatchError, SessionError};
use tr_core::ExecutionMode;
use tr_protocol::{ServerCommand, EXIT_COMMAND};

use super::listener::{spawn_listener, CloseReason, ResponseEvent, RESPONSE_CHANNEL_CAPACITY};
use super::retry::RetryPolicy;
use crate::host::HostDescriptor;
use crate::session::{ConnectionSession, SessionTimeouts};

/// How long a listener task gets to finish after cancellation
const LISTENER_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// How long to keep printing responses after `exit` was sent
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives what the interactive loop produces for the operator
pub trait ResponseSink {
    /// Ready for the next operator line
    fn prompt(&mut self) {}

    /// One response line from a host
    fn line(&mut self, host: &str, line: &str);

    /// A host's listener ended
    fn closed(&mut self, _host: &str, _reason: &CloseReason) {}
}

/// Connects to every configured host and drives commands to them
pub struct Dispatcher {
    mode: ExecutionMode,
    settings: DispatchConfig,
    policy: RetryPolicy,
    timeouts: SessionTimeouts,
    hosts: Vec<HostDescriptor>,
    sessions: HashMap<String, ConnectionSession>,
    listeners: Vec<JoinHandle<()>>,
    listener_cancel: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher; fails if `hosts` is empty
    pub fn new(
        mode: ExecutionMode,
        settings: DispatchConfig,
        hosts: Vec<HostDescriptor>,
    ) -> Result<Self, DispatchError> {
        if hosts.is_empty() {
            return Err(DispatchError::NoHosts);
        }

        Ok(Self {
            mode,
            policy: RetryPolicy::from_config(&settings),
            timeouts: SessionTimeouts::from_config(&settings),
            settings,
            hosts,
            sessions: HashMap::new(),
            listeners: Vec::new(),
            listener_cancel: CancellationToken::new(),
        })
    }

    /// Build a dispatcher from the complete host entries of a client config
    pub fn from_config(config: &ClientConfig) -> Result<Self, DispatchError> {
        let hosts = config
            .hosts
            .iter()
            .filter_map(HostDescriptor::from_entry)
            .collect();
        Self::new(config.mode, config.dispatch.clone(), hosts)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn hosts(&self) -> &[HostDescriptor] {
        &self.hosts
    }

    pub fn host(&self, key: &str) -> Option<&HostDescriptor> {
        self.hosts.iter().find(|h| h.key() == key)
    }

    /// Keys of the open sessions, sorted
    pub fn session_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// One pass over every host, connecting those that are due
    ///
    /// Returns the number of sessions opened by this pass.
    pub async fn sweep(&mut self) -> usize {
        let mut opened = 0;

        for idx in 0..self.hosts.len() {
            let now = Instant::now();
            let host = &self.hosts[idx];
            let key = host.key();

            if self.sessions.contains_key(&key)
                || host.is_delivered()
                || self.policy.is_exhausted(host)
                || !self.policy.cooldown_elapsed(host, now)
            {
                continue;
            }

            let script = match self.mode {
                ExecutionMode::Automatic => Some(host.commands()),
                ExecutionMode::Manual => None,
            };
            let mut session = ConnectionSession::new(host.target().clone(), self.timeouts);
            self.hosts[idx].begin_attempt(now);

            match self.establish(&mut session, script.as_deref()).await {
                Ok(()) => {
                    let host = &mut self.hosts[idx];
                    host.record_success();
                    if script.is_some() {
                        host.mark_delivered();
                        tracing::info!("Delivered script to {}", host.target());
                    }
                    self.sessions.insert(key, session);
                    opened += 1;
                }
                Err(e) => {
                    session.close().await;
                    let max_retries = self.policy.max_retries();
                    let host = &mut self.hosts[idx];
                    host.record_failure(max_retries);
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        host.retry_count(),
                        max_retries,
                        host.target(),
                        e
                    );
                    if self.policy.is_exhausted(host) {
                        tracing::error!("Giving up on {}", host.target());
                    }
                }
            }
        }

        opened
    }

    /// Connect, handshake, and optionally deliver a script on one session
    async fn establish(
        &self,
        session: &mut ConnectionSession,
        script: Option<&[String]>,
    ) -> Result<(), SessionError> {
        session.connect().await?;

        let name = session.target().name.clone();
        session.send_command(&name).await?;
        tokio::time::sleep(self.settings.handshake_delay).await;

        if let Some(commands) = script {
            for command in commands {
                session.send_command(command).await?;
                tokio::time::sleep(self.settings.command_delay).await;
            }
        }

        Ok(())
    }

    /// Whether nothing is connected and every host is out of retries
    pub fn check_total_failure(&self) -> Result<(), DispatchError> {
        if self.sessions.is_empty() && self.hosts.iter().all(|h| self.policy.is_exhausted(h)) {
            return Err(DispatchError::AllHostsExhausted {
                hosts: self.hosts.len(),
            });
        }
        Ok(())
    }

    /// Time until the earliest pending host may be attempted again
    fn next_retry_in(&self, now: Instant) -> Option<Duration> {
        self.hosts
            .iter()
            .filter(|h| !h.is_delivered() && !self.policy.is_exhausted(h))
            .map(|h| self.policy.ready_in(h, now))
            .min()
    }

    /// Run scripted delivery until every host delivered or gave up
    ///
    /// Returns the number of hosts that received their script.
    pub async fn run_automatic(&mut self, cancel: &CancellationToken) -> Result<usize, DispatchError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatch cancelled");
                    break;
                }
                _ = self.sweep() => {}
            }

            self.close_delivered().await;

            let Some(wait) = self.next_retry_in(Instant::now()) else {
                break;
            };

            tracing::debug!("Next attempt in {:?}", wait);
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatch cancelled");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.close_all().await;

        let delivered = self.hosts.iter().filter(|h| h.is_delivered()).count();
        tracing::info!("Script delivered to {}/{} host(s)", delivered, self.hosts.len());

        if delivered == 0 && !cancel.is_cancelled() {
            return Err(DispatchError::AllHostsExhausted {
                hosts: self.hosts.len(),
            });
        }
        Ok(delivered)
    }

    /// Close the sessions of hosts that already delivered their script
    async fn close_delivered(&mut self) {
        let keys: Vec<String> = self
            .hosts
            .iter()
            .filter(|h| h.is_delivered())
            .map(|h| h.key())
            .filter(|k| self.sessions.contains_key(k))
            .collect();

        for key in keys {
            self.drop_session(&key, false).await;
        }
    }

    /// One sweep without scripts; fails if no host connected
    pub async fn connect_once(&mut self) -> Result<usize, DispatchError> {
        let opened = self.sweep().await;
        if self.sessions.is_empty() {
            return Err(DispatchError::NothingConnected);
        }
        Ok(opened)
    }

    /// Start one listener per session whose reader is still attached
    pub fn spawn_listeners(&mut self) -> mpsc::Receiver<ResponseEvent> {
        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);

        for session in self.sessions.values_mut() {
            if let Some(reader) = session.take_reader() {
                let handle = spawn_listener(reader, tx.clone(), self.listener_cancel.clone());
                self.listeners.push(handle);
            }
        }

        rx
    }

    /// Send one line to every open session
    ///
    /// A failed send drops only that session. Returns how many sessions got
    /// the line.
    pub async fn broadcast(&mut self, text: &str) -> usize {
        let mut sent = 0;
        let mut failed = Vec::new();

        for (key, session) in self.sessions.iter_mut() {
            match session.send_command(text).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!("Dropping {}: {}", session.target(), e);
                    failed.push(key.clone());
                }
            }
        }

        for key in failed {
            self.drop_session(&key, true).await;
        }

        sent
    }

    /// Close and forget one session
    pub async fn drop_session(&mut self, key: &str, failed: bool) {
        if let Some(mut session) = self.sessions.remove(key) {
            session.close().await;
        }

        if let Some(host) = self.hosts.iter_mut().find(|h| h.key() == key) {
            if failed {
                host.mark_failed();
            } else {
                host.mark_disconnected();
            }
        }
    }

    /// Stop every listener and close every session
    pub async fn close_all(&mut self) {
        self.listener_cancel.cancel();
        for handle in self.listeners.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(LISTENER_SHUTDOWN_TIMEOUT, handle).await.is_err() {
                abort.abort();
            }
        }
        self.listener_cancel = CancellationToken::new();

        let keys: Vec<String> = self.sessions.keys().cloned().collect();
        for key in keys {
            self.drop_session(&key, false).await;
        }
    }

    /// Interactive loop: fan operator lines out, fan responses in
    ///
    /// Ends on `exit`, end of input, cancellation, or once every listener
    /// has finished. All sessions are closed on return.
    pub async fn run_interactive<S: ResponseSink>(
        &mut self,
        input: &mut mpsc::Receiver<String>,
        sink: &mut S,
        cancel: &CancellationToken,
    ) {
        let mut events = self.spawn_listeners();
        let mut exiting = false;
        sink.prompt();

        while !self.sessions.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Interactive session cancelled");
                    break;
                }
                Some(event) = events.recv() => {
                    self.handle_event(event, sink).await;
                }
                line = input.recv() => {
                    let Some(line) = line else {
                        tracing::info!("Input closed, sending exit");
                        self.broadcast(EXIT_COMMAND).await;
                        exiting = true;
                        break;
                    };

                    let line = line.trim();
                    if line.is_empty() {
                        sink.prompt();
                        continue;
                    }

                    if ServerCommand::parse(line).is_exit() {
                        self.broadcast(EXIT_COMMAND).await;
                        exiting = true;
                        break;
                    }

                    let sent = self.broadcast(line).await;
                    tracing::debug!("Sent {:?} to {} host(s)", line, sent);

                    tokio::time::sleep(self.settings.command_delay).await;
                    sink.prompt();
                }
            }
        }

        if exiting {
            self.drain_events(&mut events, sink).await;
        }
        self.close_all().await;
    }

    async fn handle_event<S: ResponseSink>(&mut self, event: ResponseEvent, sink: &mut S) {
        match event {
            ResponseEvent::Line { host, line, .. } => sink.line(&host, &line),
            ResponseEvent::Closed { key, host, reason } => {
                sink.closed(&host, &reason);
                let failed = matches!(reason, CloseReason::Error(_));
                self.drop_session(&key, failed).await;
            }
        }
    }

    /// Keep delivering responses until every listener ended or the grace period ran out
    async fn drain_events<S: ResponseSink>(
        &mut self,
        events: &mut mpsc::Receiver<ResponseEvent>,
        sink: &mut S,
    ) {
        let deadline = Instant::now() + EXIT_DRAIN_TIMEOUT;

        while !self.sessions.is_empty() {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => self.handle_event(event, sink).await,
                Ok(None) | Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tr_core::ConnectionState;

    fn fast_settings() -> DispatchConfig {
        DispatchConfig {
            retry_interval: Duration::from_millis(50),
            max_retries: 2,
            command_delay: Duration::from_millis(10),
            handshake_delay: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(2),
            read_timeout: None,
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Accept one connection and collect every line it sends
    async fn recording_server() -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                received.push(line);
            }
            received
        });
        (port, handle)
    }

    #[derive(Default)]
    struct RecordingSink {
        lines: Vec<(String, String)>,
        closed: Vec<String>,
    }

    impl ResponseSink for RecordingSink {
        fn line(&mut self, host: &str, line: &str) {
            self.lines.push((host.to_string(), line.to_string()));
        }

        fn closed(&mut self, host: &str, _reason: &CloseReason) {
            self.closed.push(host.to_string());
        }
    }

    #[test]
    fn test_no_hosts_is_an_error() {
        let result = Dispatcher::new(ExecutionMode::Manual, fast_settings(), Vec::new());
        assert!(matches!(result, Err(DispatchError::NoHosts)));
    }

    #[test]
    fn test_from_config_skips_incomplete_hosts() {
        let mut config = ClientConfig::default();
        config.hosts[0].name.clear();
        assert!(matches!(
            Dispatcher::from_config(&config),
            Err(DispatchError::NoHosts)
        ));
    }

    #[tokio::test]
    async fn test_exhausted_host_is_never_attempted() {
        let port = closed_port().await;
        let mut settings = fast_settings();
        settings.max_retries = 1;
        let hosts = vec![HostDescriptor::new("127.0.0.1", port, "gone")];
        let mut dispatcher = Dispatcher::new(ExecutionMode::Manual, settings, hosts).unwrap();

        assert_eq!(dispatcher.sweep().await, 0);
        let first_attempt = dispatcher.hosts()[0].last_attempt();
        assert_eq!(dispatcher.hosts()[0].retry_count(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        dispatcher.sweep().await;
        assert_eq!(dispatcher.hosts()[0].last_attempt(), first_attempt);
        assert_eq!(dispatcher.hosts()[0].retry_count(), 1);
        assert!(dispatcher.check_total_failure().is_err());
    }

    #[tokio::test]
    async fn test_cooldown_blocks_immediate_retry() {
        let port = closed_port().await;
        let hosts = vec![HostDescriptor::new("127.0.0.1", port, "gone")];
        let mut settings = fast_settings();
        settings.retry_interval = Duration::from_secs(60);
        let mut dispatcher = Dispatcher::new(ExecutionMode::Manual, settings, hosts).unwrap();

        dispatcher.sweep().await;
        dispatcher.sweep().await;
        assert_eq!(dispatcher.hosts()[0].retry_count(), 1);
        assert!(dispatcher.check_total_failure().is_ok());
    }

    #[tokio::test]
    async fn test_automatic_delivers_handshake_and_script() {
        let (port, server) = recording_server().await;
        let hosts = vec![HostDescriptor::new("127.0.0.1", port, "till-1")
            .with_auto_command("echo a; ; echo b;exit")];
        let mut dispatcher =
            Dispatcher::new(ExecutionMode::Automatic, fast_settings(), hosts).unwrap();

        let delivered = dispatcher
            .run_automatic(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(dispatcher.session_count(), 0);
        assert!(dispatcher.hosts()[0].is_delivered());
        assert_eq!(dispatcher.hosts()[0].state(), ConnectionState::Disconnected);
        assert_eq!(
            server.await.unwrap(),
            vec!["till-1", "echo a", "echo b", "exit"]
        );
    }

    #[tokio::test]
    async fn test_automatic_fails_when_nothing_delivered() {
        let port = closed_port().await;
        let hosts = vec![HostDescriptor::new("127.0.0.1", port, "gone").with_auto_command("exit")];
        let mut dispatcher =
            Dispatcher::new(ExecutionMode::Automatic, fast_settings(), hosts).unwrap();

        let err = dispatcher
            .run_automatic(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::AllHostsExhausted { hosts: 1 }));
        assert_eq!(dispatcher.hosts()[0].retry_count(), 2);
    }

    #[tokio::test]
    async fn test_connect_once_with_nothing_reachable() {
        let port = closed_port().await;
        let hosts = vec![HostDescriptor::new("127.0.0.1", port, "gone")];
        let mut dispatcher = Dispatcher::new(ExecutionMode::Manual, fast_settings(), hosts).unwrap();

        assert!(matches!(
            dispatcher.connect_once().await,
            Err(DispatchError::NothingConnected)
        ));
    }

    #[tokio::test]
    async fn test_interactive_fans_out_and_tags_responses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if received.is_empty() {
                    received.push(line);
                    continue;
                }
                received.push(line.clone());
                if line == "exit" {
                    write_half.write_all(b"Goodbye!\n").await.unwrap();
                    break;
                }
                write_half
                    .write_all(format!("ran {}\n", line).as_bytes())
                    .await
                    .unwrap();
            }
            received
        });

        let hosts = vec![HostDescriptor::new("127.0.0.1", port, "till-1")];
        let mut dispatcher = Dispatcher::new(ExecutionMode::Manual, fast_settings(), hosts).unwrap();
        dispatcher.connect_once().await.unwrap();

        let (input_tx, mut input_rx) = mpsc::channel(8);
        input_tx.send("uptime".to_string()).await.unwrap();
        input_tx.send(" EXIT ".to_string()).await.unwrap();

        let mut sink = RecordingSink::default();
        dispatcher
            .run_interactive(&mut input_rx, &mut sink, &CancellationToken::new())
            .await;

        assert_eq!(server.await.unwrap(), vec!["till-1", "uptime", "exit"]);
        assert_eq!(
            sink.lines,
            vec![
                ("till-1".to_string(), "ran uptime".to_string()),
                ("till-1".to_string(), "Goodbye!".to_string()),
            ]
        );
        assert_eq!(sink.closed, vec!["till-1"]);
        assert_eq!(dispatcher.session_count(), 0);
    }
}
