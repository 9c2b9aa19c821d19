//! End-to-end tests: dispatcher and sessions against a real relay server

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tr_client::{CloseReason, ConnectionSession, Dispatcher, HostDescriptor, ResponseSink, SessionTimeouts};
use tr_core::config::DispatchConfig;
use tr_core::{ConnectionState, ExecutionMode};
use tr_server::{ConfigSource, RelayServer, ServerState};

/// Base port for test servers - each test gets a unique offset
static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

/// Get a unique port for this test
fn get_test_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    39300 + offset
}

/// Start a relay server and wait until it accepts connections
async fn start_server(port: u16) -> (Arc<ServerState>, CancellationToken) {
    let state = Arc::new(ServerState::new());
    let cancel = CancellationToken::new();
    let server = RelayServer::new(
        ConfigSource {
            path: None,
            port_override: Some(port),
        },
        Arc::clone(&state),
        cancel.clone(),
    );
    tokio::spawn(async move { server.run().await });

    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return (state, cancel);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Server on port {} never came up", port);
}

/// A loopback port nothing listens on
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn fast_settings() -> DispatchConfig {
    DispatchConfig {
        retry_interval: Duration::from_millis(50),
        max_retries: 3,
        command_delay: Duration::from_millis(20),
        handshake_delay: Duration::from_millis(20),
        connect_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_secs(2),
        read_timeout: Some(Duration::from_secs(5)),
    }
}

async fn wait_for_clients(state: &ServerState, count: usize) {
    timeout(Duration::from_secs(3), async {
        while state.registry.len().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Registry never reached the expected size");
}

#[derive(Default)]
struct CollectingSink {
    lines: Vec<String>,
    closed: Vec<(String, CloseReason)>,
}

impl ResponseSink for CollectingSink {
    fn line(&mut self, host: &str, line: &str) {
        self.lines.push(format!("[{}] {}", host, line));
    }

    fn closed(&mut self, host: &str, reason: &CloseReason) {
        self.closed.push((host.to_string(), reason.clone()));
    }
}

#[tokio::test]
async fn test_sweep_with_reachable_and_unreachable_host() {
    let port = get_test_port();
    let (state, cancel) = start_server(port).await;
    let dead_port = closed_port().await;

    let hosts = vec![
        HostDescriptor::new("127.0.0.1", port, "till-1"),
        HostDescriptor::new("127.0.0.1", dead_port, "till-2"),
    ];
    let mut dispatcher = Dispatcher::new(ExecutionMode::Manual, fast_settings(), hosts).unwrap();

    assert_eq!(dispatcher.sweep().await, 1);
    assert_eq!(dispatcher.session_keys(), vec![format!("127.0.0.1:{}", port)]);

    let reachable = dispatcher.host(&format!("127.0.0.1:{}", port)).unwrap();
    assert_eq!(reachable.state(), ConnectionState::Connected);
    assert_eq!(reachable.retry_count(), 0);

    let unreachable = dispatcher.host(&format!("127.0.0.1:{}", dead_port)).unwrap();
    assert_eq!(unreachable.state(), ConnectionState::Failed);
    assert_eq!(unreachable.retry_count(), 1);
    assert!(unreachable.last_attempt().is_some());

    assert!(dispatcher.check_total_failure().is_ok());
    wait_for_clients(&state, 1).await;

    dispatcher.close_all().await;
    assert_eq!(dispatcher.session_count(), 0);
    wait_for_clients(&state, 0).await;
    cancel.cancel();
}

#[tokio::test]
async fn test_session_roundtrip_with_server() {
    let port = get_test_port();
    let (state, cancel) = start_server(port).await;

    let timeouts = SessionTimeouts::from_config(&fast_settings());
    let mut session = ConnectionSession::new(
        HostDescriptor::new("127.0.0.1", port, "alice").target().clone(),
        timeouts,
    );
    session.connect().await.unwrap();
    session.send_command("alice").await.unwrap();
    session.send_command("-h").await.unwrap();
    assert_eq!(session.read_response().await.unwrap(), "Client names: alice");

    session.send_command("exit").await.unwrap();
    assert_eq!(session.read_response().await.unwrap(), "Goodbye!");
    assert!(session.read_response().await.is_err());
    assert_eq!(session.state(), ConnectionState::Disconnected);

    wait_for_clients(&state, 0).await;
    cancel.cancel();
}

#[tokio::test]
async fn test_interactive_fan_out_to_two_servers() {
    let first = get_test_port();
    let second = get_test_port();
    let (first_state, first_cancel) = start_server(first).await;
    let (second_state, second_cancel) = start_server(second).await;

    let hosts = vec![
        HostDescriptor::new("127.0.0.1", first, "till-1"),
        HostDescriptor::new("127.0.0.1", second, "till-2"),
    ];
    let mut dispatcher = Dispatcher::new(ExecutionMode::Manual, fast_settings(), hosts).unwrap();
    assert_eq!(dispatcher.connect_once().await.unwrap(), 2);
    wait_for_clients(&first_state, 1).await;
    wait_for_clients(&second_state, 1).await;

    let (input_tx, mut input_rx) = mpsc::channel(8);
    input_tx.send("-h".to_string()).await.unwrap();
    input_tx.send("exit".to_string()).await.unwrap();

    let mut sink = CollectingSink::default();
    timeout(
        Duration::from_secs(5),
        dispatcher.run_interactive(&mut input_rx, &mut sink, &CancellationToken::new()),
    )
    .await
    .expect("Interactive loop did not finish");

    for host in ["till-1", "till-2"] {
        assert!(sink
            .lines
            .contains(&format!("[{}] Client names: {}", host, host)));
        assert!(sink.lines.contains(&format!("[{}] Goodbye!", host)));
        assert!(sink
            .closed
            .contains(&(host.to_string(), CloseReason::Goodbye)));
    }
    assert_eq!(dispatcher.session_count(), 0);

    wait_for_clients(&first_state, 0).await;
    wait_for_clients(&second_state, 0).await;
    first_cancel.cancel();
    second_cancel.cancel();
}

#[tokio::test]
async fn test_automatic_mode_delivers_script() {
    let port = get_test_port();
    let (state, cancel) = start_server(port).await;
    let dead_port = closed_port().await;

    let mut settings = fast_settings();
    settings.max_retries = 2;
    let hosts = vec![
        HostDescriptor::new("127.0.0.1", port, "till-1").with_auto_command("-h; ;-i till-1"),
        HostDescriptor::new("127.0.0.1", dead_port, "till-2").with_auto_command("exit"),
    ];
    let mut dispatcher = Dispatcher::new(ExecutionMode::Automatic, settings, hosts).unwrap();

    let delivered = timeout(
        Duration::from_secs(5),
        dispatcher.run_automatic(&CancellationToken::new()),
    )
    .await
    .expect("Automatic run did not finish")
    .unwrap();

    assert_eq!(delivered, 1);
    assert!(dispatcher.hosts()[0].is_delivered());
    assert!(!dispatcher.hosts()[1].is_delivered());
    assert_eq!(dispatcher.hosts()[1].retry_count(), 2);
    assert_eq!(dispatcher.session_count(), 0);

    // Closing the session after delivery ends it on the server too
    wait_for_clients(&state, 0).await;
    cancel.cancel();
}
