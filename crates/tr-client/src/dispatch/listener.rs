//! Per-session listener tasks that fan responses into one channel

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tr_protocol::is_goodbye;

use crate::session::ResponseReader;

/// Capacity of the shared response channel.
///
/// Command output can arrive in bursts from several hosts at once; the
/// console drains it line by line.
pub const RESPONSE_CHANNEL_CAPACITY: usize = 256;

/// Something a listener observed on its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// One response line from a host
    Line {
        key: String,
        host: String,
        line: String,
    },
    /// The listener stopped; no more lines will come from this host
    Closed {
        key: String,
        host: String,
        reason: CloseReason,
    },
}

impl ResponseEvent {
    /// Session key of the host this event came from
    pub fn key(&self) -> &str {
        match self {
            ResponseEvent::Line { key, .. } | ResponseEvent::Closed { key, .. } => key,
        }
    }

    /// Name of the host this event came from
    pub fn host(&self) -> &str {
        match self {
            ResponseEvent::Line { host, .. } | ResponseEvent::Closed { host, .. } => host,
        }
    }
}

/// Why a listener stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Server sent its goodbye line
    Goodbye,
    /// Peer closed the stream
    PeerClosed,
    /// Reading failed
    Error(String),
    /// The dispatcher shut the listener down
    Cancelled,
}

/// Spawn a task that forwards every line from `reader` into `tx`
///
/// The task stops after the goodbye line, at end of stream, on a read error,
/// or when `cancel` fires. It always sends a final `Closed` event unless the
/// receiver is gone.
pub fn spawn_listener(
    mut reader: ResponseReader,
    tx: mpsc::Sender<ResponseEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let key = reader.target().key();
    let host = reader.target().name.clone();

    tokio::spawn(async move {
        let reason = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break CloseReason::Cancelled,
                next = reader.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    let goodbye = is_goodbye(&line);
                    let event = ResponseEvent::Line {
                        key: key.clone(),
                        host: host.clone(),
                        line,
                    };
                    if tx.send(event).await.is_err() {
                        tracing::debug!("Response receiver for {} dropped", host);
                        return;
                    }
                    if goodbye {
                        break CloseReason::Goodbye;
                    }
                }
                Ok(None) => break CloseReason::PeerClosed,
                Err(e) => {
                    tracing::warn!("Listener for {} stopped: {}", host, e);
                    break CloseReason::Error(e.to_string());
                }
            }
        };

        tracing::debug!("Listener for {} finished: {:?}", host, reason);
        let _ = tx.send(ResponseEvent::Closed { key, host, reason }).await;
    })
}
