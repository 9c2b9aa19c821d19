//! Client-side connection session to one server
//!
//! A session owns one TCP stream, split into a framed line reader and a
//! framed line writer. State only changes inside the session's own methods:
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                                      \-err-> Failed
//! Connected --send/read fault--> Disconnected (via close)
//! any --close--> Disconnected
//! ```

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};

use tr_core::config::DispatchConfig;
use tr_core::error::SessionError;
use tr_core::ConnectionState;
use tr_protocol::LineCodec;

use crate::host::HostTarget;

type LineReader = FramedRead<OwnedReadHalf, LineCodec>;
type LineWriter = FramedWrite<OwnedWriteHalf, LineCodec>;

/// Timeouts applied by a session
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Bound on resolving and connecting
    pub connect: Duration,
    /// Bound on a single write
    pub io: Duration,
    /// Bound on waiting for a response line
    pub read: Option<Duration>,
}

impl SessionTimeouts {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            io: config.io_timeout,
            read: config.read_timeout,
        }
    }
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// One live (or not yet live) connection to a server
pub struct ConnectionSession {
    target: HostTarget,
    timeouts: SessionTimeouts,
    state: ConnectionState,
    writer: Option<LineWriter>,
    reader: Option<LineReader>,
    reader_detached: bool,
}

impl ConnectionSession {
    /// Create a disconnected session for `target`
    pub fn new(target: HostTarget, timeouts: SessionTimeouts) -> Self {
        Self {
            target,
            timeouts,
            state: ConnectionState::Disconnected,
            writer: None,
            reader: None,
            reader_detached: false,
        }
    }

    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether any stream handle is still held
    pub fn has_handles(&self) -> bool {
        self.writer.is_some() || self.reader.is_some()
    }

    /// Open the TCP connection
    ///
    /// On failure the partially opened resources are released and the session
    /// is left `Failed`.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state.is_connected() {
            return Ok(());
        }

        self.release().await;
        self.state = ConnectionState::Connecting;
        tracing::debug!("Connecting to {}", self.target);

        let result = match tokio::time::timeout(self.timeouts.connect, self.open()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                target: self.target.key(),
                timeout: self.timeouts.connect,
            }),
        };

        match result {
            Ok(stream) => {
                let (read_half, write_half) = stream.into_split();
                self.reader = Some(FramedRead::new(read_half, LineCodec::new()));
                self.writer = Some(FramedWrite::new(write_half, LineCodec::new()));
                self.reader_detached = false;
                self.state = ConnectionState::Connected;
                tracing::info!("Connected to {}", self.target);
                Ok(())
            }
            Err(e) => {
                self.release().await;
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<TcpStream, SessionError> {
        let key = self.target.key();
        let addrs = tokio::net::lookup_host((self.target.address.as_str(), self.target.port))
            .await
            .map_err(|source| SessionError::Resolve {
                target: key.clone(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()
            } else {
                TcpSocket::new_v6()
            };

            let attempt = async {
                let socket = socket?;
                socket.set_keepalive(true)?;
                socket.connect(addr).await
            };

            match attempt.await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(source) => SessionError::Connect { target: key, source },
            None => SessionError::Resolve {
                target: key,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses found",
                ),
            },
        })
    }

    /// Write one command line and flush it
    pub async fn send_command(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.state.is_connected() {
            return Err(SessionError::NotConnected(self.target.key()));
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(SessionError::NotConnected(self.target.key()));
        };

        let send = writer.send(text.to_string());
        let result = match tokio::time::timeout(self.timeouts.io, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(SessionError::Send {
                target: self.target.key(),
                source,
            }),
            Err(_) => Err(SessionError::Timeout {
                target: self.target.key(),
                timeout: self.timeouts.io,
            }),
        };

        match result {
            Ok(()) => {
                tracing::debug!("Sent to {}: {}", self.target.name, text);
                Ok(())
            }
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }

    /// Wait for one response line
    pub async fn read_response(&mut self) -> Result<String, SessionError> {
        if !self.state.is_connected() {
            return Err(SessionError::NotConnected(self.target.key()));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(if self.reader_detached {
                SessionError::ReaderDetached(self.target.key())
            } else {
                SessionError::NotConnected(self.target.key())
            });
        };

        let next = match self.timeouts.read {
            Some(limit) => match tokio::time::timeout(limit, reader.next()).await {
                Ok(next) => Ok(next),
                Err(_) => Err(SessionError::Timeout {
                    target: self.target.key(),
                    timeout: limit,
                }),
            },
            None => Ok(reader.next().await),
        };

        let result = match next {
            Ok(Some(Ok(line))) => return Ok(line),
            Ok(Some(Err(source))) => SessionError::Receive {
                target: self.target.key(),
                source,
            },
            Ok(None) => SessionError::Closed(self.target.key()),
            Err(e) => e,
        };

        self.close().await;
        Err(result)
    }

    /// Hand the response reader to a listener task
    ///
    /// The session keeps its writer; `read_response` fails from now on.
    pub fn take_reader(&mut self) -> Option<ResponseReader> {
        let inner = self.reader.take()?;
        self.reader_detached = true;
        Some(ResponseReader {
            target: self.target.clone(),
            inner,
        })
    }

    /// Close the session; safe to call any number of times
    pub async fn close(&mut self) {
        self.release().await;
        self.state = ConnectionState::Disconnected;
    }

    /// Drop writer, then reader; the socket goes with the last half
    async fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close().await {
                tracing::debug!("Error closing writer for {}: {}", self.target, e);
            }
        }
        if self.reader.take().is_some() {
            tracing::trace!("Released reader for {}", self.target);
        }
        self.reader_detached = false;
    }
}

/// Response reader detached from its session, owned by one listener
pub struct ResponseReader {
    target: HostTarget,
    inner: LineReader,
}

impl ResponseReader {
    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    /// Next response line; `Ok(None)` once the peer has closed the stream
    pub async fn next_line(&mut self) -> Result<Option<String>, SessionError> {
        match self.inner.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(source)) => Err(SessionError::Receive {
                target: self.target.key(),
                source,
            }),
            None => Ok(None),
        }
    }
}
