//! Per-connection session handler
//!
//! A connection moves through three phases:
//!
//! ```text
//! AwaitingHandshake --identity line--> Active --exit / EOF / fault--> Terminated
//!         \------------------ EOF / fault -----------------------------/
//! ```
//!
//! The client is registered on entering `Active` and its own record is
//! removed on entering `Terminated`, so a record exists exactly while the
//! session is active. Cancellation also moves an active session to
//! `Terminated`.

use std::net::IpAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use tr_protocol::{
    client_names_line, not_found_line, LineCodec, ProtocolError, ServerCommand, END_OF_INFO,
    GOODBYE,
};

use crate::executor::CommandRunner;
use crate::registry::{ClientId, ClientRegistry};

/// Lines to send back, and whether the session ends after them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub terminate: bool,
}

impl Reply {
    fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            terminate: false,
        }
    }
}

/// Handles one accepted connection from start to finish
pub struct SessionHandler {
    registry: Arc<ClientRegistry>,
    runner: Arc<dyn CommandRunner>,
    peer_ip: IpAddr,
}

impl SessionHandler {
    pub fn new(registry: Arc<ClientRegistry>, runner: Arc<dyn CommandRunner>, peer_ip: IpAddr) -> Self {
        Self {
            registry,
            runner,
            peer_ip,
        }
    }

    /// Drive the session until it terminates or `cancel` fires
    pub async fn run<S>(self, stream: S, cancel: CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, LineCodec::new());
        let mut writer = FramedWrite::new(write_half, LineCodec::new());

        let handshake = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Handshake with {} cancelled", self.peer_ip);
                return;
            }
            handshake = reader.next() => handshake,
        };
        let name = match handshake {
            Some(Ok(line)) => line.trim().to_string(),
            Some(Err(e)) => {
                tracing::warn!("Handshake from {} failed: {}", self.peer_ip, e);
                return;
            }
            None => {
                tracing::debug!("{} closed before sending its name", self.peer_ip);
                return;
            }
        };

        let id = self.registry.register(name.clone(), self.peer_ip).await;

        match self.serve(id, &mut reader, &mut writer, &cancel).await {
            Ok(()) => tracing::info!("Session with {} ({}) ended", name, self.peer_ip),
            Err(e) => tracing::warn!("Session with {} ({}) failed: {}", name, self.peer_ip, e),
        }

        self.registry.remove(id).await;
        if let Err(e) = writer.close().await {
            tracing::debug!("Error closing connection to {}: {}", self.peer_ip, e);
        }
    }

    async fn serve<S>(
        &self,
        id: ClientId,
        reader: &mut FramedRead<ReadHalf<S>, LineCodec>,
        writer: &mut FramedWrite<WriteHalf<S>, LineCodec>,
        cancel: &CancellationToken,
    ) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite,
    {
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Session with {} cancelled", self.peer_ip);
                    return Ok(());
                }
                next = reader.next() => match next {
                    Some(line) => line?,
                    None => return Ok(()),
                },
            };
            tracing::debug!("Received from {}: {}", self.peer_ip, line);
            self.registry.append_to(id, line.clone()).await;

            let reply = self.respond(&line).await;
            for response in reply.lines {
                writer.feed(response).await?;
            }
            writer.flush().await?;

            if reply.terminate {
                return Ok(());
            }
        }
    }

    /// Work out the reply to one command line
    pub async fn respond(&self, line: &str) -> Reply {
        match ServerCommand::parse(line) {
            ServerCommand::Exit => Reply {
                lines: vec![GOODBYE.to_string()],
                terminate: true,
            },
            ServerCommand::Info(target) => {
                let record = match self.registry.find(&target).await {
                    Some(record) => record.to_string(),
                    None => not_found_line(&target),
                };
                Reply::lines(vec![record, END_OF_INFO.to_string()])
            }
            ServerCommand::Help => {
                let names = self.registry.list_names().await;
                Reply::lines(vec![client_names_line(&names)])
            }
            ServerCommand::Shell(command) => match self.runner.run(&command).await {
                Ok(output) => Reply::lines(output),
                Err(e) => {
                    tracing::warn!("Command from {} failed: {}", self.peer_ip, e);
                    Reply::lines(vec![format!("Error processing command: {}", e)])
                }
            },
        }
    }
}
