//! Registry of connected clients
//!
//! Every connected client has one record. Names are not unique; lookups by
//! name return the earliest registration, lookups by IP the earliest record
//! from that address. Sessions hold the [`ClientId`] returned by `register`
//! and go through `append_to` and `remove`, so clients sharing an IP never
//! touch each other's record.

use std::fmt;
use std::net::IpAddr;

use tokio::sync::Mutex;

/// Handle to one registered record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

/// One connected client and the commands it has sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Registry handle, not part of the displayed record
    pub id: ClientId,
    /// Identity sent in the handshake
    pub name: String,
    /// Address the connection came from
    pub ip: IpAddr,
    /// Every line received after the handshake, in order
    pub commands: Vec<String>,
}

impl ClientRecord {
    pub fn new(id: ClientId, name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            id,
            name: name.into(),
            ip,
            commands: Vec::new(),
        }
    }
}

impl fmt::Display for ClientRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Client[name={}, ip={}, commands=[{}]]",
            self.name,
            self.ip,
            self.commands.join(", ")
        )
    }
}

/// Shared list of connected clients, guarded by one lock
#[derive(Debug, Default)]
pub struct ClientRegistry {
    inner: Mutex<Clients>,
}

#[derive(Debug, Default)]
struct Clients {
    records: Vec<ClientRecord>,
    next_id: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record for a newly identified client
    pub async fn register(&self, name: impl Into<String>, ip: IpAddr) -> ClientId {
        let mut clients = self.inner.lock().await;
        let id = ClientId(clients.next_id);
        clients.next_id += 1;

        let record = ClientRecord::new(id, name, ip);
        tracing::info!("Registered client {} from {}", record.name, ip);
        clients.records.push(record);
        id
    }

    /// Remove the first record from `ip`; no-op if there is none
    pub async fn unregister(&self, ip: IpAddr) -> Option<ClientRecord> {
        let mut clients = self.inner.lock().await;
        let idx = clients.records.iter().position(|c| c.ip == ip)?;
        let record = clients.records.remove(idx);
        tracing::info!("Unregistered client {} from {}", record.name, ip);
        Some(record)
    }

    /// Remove the record behind `id`; no-op if it is already gone
    pub async fn remove(&self, id: ClientId) -> Option<ClientRecord> {
        let mut clients = self.inner.lock().await;
        let idx = clients.records.iter().position(|c| c.id == id)?;
        let record = clients.records.remove(idx);
        tracing::info!("Unregistered client {} from {}", record.name, record.ip);
        Some(record)
    }

    /// First record registered under `name`
    pub async fn find(&self, name: &str) -> Option<ClientRecord> {
        self.inner
            .lock()
            .await
            .records
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Append a line to the history of the first record from `ip`
    pub async fn append_command(&self, ip: IpAddr, text: impl Into<String>) {
        let mut clients = self.inner.lock().await;
        match clients.records.iter_mut().find(|c| c.ip == ip) {
            Some(record) => record.commands.push(text.into()),
            None => tracing::debug!("No client registered from {}", ip),
        }
    }

    /// Append a line to the history of the record behind `id`
    pub async fn append_to(&self, id: ClientId, text: impl Into<String>) {
        let mut clients = self.inner.lock().await;
        match clients.records.iter_mut().find(|c| c.id == id) {
            Some(record) => record.commands.push(text.into()),
            None => tracing::debug!("Client {:?} is no longer registered", id),
        }
    }

    /// Names of all clients in registration order
    pub async fn list_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .records
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }
}
