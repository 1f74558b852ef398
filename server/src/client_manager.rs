//! Registry of connected chat participants
//!
//! Tracks every client that completed the identity handshake, enforces the
//! server's capacity limit and identity uniqueness, and owns the outbound
//! queue of each connection so the relay loop can address clients by name.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("server full")]
    Full,
    #[error("`{0}` is not a valid name")]
    InvalidIdentity(String),
    #[error("`{0}` is already connected")]
    DuplicateIdentity(String),
}

/// A connected client
#[derive(Debug)]
pub struct Client {
    /// Connection id assigned when the socket was accepted
    pub id: u32,
    /// Name announced in the handshake
    pub identity: String,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    outbound: mpsc::UnboundedSender<String>,
}

impl Client {
    pub fn new(
        id: u32,
        identity: String,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            id,
            identity,
            addr,
            connected_at: Instant::now(),
            outbound,
        }
    }

    /// Queues a line for this client's writer task.
    pub fn send(&self, line: &str) -> bool {
        if self.outbound.send(line.to_string()).is_err() {
            warn!("Writer for {} has stopped, dropping: {}", self.identity, line);
            return false;
        }
        true
    }
}

/// Manages all connected clients
///
/// Identities are unique across the registry; the capacity limit counts
/// admitted clients only.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Checks whether `identity` could join right now.
    pub fn check_admission(&self, identity: &str) -> Result<(), AdmissionError> {
        if !shared::is_valid_identity(identity) {
            return Err(AdmissionError::InvalidIdentity(identity.to_string()));
        }
        if self.find_client_by_identity(identity).is_some() {
            return Err(AdmissionError::DuplicateIdentity(identity.to_string()));
        }
        if self.clients.len() >= self.max_clients {
            return Err(AdmissionError::Full);
        }
        Ok(())
    }

    /// Admits a client that completed the handshake.
    pub fn add_client(
        &mut self,
        id: u32,
        identity: &str,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Result<(), AdmissionError> {
        self.check_admission(identity)?;

        info!("Client {} connected from {} as {}", id, addr, identity);
        self.clients
            .insert(id, Client::new(id, identity.to_string(), addr, outbound));
        Ok(())
    }

    /// Removes a client. Dropping the returned client closes its writer.
    pub fn remove_client(&mut self, id: &u32) -> Option<Client> {
        let client = self.clients.remove(id)?;
        info!(
            "Client {} ({}) disconnected after {:.1}s",
            client.id,
            client.identity,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    pub fn find_client_by_identity(&self, identity: &str) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.identity == identity)
            .map(|client| client.id)
    }

    pub fn identity(&self, id: u32) -> Option<&str> {
        self.clients.get(&id).map(|client| client.identity.as_str())
    }

    pub fn send_to(&self, identity: &str, line: &str) -> bool {
        match self.clients.values().find(|client| client.identity == identity) {
            Some(client) => client.send(line),
            None => {
                debug!("{} is not connected, dropping: {}", identity, line);
                false
            }
        }
    }

    /// Sends `line` to every client except `exclude`.
    pub fn broadcast(&self, line: &str, exclude: Option<&str>) {
        for client in self.clients.values() {
            if Some(client.identity.as_str()) == exclude {
                continue;
            }
            client.send(line);
        }
    }

    /// Names of all connected clients, sorted.
    pub fn identities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .values()
            .map(|client| client.identity.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
