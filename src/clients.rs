use std::collections::HashMap;
use std::net::SocketAddr;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::scheduler::job::ClientId;

/// A live connection as seen by the scheduler.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    pub addr: SocketAddr,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl ClientHandle {
    /// Ask the connection's tasks to stop and close the socket.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub addr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("{0} is no longer connected")]
    Disconnected(ClientId),
}

/// Registry of connected clients, guarded by the spooler lock.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientHandle>,
    next_id: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> ClientId {
        self.next_id += 1;
        let id = ClientId(self.next_id);
        self.clients.insert(
            id,
            ClientHandle {
                id,
                addr,
                outbound,
                cancel,
            },
        );
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<ClientHandle> {
        self.clients.remove(&id)
    }

    /// Queue a line for the client's writer. Never waits on the socket.
    pub fn send(&self, id: ClientId, line: String) -> Result<(), DeliveryError> {
        let client = self
            .clients
            .get(&id)
            .ok_or(DeliveryError::Disconnected(id))?;
        client
            .outbound
            .send(line)
            .map_err(|_| DeliveryError::Disconnected(id))
    }

    /// Remove and close every client.
    pub fn close_all(&mut self) -> Vec<ClientHandle> {
        let mut closed: Vec<ClientHandle> = self.clients.drain().map(|(_, c)| c).collect();
        closed.sort_by_key(|c| c.id);
        for client in &closed {
            client.close();
        }
        closed
    }

    pub fn list(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self
            .clients
            .values()
            .map(|c| ClientInfo {
                id: c.id,
                addr: c.addr.to_string(),
            })
            .collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn register_assigns_fresh_ids() {
        let mut registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.register(addr(1), tx.clone(), CancellationToken::new());
        let b = registry.register(addr(2), tx, CancellationToken::new());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list()[0].addr, "127.0.0.1:1");
    }

    #[test]
    fn send_routes_to_the_client_channel() {
        let mut registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.register(addr(1), tx, CancellationToken::new());

        registry.send(id, "hi".to_string()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hi");
    }

    #[test]
    fn send_to_removed_client_fails() {
        let mut registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(addr(1), tx, CancellationToken::new());
        registry.remove(id);

        assert!(matches!(
            registry.send(id, "late".to_string()),
            Err(DeliveryError::Disconnected(_))
        ));
    }

    #[test]
    fn send_after_writer_dropped_fails() {
        let mut registry = ClientRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register(addr(1), tx, CancellationToken::new());
        drop(rx);
        assert!(registry.send(id, "late".to_string()).is_err());
    }

    #[test]
    fn close_all_cancels_connections() {
        let mut registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        registry.register(addr(1), tx, token.clone());

        let closed = registry.close_all();
        assert_eq!(closed.len(), 1);
        assert!(token.is_cancelled());
        assert!(registry.is_empty());
    }
}
