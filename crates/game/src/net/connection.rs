use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::entity::{ClientId, EntityId};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("server full ({0} clients)")]
    ServerFull(usize),
}

#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub client_id: ClientId,
    pub state: ConnectionState,
    pub entity_id: Option<EntityId>,
    pub last_receive_time: Instant,
    pub send_sequence: u32,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, client_id: ClientId) -> Self {
        Self {
            addr,
            client_id,
            state: ConnectionState::Connecting,
            entity_id: None,
            last_receive_time: Instant::now(),
            send_sequence: 0,
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }

    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }
}

#[derive(Debug)]
pub struct ConnectionManager {
    clients_by_addr: HashMap<SocketAddr, ClientId>,
    clients: HashMap<ClientId, ClientConnection>,
    next_client_id: ClientId,
    max_clients: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients_by_addr: HashMap::new(),
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Looks up the connection for `addr`, registering a new one if there is room.
    pub fn get_or_create(
        &mut self,
        addr: SocketAddr,
    ) -> Result<&mut ClientConnection, ConnectionError> {
        let client_id = match self.clients_by_addr.get(&addr) {
            Some(&id) => id,
            None => {
                if self.clients.len() >= self.max_clients {
                    return Err(ConnectionError::ServerFull(self.max_clients));
                }
                let id = self.next_client_id;
                self.next_client_id += 1;
                self.clients_by_addr.insert(addr, id);
                id
            }
        };

        Ok(match self.clients.entry(client_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(ClientConnection::new(addr, client_id)),
        })
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&ClientConnection> {
        self.clients_by_addr
            .get(addr)
            .and_then(|id| self.clients.get(id))
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientConnection> {
        let id = self.clients_by_addr.get(addr)?;
        self.clients.get_mut(id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&ClientConnection> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut ClientConnection> {
        self.clients.get_mut(&client_id)
    }

    pub fn remove(&mut self, client_id: ClientId) -> Option<ClientConnection> {
        let conn = self.clients.remove(&client_id)?;
        self.clients_by_addr.remove(&conn.addr);
        Some(conn)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    /// Removes and returns every connection that has been silent past the timeout.
    pub fn cleanup_timed_out(&mut self) -> Vec<ClientConnection> {
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_timed_out(self.timeout))
            .map(|(&id, _)| id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.clients
            .values()
            .filter(|c| c.state == ConnectionState::Connected)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn same_address_reuses_connection() {
        let mut manager = ConnectionManager::new(4);
        let first = manager.get_or_create(addr(4000)).unwrap().client_id;
        let again = manager.get_or_create(addr(4000)).unwrap().client_id;
        let other = manager.get_or_create(addr(4001)).unwrap().client_id;

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(manager.total_count(), 2);
    }

    #[test]
    fn rejects_when_full() {
        let mut manager = ConnectionManager::new(1);
        manager.get_or_create(addr(4000)).unwrap();
        assert_eq!(
            manager.get_or_create(addr(4001)).unwrap_err(),
            ConnectionError::ServerFull(1)
        );
    }

    #[test]
    fn removal_frees_address() {
        let mut manager = ConnectionManager::new(2);
        let id = manager.get_or_create(addr(4000)).unwrap().client_id;
        assert!(manager.remove(id).is_some());
        assert!(manager.get_by_addr(&addr(4000)).is_none());
    }

    #[test]
    fn silent_clients_time_out() {
        let mut manager = ConnectionManager::with_timeout(2, Duration::ZERO);
        manager.get_or_create(addr(4000)).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        let removed = manager.cleanup_timed_out();
        assert_eq!(removed.len(), 1);
        assert_eq!(manager.total_count(), 0);
    }
}
