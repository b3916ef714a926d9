//! Transport-level client sessions for the synchronization server
//!
//! This module tracks which remote addresses are connected, under which
//! client id, and when each of them was last heard from. It knows nothing
//! about entities or inputs: those live in [`crate::game::ServerEcs`], keyed
//! by the same client ids.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Seconds of silence after which a client is dropped
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected remote peer
#[derive(Debug)]
pub struct Client {
    /// Server-assigned id, also the id of the client's input channel
    pub id: String,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: String, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Marks the client as active right now
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if no packets arrived from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Connected clients, capacity limit and id assignment
pub struct ClientManager {
    clients: HashMap<String, Client>,
    next_client_number: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Creates a manager accepting up to `max_clients` connections.
    /// Ids are handed out as `client-1`, `client-2`, ...
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_number: 1,
            max_clients,
        }
    }

    /// Registers a new connection, or returns None when the server is full
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<String> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = format!("client-{}", self.next_client_number);
        self.next_client_number += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id.clone(), Client::new(client_id.clone(), addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &str) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds the id of the client connected from `addr`
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<String> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id.clone())
    }

    pub fn addr_of(&self, client_id: &str) -> Option<SocketAddr> {
        self.clients.get(client_id).map(|client| client.addr)
    }

    /// Records activity from `client_id`. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: &str) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Removes clients silent for longer than `timeout` and returns their ids
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<String> {
        let timed_out: Vec<String> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id.clone())
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// All client ids with their addresses
    pub fn get_client_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.clients
            .values()
            .map(|client| (client.id.clone(), client.addr))
            .collect()
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

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new("client-1".to_string(), test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        client.touch();
        assert!(!client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(client_id1, "client-1");
        assert_eq!(client_id2, "client-2");
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(1);

        let first = manager.add_client(test_addr()).unwrap();
        assert!(manager.remove_client(&first));
        let second = manager.add_client(test_addr()).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.remove_client("client-999"));
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1.clone()));
        assert_eq!(manager.addr_of(&client_id1), Some(test_addr()));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_check_timeouts() {
        let mut manager = ClientManager::new(2);
        let stale = manager.add_client(test_addr()).unwrap();
        let fresh = manager.add_client(test_addr2()).unwrap();

        if let Some(client) = manager.clients.get_mut(&stale) {
            client.last_seen = Instant::now() - Duration::from_secs(10);
        }

        let removed = manager.check_timeouts(DEFAULT_CLIENT_TIMEOUT);
        assert_eq!(removed, vec![stale]);
        assert!(manager.touch(&fresh));
        assert_eq!(manager.len(), 1);
    }
}
