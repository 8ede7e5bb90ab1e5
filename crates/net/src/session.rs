use std::collections::HashMap;
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::backend::SocketHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    WaitingForId,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    AwaitingUdpLink,
    Linked,
}

/// Server-side record for one connected peer.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub socket: SocketHandle,
    pub set_index: usize,
    pub client_id: u32,
    pub token: u32,
    pub rtt_ms: f32,
    pub last_heartbeat_ms: f32,
    pub last_ping_sent_ms: f32,
    pub udp_addr: Option<SocketAddr>,
    pub tcp_failures: u32,
}

impl ClientInfo {
    pub fn new(socket: SocketHandle, set_index: usize, client_id: u32, token: u32) -> Self {
        Self {
            socket,
            set_index,
            client_id,
            token,
            rtt_ms: 0.0,
            last_heartbeat_ms: 0.0,
            last_ping_sent_ms: 0.0,
            udp_addr: None,
            tcp_failures: 0,
        }
    }

    pub fn udp_linked(&self) -> bool {
        self.udp_addr.is_some()
    }

    pub fn link_state(&self) -> LinkState {
        if self.udp_linked() {
            LinkState::Linked
        } else {
            LinkState::AwaitingUdpLink
        }
    }

    pub fn matches(&self, client_id: u32, token: u32) -> bool {
        self.client_id == client_id && self.token == token
    }

    pub fn advance(&mut self, dt_ms: f32) {
        self.last_heartbeat_ms += dt_ms;
        self.last_ping_sent_ms += dt_ms;
    }

    pub fn touch(&mut self) {
        self.last_heartbeat_ms = 0.0;
    }

    pub fn is_timed_out(&self, timeout_ms: f32) -> bool {
        self.last_heartbeat_ms >= timeout_ms
    }
}

/// Table of connected clients, indexed by TCP stream and by client id.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: HashMap<SocketHandle, ClientInfo>,
    ids: HashMap<u32, SocketHandle>,
    next_client_id: u32,
    rng: StdRng,
}

impl ClientRegistry {
    pub fn new(rng: StdRng) -> Self {
        Self {
            clients: HashMap::new(),
            ids: HashMap::new(),
            next_client_id: 1,
            rng,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn register(&mut self, socket: SocketHandle, set_index: usize) -> &ClientInfo {
        if let Some(stale) = self.clients.remove(&socket) {
            self.ids.remove(&stale.client_id);
        }

        let client_id = self.allocate_id();
        let token = self.gen_token();

        self.ids.insert(client_id, socket);
        self.clients
            .entry(socket)
            .insert_entry(ClientInfo::new(socket, set_index, client_id, token))
            .into_mut()
    }

    fn allocate_id(&mut self) -> u32 {
        loop {
            let id = self.next_client_id;
            self.next_client_id = self.next_client_id.wrapping_add(1);
            if id != 0 && !self.ids.contains_key(&id) {
                return id;
            }
        }
    }

    fn gen_token(&mut self) -> u32 {
        loop {
            let token = self.rng.next_u32();
            if token != 0 {
                return token;
            }
        }
    }

    pub fn get(&self, socket: SocketHandle) -> Option<&ClientInfo> {
        self.clients.get(&socket)
    }

    pub fn get_mut(&mut self, socket: SocketHandle) -> Option<&mut ClientInfo> {
        self.clients.get_mut(&socket)
    }

    pub fn get_by_id(&self, client_id: u32) -> Option<&ClientInfo> {
        self.ids
            .get(&client_id)
            .and_then(|socket| self.clients.get(socket))
    }

    pub fn get_by_id_mut(&mut self, client_id: u32) -> Option<&mut ClientInfo> {
        if let Some(socket) = self.ids.get(&client_id) {
            self.clients.get_mut(socket)
        } else {
            None
        }
    }

    /// Looks up a client by id, but only if the token matches its session.
    pub fn authenticate(&mut self, client_id: u32, token: u32) -> Option<&mut ClientInfo> {
        self.get_by_id_mut(client_id)
            .filter(|client| client.matches(client_id, token))
    }

    pub fn contains(&self, client_id: u32) -> bool {
        self.ids.contains_key(&client_id)
    }

    pub fn remove(&mut self, socket: SocketHandle) -> Option<ClientInfo> {
        let client = self.clients.remove(&socket)?;
        self.ids.remove(&client.client_id);
        Some(client)
    }

    pub fn remove_by_id(&mut self, client_id: u32) -> Option<ClientInfo> {
        let socket = self.ids.remove(&client_id)?;
        self.clients.remove(&socket)
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.ids.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientInfo> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientInfo> {
        self.clients.values_mut()
    }

    pub fn timed_out(&self, timeout_ms: f32) -> Vec<u32> {
        self.clients
            .values()
            .filter(|c| c.is_timed_out(timeout_ms))
            .map(|c| c.client_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn linked_count(&self) -> usize {
        self.clients.values().filter(|c| c.udp_linked()).count()
    }
}

/// Client-side view of the single server session.
#[derive(Debug)]
pub struct ClientSession {
    pub state: ClientState,
    pub client_id: u32,
    pub token: u32,
    pub socket: Option<SocketHandle>,
    pub since_attempt_ms: f32,
    pub last_heartbeat_ms: f32,
    pub tcp_failures: u32,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        Self {
            state: ClientState::Connecting,
            client_id: 0,
            token: 0,
            socket: None,
            since_attempt_ms: f32::INFINITY,
            last_heartbeat_ms: 0.0,
            tcp_failures: 0,
        }
    }

    pub fn stream_open(&mut self, socket: SocketHandle) {
        self.state = ClientState::WaitingForId;
        self.socket = Some(socket);
        self.last_heartbeat_ms = 0.0;
        self.tcp_failures = 0;
    }

    pub fn establish(&mut self, client_id: u32, token: u32) {
        self.state = ClientState::Connected;
        self.client_id = client_id;
        self.token = token;
        self.last_heartbeat_ms = 0.0;
    }

    pub fn reset(&mut self) {
        self.state = ClientState::Connecting;
        self.client_id = 0;
        self.token = 0;
        self.socket = None;
        self.since_attempt_ms = 0.0;
        self.last_heartbeat_ms = 0.0;
        self.tcp_failures = 0;
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_fresh_ids_and_tokens() {
        let mut registry = ClientRegistry::with_seed(7);

        let first = registry.register(SocketHandle(10), 0).clone();
        let second = registry.register(SocketHandle(11), 0).clone();

        assert_eq!(first.client_id, 1);
        assert_eq!(second.client_id, 2);
        assert_ne!(first.token, 0);
        assert_ne!(second.token, 0);
        assert_eq!(first.link_state(), LinkState::AwaitingUdpLink);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![1, 2]);
    }

    #[test]
    fn test_seeded_tokens_are_deterministic() {
        let mut a = ClientRegistry::with_seed(99);
        let mut b = ClientRegistry::with_seed(99);

        let ta = a.register(SocketHandle(1), 0).token;
        let tb = b.register(SocketHandle(1), 0).token;
        assert_eq!(ta, tb);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut registry = ClientRegistry::with_seed(1);
        let id = registry.register(SocketHandle(1), 0).client_id;
        registry.remove(SocketHandle(1));

        let next = registry.register(SocketHandle(2), 0).client_id;
        assert_ne!(id, next);
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_authenticate_requires_matching_token() {
        let mut registry = ClientRegistry::with_seed(3);
        let info = registry.register(SocketHandle(4), 0).clone();

        assert!(registry.authenticate(info.client_id, info.token).is_some());
        assert!(
            registry
                .authenticate(info.client_id, info.token.wrapping_add(1))
                .is_none()
        );
        assert!(registry.authenticate(info.client_id + 1, info.token).is_none());
    }

    #[test]
    fn test_remove_by_id_clears_both_indexes() {
        let mut registry = ClientRegistry::with_seed(3);
        let id = registry.register(SocketHandle(4), 0).client_id;

        assert!(registry.remove_by_id(id).is_some());
        assert!(registry.get(SocketHandle(4)).is_none());
        assert!(registry.get_by_id(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_heartbeat_counters() {
        let mut registry = ClientRegistry::with_seed(3);
        registry.register(SocketHandle(4), 0);

        for client in registry.iter_mut() {
            client.advance(600.0);
        }
        assert!(registry.timed_out(1000.0).is_empty());

        for client in registry.iter_mut() {
            client.advance(600.0);
        }
        assert_eq!(registry.timed_out(1000.0), vec![1]);

        registry.get_mut(SocketHandle(4)).unwrap().touch();
        assert!(registry.timed_out(1000.0).is_empty());
    }

    #[test]
    fn test_client_session_transitions() {
        let mut session = ClientSession::new();
        assert_eq!(session.state, ClientState::Connecting);

        session.stream_open(SocketHandle(1));
        assert_eq!(session.state, ClientState::WaitingForId);

        session.establish(5, 77);
        assert!(session.is_connected());
        assert_eq!((session.client_id, session.token), (5, 77));

        session.reset();
        assert_eq!(session.state, ClientState::Connecting);
        assert_eq!(session.socket, None);
    }
}
