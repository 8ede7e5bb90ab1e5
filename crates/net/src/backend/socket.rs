use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use super::{NetworkBackend, Received, SocketHandle};
use crate::config::NetworkConfig;

const TCP_READ_CHUNK: usize = 4096;
const MAX_OUTBOUND_BYTES: usize = 1 << 20;

/// Fixed-capacity group of TCP streams polled together.
#[derive(Debug)]
pub struct SocketSet {
    capacity: usize,
    members: Vec<SocketHandle>,
}

impl SocketSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            members: Vec::with_capacity(capacity.max(1)),
        }
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, handle: SocketHandle) -> bool {
        self.members.contains(&handle)
    }

    fn add(&mut self, handle: SocketHandle) -> bool {
        if self.is_full() {
            return false;
        }
        self.members.push(handle);
        true
    }

    fn remove(&mut self, handle: SocketHandle) {
        self.members.retain(|h| *h != handle);
    }
}

#[derive(Debug)]
struct TcpPeer {
    stream: TcpStream,
    outbound: Vec<u8>,
    set_index: usize,
}

impl TcpPeer {
    fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Backend over non-blocking std sockets: one UDP socket plus a TCP
/// listener (server) or a single TCP stream (client).
#[derive(Debug)]
pub struct SocketBackend {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    udp: Option<UdpSocket>,
    peers: HashMap<SocketHandle, TcpPeer>,
    sets: Vec<SocketSet>,
    server_socket: Option<SocketHandle>,
    next_handle: u32,
    poll_cursor: usize,
    recv_buffer: Vec<u8>,
}

impl SocketBackend {
    pub fn new(config: &NetworkConfig) -> io::Result<Self> {
        let mut backend = Self {
            config: config.clone(),
            listener: None,
            udp: None,
            peers: HashMap::new(),
            sets: Vec::new(),
            server_socket: None,
            next_handle: 1,
            poll_cursor: 0,
            recv_buffer: vec![0u8; config.flags.max_packet_size.max(TCP_READ_CHUNK)],
        };

        if config.is_server {
            if config.tcp_enabled {
                let listener = TcpListener::bind(("0.0.0.0", config.tcp_port))?;
                listener.set_nonblocking(true)?;
                log::info!("TCP listening on {}", listener.local_addr()?);
                backend.listener = Some(listener);
            }

            backend.udp = Some(Self::bind_udp(config.udp_local_port)?);
        }

        Ok(backend)
    }

    fn bind_udp(port: u16) -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        log::info!("UDP bound on {}", socket.local_addr()?);
        Ok(socket)
    }

    pub fn local_tcp_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn local_udp_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn socket_sets(&self) -> &[SocketSet] {
        &self.sets
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn register(&mut self, stream: TcpStream) -> io::Result<SocketHandle> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        let handle = SocketHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);

        let set_index = match self.sets.iter().position(|s| !s.is_full()) {
            Some(index) => index,
            None => {
                self.sets.push(SocketSet::new(self.config.flags.socket_set_size));
                log::info!("Created socket set {}", self.sets.len() - 1);
                self.sets.len() - 1
            }
        };
        self.sets[set_index].add(handle);

        self.peers.insert(
            handle,
            TcpPeer {
                stream,
                outbound: Vec::new(),
                set_index,
            },
        );

        Ok(handle)
    }

    fn drop_peer(&mut self, handle: SocketHandle) -> Option<TcpPeer> {
        let peer = self.peers.remove(&handle)?;
        if let Some(set) = self.sets.get_mut(peer.set_index) {
            set.remove(handle);
        }
        if self.server_socket == Some(handle) {
            self.server_socket = None;
        }
        Some(peer)
    }

    fn receive_udp(&mut self) -> Option<Received> {
        let socket = self.udp.as_ref()?;

        loop {
            match socket.recv_from(&mut self.recv_buffer) {
                Ok((size, from)) => {
                    return Some(Received::Udp {
                        from,
                        bytes: self.recv_buffer[..size].to_vec(),
                    });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // ICMP port unreachable surfaces here on some platforms.
                    log::debug!("UDP receive error: {}", e);
                    return None;
                }
            }
        }
    }

    fn receive_tcp(&mut self) -> Option<Received> {
        let mut handles: Vec<SocketHandle> = self
            .sets
            .iter()
            .flat_map(|set| set.members.iter().copied())
            .collect();

        if handles.is_empty() {
            return None;
        }

        let start = self.poll_cursor % handles.len();
        handles.rotate_left(start);
        self.poll_cursor = self.poll_cursor.wrapping_add(1);

        let mut chunk = [0u8; TCP_READ_CHUNK];

        for handle in handles {
            let Some(peer) = self.peers.get_mut(&handle) else {
                continue;
            };

            if let Err(e) = peer.flush() {
                log::warn!("TCP flush to {} failed: {}", handle, e);
                self.drop_peer(handle);
                return Some(Received::TcpClosed { socket: handle });
            }

            match peer.stream.read(&mut chunk) {
                Ok(0) => {
                    self.drop_peer(handle);
                    return Some(Received::TcpClosed { socket: handle });
                }
                Ok(n) => {
                    return Some(Received::Tcp {
                        socket: handle,
                        bytes: chunk[..n].to_vec(),
                    });
                }
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::Interrupted =>
                {
                    continue;
                }
                Err(e) => {
                    log::warn!("TCP receive on {} failed: {}", handle, e);
                    self.drop_peer(handle);
                    return Some(Received::TcpClosed { socket: handle });
                }
            }
        }

        None
    }
}

impl NetworkBackend for SocketBackend {
    fn accept_tcp_client(&mut self) -> Option<SocketHandle> {
        let listener = self.listener.as_ref()?;

        match listener.accept() {
            Ok((stream, addr)) => match self.register(stream) {
                Ok(handle) => {
                    log::debug!("Accepted TCP stream {} from {}", handle, addr);
                    Some(handle)
                }
                Err(e) => {
                    log::warn!("Failed to configure stream from {}: {}", addr, e);
                    None
                }
            },
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                log::warn!("TCP accept failed: {}", e);
                None
            }
        }
    }

    fn connect_to_server(&mut self) -> io::Result<SocketHandle> {
        if let Some(handle) = self.server_socket {
            return Ok(handle);
        }

        if !self.config.tcp_enabled {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "TCP is disabled",
            ));
        }

        let addr = (self.config.peer_address.as_str(), self.config.tcp_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "server address did not resolve")
            })?;

        let timeout = Duration::from_millis(self.config.flags.connect_timeout_ms.max(1));
        let stream = TcpStream::connect_timeout(&addr, timeout)?;

        if self.udp.is_none() {
            self.udp = Some(Self::bind_udp(self.config.udp_local_port)?);
        }

        let handle = self.register(stream)?;
        self.server_socket = Some(handle);

        Ok(handle)
    }

    fn is_connected_to_server(&self) -> bool {
        self.server_socket.is_some()
    }

    fn send_udp(&mut self, dest: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        let socket = self
            .udp
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no UDP socket"))?;

        let sent = socket.send_to(bytes, dest)?;
        if sent != bytes.len() {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }

        Ok(())
    }

    fn send_tcp(&mut self, socket: SocketHandle, bytes: &[u8]) -> io::Result<()> {
        let peer = self
            .peers
            .get_mut(&socket)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unknown TCP stream"))?;

        if peer.outbound.len() + bytes.len() > MAX_OUTBOUND_BYTES {
            return Err(io::Error::other("TCP outbound buffer full"));
        }

        peer.outbound.extend_from_slice(bytes);
        peer.flush()
    }

    fn receive(&mut self) -> Option<Received> {
        if let Some(received) = self.receive_udp() {
            return Some(received);
        }
        self.receive_tcp()
    }

    fn close(&mut self, socket: SocketHandle) {
        if let Some(mut peer) = self.drop_peer(socket) {
            let _ = peer.flush();
            let _ = peer.stream.shutdown(Shutdown::Both);
        }
    }

    fn socket_set_index(&self, socket: SocketHandle) -> Option<usize> {
        self.peers.get(&socket).map(|p| p.set_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_set_capacity() {
        let mut set = SocketSet::new(2);
        assert!(set.is_empty());
        assert!(set.add(SocketHandle(1)));
        assert!(set.add(SocketHandle(2)));
        assert!(set.is_full());
        assert!(!set.add(SocketHandle(3)));

        set.remove(SocketHandle(1));
        assert!(!set.contains(SocketHandle(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_zero_capacity_set_holds_one() {
        let mut set = SocketSet::new(0);
        assert!(set.add(SocketHandle(1)));
        assert!(set.is_full());
    }

    #[test]
    fn test_server_binds_ephemeral_ports() {
        let config = NetworkConfig::server(0, 0);
        let backend = SocketBackend::new(&config).unwrap();

        assert!(backend.local_tcp_addr().is_some());
        assert!(backend.local_udp_addr().is_some());
        assert!(!backend.is_connected_to_server());
    }

    #[test]
    fn test_accept_spills_into_new_socket_sets() {
        let mut config = NetworkConfig::server(0, 0);
        config.flags.socket_set_size = 1;
        let mut server = SocketBackend::new(&config).unwrap();
        let addr = server.local_tcp_addr().unwrap();

        let _a = TcpStream::connect(("127.0.0.1", addr.port())).unwrap();
        let _b = TcpStream::connect(("127.0.0.1", addr.port())).unwrap();

        let mut accepted = Vec::new();
        let start = std::time::Instant::now();
        while accepted.len() < 2 && start.elapsed() < Duration::from_secs(2) {
            if let Some(handle) = server.accept_tcp_client() {
                accepted.push(handle);
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        assert_eq!(accepted.len(), 2);
        assert_eq!(server.socket_sets().len(), 2);
        assert_eq!(server.socket_set_index(accepted[0]), Some(0));
        assert_eq!(server.socket_set_index(accepted[1]), Some(1));

        server.close(accepted[0]);
        assert_eq!(server.peer_count(), 1);
        assert_eq!(server.socket_set_index(accepted[0]), None);
    }

    #[test]
    fn test_outbound_buffer_cap_fails_send() {
        let config = NetworkConfig::server(0, 0);
        let mut server = SocketBackend::new(&config).unwrap();
        let addr = server.local_tcp_addr().unwrap();

        let _silent = TcpStream::connect(("127.0.0.1", addr.port())).unwrap();

        let start = std::time::Instant::now();
        let handle = loop {
            if let Some(handle) = server.accept_tcp_client() {
                break handle;
            }
            assert!(start.elapsed() < Duration::from_secs(2), "no connection accepted");
            std::thread::sleep(Duration::from_millis(1));
        };

        let chunk = vec![0xAB; 64 * 1024];
        let mut failure = None;
        for _ in 0..4096 {
            if let Err(e) = server.send_tcp(handle, &chunk) {
                failure = Some(e);
                break;
            }
        }

        let err = failure.expect("send never hit the outbound cap");
        assert_eq!(err.kind(), io::ErrorKind::Other);

        let queued = server.peers[&handle].outbound.len();
        assert!(queued <= MAX_OUTBOUND_BYTES);
        assert!(queued + chunk.len() > MAX_OUTBOUND_BYTES);
    }

    #[test]
    fn test_refused_connect_returns_within_timeout() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut config = NetworkConfig::client("127.0.0.1", port, port);
        config.flags.connect_timeout_ms = 100;
        let mut client = SocketBackend::new(&config).unwrap();

        let start = std::time::Instant::now();
        assert!(client.connect_to_server().is_err());
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert!(!client.is_connected_to_server());
        assert!(client.local_udp_addr().is_none());
    }
}
