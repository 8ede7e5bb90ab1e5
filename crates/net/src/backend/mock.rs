use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;

use super::{NetworkBackend, Received, SocketHandle};

/// In-memory backend for tests. Records everything sent and replays queued
/// receives in FIFO order.
#[derive(Debug)]
pub struct MockBackend {
    pub pending_accepts: VecDeque<SocketHandle>,
    pub inbound: VecDeque<Received>,
    pub sent_udp: Vec<(SocketAddr, Vec<u8>)>,
    pub sent_tcp: Vec<(SocketHandle, Vec<u8>)>,
    pub closed: Vec<SocketHandle>,
    pub refuse_connect: bool,
    pub fail_udp_sends: bool,
    pub fail_tcp_sends: bool,
    pub socket_set_size: usize,
    server_handle: SocketHandle,
    connected: bool,
    connect_attempts: u32,
    accepted: Vec<SocketHandle>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            pending_accepts: VecDeque::new(),
            inbound: VecDeque::new(),
            sent_udp: Vec::new(),
            sent_tcp: Vec::new(),
            closed: Vec::new(),
            refuse_connect: false,
            fail_udp_sends: false,
            fail_tcp_sends: false,
            socket_set_size: 16,
            server_handle: SocketHandle(1),
            connected: false,
            connect_attempts: 0,
            accepted: Vec::new(),
        }
    }

    pub fn server_handle(&self) -> SocketHandle {
        self.server_handle
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    pub fn queue_accept(&mut self, socket: SocketHandle) {
        self.pending_accepts.push_back(socket);
    }

    pub fn push_tcp(&mut self, socket: SocketHandle, bytes: Vec<u8>) {
        self.inbound.push_back(Received::Tcp { socket, bytes });
    }

    pub fn push_udp(&mut self, from: SocketAddr, bytes: Vec<u8>) {
        self.inbound.push_back(Received::Udp { from, bytes });
    }

    pub fn push_tcp_closed(&mut self, socket: SocketHandle) {
        self.inbound.push_back(Received::TcpClosed { socket });
    }

    pub fn take_sent_tcp(&mut self) -> Vec<(SocketHandle, Vec<u8>)> {
        std::mem::take(&mut self.sent_tcp)
    }

    pub fn take_sent_udp(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut self.sent_udp)
    }
}

impl NetworkBackend for MockBackend {
    fn accept_tcp_client(&mut self) -> Option<SocketHandle> {
        let socket = self.pending_accepts.pop_front()?;
        self.accepted.push(socket);
        Some(socket)
    }

    fn connect_to_server(&mut self) -> io::Result<SocketHandle> {
        self.connect_attempts += 1;

        if self.refuse_connect {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }

        self.connected = true;
        Ok(self.server_handle)
    }

    fn is_connected_to_server(&self) -> bool {
        self.connected
    }

    fn send_udp(&mut self, dest: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        self.sent_udp.push((dest, bytes.to_vec()));
        if self.fail_udp_sends {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        Ok(())
    }

    fn send_tcp(&mut self, socket: SocketHandle, bytes: &[u8]) -> io::Result<()> {
        self.sent_tcp.push((socket, bytes.to_vec()));
        if self.fail_tcp_sends {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        Ok(())
    }

    fn receive(&mut self) -> Option<Received> {
        self.inbound.pop_front()
    }

    fn close(&mut self, socket: SocketHandle) {
        self.closed.push(socket);
        if socket == self.server_handle {
            self.connected = false;
        }
    }

    fn socket_set_index(&self, socket: SocketHandle) -> Option<usize> {
        let position = self.accepted.iter().position(|s| *s == socket)?;
        Some(position / self.socket_set_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_and_replays() {
        let mut backend = MockBackend::new();
        let from: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        backend.push_udp(from, vec![1, 2]);
        backend.push_tcp(SocketHandle(5), vec![3]);

        assert_eq!(
            backend.receive(),
            Some(Received::Udp {
                from,
                bytes: vec![1, 2]
            })
        );
        assert_eq!(
            backend.receive(),
            Some(Received::Tcp {
                socket: SocketHandle(5),
                bytes: vec![3]
            })
        );
        assert_eq!(backend.receive(), None);

        backend.fail_tcp_sends = true;
        assert!(backend.send_tcp(SocketHandle(5), &[9]).is_err());
        assert_eq!(backend.take_sent_tcp().len(), 1);
        assert!(backend.sent_tcp.is_empty());
    }

    #[test]
    fn test_mock_socket_sets() {
        let mut backend = MockBackend::new();
        backend.socket_set_size = 2;
        for id in 10..13 {
            backend.queue_accept(SocketHandle(id));
            backend.accept_tcp_client();
        }

        assert_eq!(backend.socket_set_index(SocketHandle(10)), Some(0));
        assert_eq!(backend.socket_set_index(SocketHandle(11)), Some(0));
        assert_eq!(backend.socket_set_index(SocketHandle(12)), Some(1));
        assert_eq!(backend.socket_set_index(SocketHandle(99)), None);
    }
}
