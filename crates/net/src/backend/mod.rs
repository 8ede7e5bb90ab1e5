mod mock;
mod socket;

pub use mock::MockBackend;
pub use socket::{SocketBackend, SocketSet};

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Opaque id for one TCP stream owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketHandle(pub u32);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Udp { from: SocketAddr, bytes: Vec<u8> },
    Tcp { socket: SocketHandle, bytes: Vec<u8> },
    TcpClosed { socket: SocketHandle },
}

/// Socket operations the network system drives once per tick. Every call
/// must return immediately, except `connect_to_server`, which may block for at
/// most `connect_timeout_ms` while a client has no server stream.
pub trait NetworkBackend {
    /// Server side: picks up one pending TCP connection, if any.
    fn accept_tcp_client(&mut self) -> Option<SocketHandle>;

    /// Client side: connects to the configured server. Returns the existing
    /// stream if already connected. Blocks for at most `connect_timeout_ms`.
    fn connect_to_server(&mut self) -> io::Result<SocketHandle>;

    fn is_connected_to_server(&self) -> bool;

    fn send_udp(&mut self, dest: SocketAddr, bytes: &[u8]) -> io::Result<()>;

    fn send_tcp(&mut self, socket: SocketHandle, bytes: &[u8]) -> io::Result<()>;

    /// Polls UDP and every TCP stream for one pending read.
    fn receive(&mut self) -> Option<Received>;

    fn close(&mut self, socket: SocketHandle);

    fn socket_set_index(&self, _socket: SocketHandle) -> Option<usize> {
        None
    }
}
