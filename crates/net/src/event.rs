use std::net::SocketAddr;

use crate::wire::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    ClientConnected {
        client_id: u32,
    },
    ClientLinked {
        client_id: u32,
        addr: SocketAddr,
    },
    ClientDisconnected {
        client_id: u32,
        reason: DisconnectReason,
    },
    ConnectedToServer {
        client_id: u32,
    },
    DisconnectedFromServer {
        reason: DisconnectReason,
    },
    Message {
        client_id: u32,
        msg_type: MessageType,
        channel: Channel,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Kicked,
    TransportFailure,
    ProtocolViolation,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::TransportFailure => "lost its connection",
            DisconnectReason::ProtocolViolation => "violated the protocol",
        }
    }
}

/// Send request raised by the host application, forwarded as a Custom
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataToServer {
    pub data: Vec<u8>,
    pub over_tcp: bool,
}
