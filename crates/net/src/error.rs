use std::io;

use crate::fragment::FragmentError;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("not connected to a server")]
    NotConnected,
    #[error("unknown client {0}")]
    UnknownClient(u32),
    #[error("client {0} has no UDP link yet")]
    UdpNotLinked(u32),
    #[error("TCP is disabled")]
    TcpDisabled,
    #[error("operation only valid on the {0} side")]
    WrongRole(&'static str),
    #[error("fragmentation failed: {0}")]
    Fragment(#[from] FragmentError),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

pub type NetResult<T> = Result<T, NetError>;
