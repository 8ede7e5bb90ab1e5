pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod fragment;
pub mod session;
pub mod system;
pub mod wire;

pub use backend::{MockBackend, NetworkBackend, Received, SocketBackend, SocketHandle, SocketSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT, NetworkConfig, SystemFlags};
pub use error::{NetError, NetResult};
pub use event::{Channel, DisconnectReason, NetworkEvent, SendDataToServer};
pub use fragment::{
    FragmentError, FrameDecoder, MessageKey, ParsedPacket, ReassembleError, Reassembler,
    fragment_payload,
};
pub use session::{ClientInfo, ClientRegistry, ClientSession, ClientState, LinkState};
pub use system::NetworkSystem;
pub use wire::{HEADER_SIZE, MAX_PACKET_SIZE, MessageType, PacketHeader, WireError};
