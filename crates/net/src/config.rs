use crate::fragment::DEFAULT_MAX_MESSAGE_FRAGMENTS;
use crate::wire::MAX_PACKET_SIZE;

pub const DEFAULT_TCP_PORT: u16 = 27015;
pub const DEFAULT_UDP_PORT: u16 = 27016;

/// Per-system tuning. Durations are in milliseconds.
#[derive(Debug, Clone)]
pub struct SystemFlags {
    pub enabled: bool,
    /// Send Custom messages over TCP instead of UDP by default.
    pub reliable_channel: bool,
    pub update_rate_hz: f32,
    pub ping_timer_ms: f32,
    pub drop_packet_timeout_ms: f32,
    pub socket_set_size: usize,
    pub max_packet_size: usize,
    pub heartbeat_timeout_ms: f32,
    pub max_tcp_failures: u32,
    pub reconnect_delay_ms: f32,
    pub connect_timeout_ms: u64,
    pub max_pending_messages: usize,
    /// Messages declaring more fragments than this are refused on receive
    /// and on send.
    pub max_message_fragments: u16,
}

impl Default for SystemFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            reliable_channel: false,
            update_rate_hz: 60.0,
            ping_timer_ms: 1000.0,
            drop_packet_timeout_ms: 5000.0,
            socket_set_size: 16,
            max_packet_size: MAX_PACKET_SIZE,
            heartbeat_timeout_ms: 10_000.0,
            max_tcp_failures: 3,
            reconnect_delay_ms: 1000.0,
            connect_timeout_ms: 250,
            max_pending_messages: 1024,
            max_message_fragments: DEFAULT_MAX_MESSAGE_FRAGMENTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub is_server: bool,
    pub peer_address: String,
    /// 0 picks an ephemeral port.
    pub udp_local_port: u16,
    pub udp_peer_port: u16,
    pub tcp_enabled: bool,
    pub tcp_port: u16,
    pub flags: SystemFlags,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            is_server: false,
            peer_address: "127.0.0.1".to_string(),
            udp_local_port: 0,
            udp_peer_port: 0,
            tcp_enabled: true,
            tcp_port: 0,
            flags: SystemFlags::default(),
        }
    }
}

impl NetworkConfig {
    pub fn server(tcp_port: u16, udp_port: u16) -> Self {
        Self {
            is_server: true,
            udp_local_port: udp_port,
            tcp_port,
            ..Default::default()
        }
    }

    pub fn client(peer_address: impl Into<String>, tcp_port: u16, udp_port: u16) -> Self {
        Self {
            is_server: false,
            peer_address: peer_address.into(),
            udp_peer_port: udp_port,
            tcp_port,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: SystemFlags) -> Self {
        self.flags = flags;
        self
    }
}
