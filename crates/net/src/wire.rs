pub const HEADER_SIZE: usize = 27;
pub const MAX_PACKET_SIZE: usize = 4096;
pub const MAX_FRAGMENT_PAYLOAD: usize = MAX_PACKET_SIZE - HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Heartbeat = 0x01,
    Ping = 0x02,
    Pong = 0x03,
    Disconnect = 0x04,
    Connect = 0x05,
    Handshake = 0x06,
    EntityData = 0x07,
    Custom = 0xFE,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Heartbeat => "heartbeat",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Disconnect => "disconnect",
            MessageType::Connect => "connect",
            MessageType::Handshake => "handshake",
            MessageType::EntityData => "entity-data",
            MessageType::Custom => "custom",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageType::Heartbeat),
            0x02 => Ok(MessageType::Ping),
            0x03 => Ok(MessageType::Pong),
            0x04 => Ok(MessageType::Disconnect),
            0x05 => Ok(MessageType::Connect),
            0x06 => Ok(MessageType::Handshake),
            0x07 => Ok(MessageType::EntityData),
            0xFE => Ok(MessageType::Custom),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed header: {len} bytes, need {}", HEADER_SIZE)]
    MalformedHeader { len: usize },
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),
}

/// Fixed-size header carried in front of every fragment, TCP or UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub client_id: u32,
    pub token: u32,
    pub packet_number: u32,
    pub timestamp: u64,
    pub msg_type: MessageType,
    pub total_fragments: u16,
    pub fragment_index: u16,
    pub payload_len: u16,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        encode_into(&mut buf, self);
        buf
    }

    /// Size of the whole fragment this header announces.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }
}

pub fn write_header(buf: &mut [u8], header: &PacketHeader) -> Result<(), WireError> {
    let Some(dst) = buf.get_mut(..HEADER_SIZE) else {
        return Err(WireError::MalformedHeader { len: buf.len() });
    };
    encode_into(dst, header);
    Ok(())
}

pub fn read_header(buf: &[u8]) -> Result<PacketHeader, WireError> {
    if buf.len() < HEADER_SIZE {
        return Err(WireError::MalformedHeader { len: buf.len() });
    }

    Ok(PacketHeader {
        client_id: read_u32_be(&buf[0..4]),
        token: read_u32_be(&buf[4..8]),
        packet_number: read_u32_be(&buf[8..12]),
        timestamp: read_u64_be(&buf[12..20]),
        msg_type: MessageType::try_from(buf[20])?,
        total_fragments: read_u16_be(&buf[21..23]),
        fragment_index: read_u16_be(&buf[23..25]),
        payload_len: read_u16_be(&buf[25..27]),
    })
}

// Caller guarantees `dst.len() >= HEADER_SIZE`.
fn encode_into(dst: &mut [u8], h: &PacketHeader) {
    write_u32_be(&mut dst[0..4], h.client_id);
    write_u32_be(&mut dst[4..8], h.token);
    write_u32_be(&mut dst[8..12], h.packet_number);
    write_u64_be(&mut dst[12..20], h.timestamp);
    dst[20] = h.msg_type as u8;
    write_u16_be(&mut dst[21..23], h.total_fragments);
    write_u16_be(&mut dst[23..25], h.fragment_index);
    write_u16_be(&mut dst[25..27], h.payload_len);
}

#[inline]
pub fn write_u16_be(buf: &mut [u8], v: u16) {
    buf[..2].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub fn write_u32_be(buf: &mut [u8], v: u32) {
    buf[..4].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub fn write_u64_be(buf: &mut [u8], v: u64) {
    buf[..8].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub fn read_u16_be(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

#[inline]
pub fn read_u32_be(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

#[inline]
pub fn read_u64_be(buf: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[..8]);
    u64::from_be_bytes(bytes)
}
