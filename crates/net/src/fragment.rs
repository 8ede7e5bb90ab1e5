use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::wire::{read_header, read_u16_be, MessageType, PacketHeader, WireError, HEADER_SIZE};

/// Identifies one logical message across all of its fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub client_id: u32,
    pub token: u32,
    pub packet_number: u32,
    pub msg_type: MessageType,
}

impl MessageKey {
    pub fn new(client_id: u32, token: u32, packet_number: u32, msg_type: MessageType) -> Self {
        Self {
            client_id,
            token,
            packet_number,
            msg_type,
        }
    }

    pub fn from_header(header: &PacketHeader) -> Self {
        Self::new(
            header.client_id,
            header.token,
            header.packet_number,
            header.msg_type,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("max packet size {0} leaves no room for a payload")]
    PacketSizeTooSmall(usize),
    #[error("payload of {len} bytes needs more than {} fragments", u16::MAX)]
    PayloadTooLarge { len: usize },
    #[error("payload of {len} bytes needs {needed} fragments, limit is {max}")]
    FragmentLimit { len: usize, needed: usize, max: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassembleError {
    #[error(transparent)]
    Malformed(#[from] WireError),
    #[error("fragment index {index} out of range for {total} fragments")]
    InvalidFragmentIndex { index: u16, total: u16 },
    #[error("payload truncated - declared {declared} bytes, {available} available")]
    TruncatedPayload { declared: usize, available: usize },
    #[error("fragment count mismatch - buffered {buffered}, received {received}")]
    FragmentCountMismatch { buffered: usize, received: u16 },
    #[error("message of {total} fragments exceeds the {max} fragment limit")]
    TooManyFragments { total: u16, max: u16 },
    #[error("message already reassembled")]
    Duplicate,
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    OversizedFrame { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

pub fn chunk_size(max_packet_size: usize) -> Result<usize, FragmentError> {
    if max_packet_size <= HEADER_SIZE {
        return Err(FragmentError::PacketSizeTooSmall(max_packet_size));
    }
    Ok((max_packet_size - HEADER_SIZE).min(u16::MAX as usize))
}

/// Splits `payload` into header-prefixed fragments of at most
/// `max_packet_size` bytes each. An empty payload still yields one fragment.
pub fn fragment_payload(
    key: MessageKey,
    timestamp: u64,
    payload: &[u8],
    max_packet_size: usize,
) -> Result<Vec<Vec<u8>>, FragmentError> {
    let chunk_max = chunk_size(max_packet_size)?;
    let total = payload.len().div_ceil(chunk_max).max(1);
    let total_fragments =
        u16::try_from(total).map_err(|_| FragmentError::PayloadTooLarge { len: payload.len() })?;

    let mut fragments = Vec::with_capacity(total);

    for index in 0..total_fragments {
        let offset = index as usize * chunk_max;
        let end = (offset + chunk_max).min(payload.len());
        let chunk = &payload[offset..end];

        let header = PacketHeader {
            client_id: key.client_id,
            token: key.token,
            packet_number: key.packet_number,
            timestamp,
            msg_type: key.msg_type,
            total_fragments,
            fragment_index: index,
            payload_len: chunk.len() as u16,
        };

        let mut packet = Vec::with_capacity(HEADER_SIZE + chunk.len());
        packet.extend_from_slice(&header.encode());
        packet.extend_from_slice(chunk);
        fragments.push(packet);
    }

    Ok(fragments)
}

/// Default cap on fragments per message, about 1 MiB of payload at the
/// default packet size.
pub const DEFAULT_MAX_MESSAGE_FRAGMENTS: u16 = 256;

/// Completed keys remembered per pending slot, for duplicate rejection.
const COMPLETED_PER_PENDING: usize = 4;

#[derive(Debug)]
struct PartialMessage {
    total: u16,
    parts: BTreeMap<u16, Vec<u8>>,
}

impl PartialMessage {
    fn is_complete(&self) -> bool {
        self.parts.len() == self.total as usize
    }
}

#[derive(Debug)]
pub struct Reassembler {
    buffers: HashMap<MessageKey, PartialMessage>,
    timers: HashMap<MessageKey, u64>,
    completed: HashMap<MessageKey, u64>,
    completed_order: VecDeque<MessageKey>,
    drop_timeout_ms: u64,
    max_pending: usize,
    max_fragments: u16,
}

impl Reassembler {
    pub fn new(drop_timeout_ms: u64, max_pending: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            timers: HashMap::new(),
            completed: HashMap::new(),
            completed_order: VecDeque::new(),
            drop_timeout_ms,
            max_pending: max_pending.max(1),
            max_fragments: DEFAULT_MAX_MESSAGE_FRAGMENTS,
        }
    }

    pub fn with_max_fragments(mut self, max_fragments: u16) -> Self {
        self.max_fragments = max_fragments.max(1);
        self
    }

    pub fn max_fragments(&self) -> u16 {
        self.max_fragments
    }

    /// Feeds one raw fragment. Returns the whole message once the last
    /// missing fragment arrives; the entry is consumed at that point.
    pub fn parse_and_reassemble(
        &mut self,
        raw: &[u8],
        now_ms: u64,
    ) -> Result<Option<ParsedPacket>, ReassembleError> {
        let header = read_header(raw)?;

        if header.fragment_index >= header.total_fragments {
            return Err(ReassembleError::InvalidFragmentIndex {
                index: header.fragment_index,
                total: header.total_fragments,
            });
        }

        if header.total_fragments > self.max_fragments {
            return Err(ReassembleError::TooManyFragments {
                total: header.total_fragments,
                max: self.max_fragments,
            });
        }

        let declared = header.payload_len as usize;
        let available = raw.len() - HEADER_SIZE;
        if declared > available {
            return Err(ReassembleError::TruncatedPayload {
                declared,
                available,
            });
        }

        let key = MessageKey::from_header(&header);

        if self.completed.contains_key(&key) {
            return Err(ReassembleError::Duplicate);
        }

        if let Some(partial) = self.buffers.get(&key) {
            if partial.total != header.total_fragments {
                return Err(ReassembleError::FragmentCountMismatch {
                    buffered: partial.total as usize,
                    received: header.total_fragments,
                });
            }
        } else {
            if self.buffers.len() >= self.max_pending {
                self.evict_oldest();
            }
            self.buffers.insert(
                key,
                PartialMessage {
                    total: header.total_fragments,
                    parts: BTreeMap::new(),
                },
            );
            self.timers.insert(key, now_ms);
        }

        let Some(partial) = self.buffers.get_mut(&key) else {
            return Ok(None);
        };

        let start = HEADER_SIZE;
        partial
            .parts
            .insert(header.fragment_index, raw[start..start + declared].to_vec());

        if !partial.is_complete() {
            return Ok(None);
        }

        let Some(partial) = self.buffers.remove(&key) else {
            return Ok(None);
        };
        self.timers.remove(&key);
        self.remember_completed(key, now_ms);

        let payload = partial.parts.into_values().flatten().collect();

        Ok(Some(ParsedPacket { header, payload }))
    }

    fn remember_completed(&mut self, key: MessageKey, now_ms: u64) {
        let cap = self.max_pending.saturating_mul(COMPLETED_PER_PENDING);

        while self.completed_order.len() >= cap {
            match self.completed_order.pop_front() {
                Some(oldest) => {
                    self.completed.remove(&oldest);
                }
                None => break,
            }
        }

        self.completed.insert(key, now_ms);
        self.completed_order.push_back(key);
    }

    /// Drops partial messages older than the configured timeout. Returns the
    /// evicted keys.
    pub fn clean(&mut self, now_ms: u64) -> Vec<MessageKey> {
        let timeout = self.drop_timeout_ms;

        let stale: Vec<MessageKey> = self
            .timers
            .iter()
            .filter(|(_, first_seen)| now_ms.saturating_sub(**first_seen) > timeout)
            .map(|(key, _)| *key)
            .collect();

        for key in &stale {
            self.buffers.remove(key);
            self.timers.remove(key);
            log::debug!(
                "Dropped partial {} message {} from client {}",
                key.msg_type.as_str(),
                key.packet_number,
                key.client_id
            );
        }

        self.completed
            .retain(|_, done_at| now_ms.saturating_sub(*done_at) <= timeout);
        let completed = &self.completed;
        self.completed_order.retain(|key| completed.contains_key(key));

        stale
    }

    /// Forgets every partial message from one client.
    pub fn forget_client(&mut self, client_id: u32) {
        self.buffers.retain(|key, _| key.client_id != client_id);
        self.timers.retain(|key, _| key.client_id != client_id);
        self.completed.retain(|key, _| key.client_id != client_id);
        self.completed_order.retain(|key| key.client_id != client_id);
    }

    pub fn pending_messages(&self) -> usize {
        self.buffers.len()
    }

    /// Payload bytes held by partial messages.
    pub fn buffered_bytes(&self) -> usize {
        self.buffers
            .values()
            .flat_map(|partial| partial.parts.values())
            .map(Vec::len)
            .sum()
    }

    pub fn completed_keys(&self) -> usize {
        self.completed.len()
    }

    pub fn tracked_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_pending(&self, key: &MessageKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn first_seen(&self, key: &MessageKey) -> Option<u64> {
        self.timers.get(key).copied()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .timers
            .iter()
            .min_by_key(|(_, first_seen)| **first_seen)
            .map(|(key, _)| *key);

        if let Some(key) = oldest {
            self.buffers.remove(&key);
            self.timers.remove(&key);
            log::warn!(
                "Reassembly buffer full, evicted message {} from client {}",
                key.packet_number,
                key.client_id
            );
        }
    }
}

/// Splits a TCP byte stream back into whole fragments.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ReassembleError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let len = HEADER_SIZE + read_u16_be(&self.buf[25..27]) as usize;
        if len > self.max_frame_len {
            return Err(ReassembleError::OversizedFrame {
                len,
                max: self.max_frame_len,
            });
        }

        if self.buf.len() < len {
            return Ok(None);
        }

        Ok(Some(self.buf.drain(..len).collect()))
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{MAX_FRAGMENT_PAYLOAD, MAX_PACKET_SIZE};

    fn key() -> MessageKey {
        MessageKey::new(42, 0xCAFE_BABE, 7, MessageType::Custom)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![Vec::new()];
        }
        let mut out = Vec::new();
        for perm in permutations(n - 1) {
            for pos in 0..=perm.len() {
                let mut next = perm.clone();
                next.insert(pos, n - 1);
                out.push(next);
            }
        }
        out
    }

    #[test]
    fn test_fragment_count_and_lengths() {
        let chunk = MAX_FRAGMENT_PAYLOAD;
        for len in [0, 1, chunk - 1, chunk, chunk + 1, 3 * chunk + 17] {
            let data = payload(len);
            let frags = fragment_payload(key(), 1000, &data, MAX_PACKET_SIZE).unwrap();

            let expected = len.div_ceil(chunk).max(1);
            assert_eq!(frags.len(), expected, "len {len}");

            let mut total_payload = 0;
            for (i, frag) in frags.iter().enumerate() {
                assert!(frag.len() <= MAX_PACKET_SIZE);
                let header = read_header(frag).unwrap();
                assert_eq!(header.total_fragments as usize, expected);
                assert_eq!(header.fragment_index as usize, i);
                assert_eq!(header.timestamp, 1000);
                assert_eq!(frag.len(), HEADER_SIZE + header.payload_len as usize);
                total_payload += header.payload_len as usize;
            }
            assert_eq!(total_payload, len);
        }
    }

    #[test]
    fn test_empty_payload_single_fragment() {
        let frags = fragment_payload(key(), 5, &[], MAX_PACKET_SIZE).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].len(), HEADER_SIZE);

        let mut reassembler = Reassembler::new(5000, 16);
        let parsed = reassembler
            .parse_and_reassemble(&frags[0], 0)
            .unwrap()
            .unwrap();
        assert!(parsed.payload.is_empty());
        assert_eq!(parsed.header.payload_len, 0);
    }

    #[test]
    fn test_packet_size_validation() {
        assert_eq!(
            fragment_payload(key(), 0, &[1], HEADER_SIZE),
            Err(FragmentError::PacketSizeTooSmall(HEADER_SIZE))
        );

        let data = payload(u16::MAX as usize + 1);
        assert_eq!(
            fragment_payload(key(), 0, &data, HEADER_SIZE + 1),
            Err(FragmentError::PayloadTooLarge { len: data.len() })
        );
    }

    #[test]
    fn test_reassembly_any_order() {
        let max_packet = HEADER_SIZE + 100;
        let data = payload(350);
        let frags = fragment_payload(key(), 0, &data, max_packet).unwrap();
        assert_eq!(frags.len(), 4);

        for order in permutations(frags.len()) {
            let mut reassembler = Reassembler::new(5000, 16);
            let mut completions = 0;

            for (step, &idx) in order.iter().enumerate() {
                let result = reassembler.parse_and_reassemble(&frags[idx], 0).unwrap();
                if step + 1 < order.len() {
                    assert!(result.is_none(), "completed early for {order:?}");
                } else {
                    let parsed = result.expect("last fragment should complete");
                    assert_eq!(parsed.payload, data);
                    assert_eq!(parsed.header.packet_number, 7);
                    completions += 1;
                }
            }

            assert_eq!(completions, 1);
            assert_eq!(reassembler.pending_messages(), 0);
            assert_eq!(reassembler.tracked_timers(), 0);
        }
    }

    #[test]
    fn test_duplicate_fragment_last_write_wins() {
        let max_packet = HEADER_SIZE + 10;
        let data = payload(20);
        let frags = fragment_payload(key(), 0, &data, max_packet).unwrap();

        let mut reassembler = Reassembler::new(5000, 16);
        assert!(reassembler.parse_and_reassemble(&frags[0], 0).unwrap().is_none());
        assert!(reassembler.parse_and_reassemble(&frags[0], 0).unwrap().is_none());
        assert_eq!(reassembler.pending_messages(), 1);

        let parsed = reassembler.parse_and_reassemble(&frags[1], 0).unwrap().unwrap();
        assert_eq!(parsed.payload, data);
    }

    #[test]
    fn test_duplicate_after_completion_is_ignored() {
        let max_packet = HEADER_SIZE + 10;
        let data = payload(20);
        let frags = fragment_payload(key(), 0, &data, max_packet).unwrap();

        let mut reassembler = Reassembler::new(5000, 16);
        reassembler.parse_and_reassemble(&frags[0], 0).unwrap();
        assert!(reassembler.parse_and_reassemble(&frags[1], 0).unwrap().is_some());

        for frag in &frags {
            assert_eq!(
                reassembler.parse_and_reassemble(frag, 10),
                Err(ReassembleError::Duplicate)
            );
        }
        assert_eq!(reassembler.pending_messages(), 0);
        assert_eq!(reassembler.tracked_timers(), 0);
    }

    #[test]
    fn test_short_buffer_does_not_mutate() {
        let frags = fragment_payload(key(), 0, &payload(10), MAX_PACKET_SIZE).unwrap();
        let mut reassembler = Reassembler::new(5000, 16);

        let result = reassembler.parse_and_reassemble(&frags[0][..HEADER_SIZE - 1], 0);
        assert!(matches!(result, Err(ReassembleError::Malformed(_))));
        assert_eq!(reassembler.pending_messages(), 0);
        assert_eq!(reassembler.tracked_timers(), 0);
    }

    #[test]
    fn test_invalid_fragment_index_rejected() {
        let header = PacketHeader {
            client_id: 1,
            token: 2,
            packet_number: 3,
            timestamp: 0,
            msg_type: MessageType::Custom,
            total_fragments: 2,
            fragment_index: 2,
            payload_len: 0,
        };
        let mut reassembler = Reassembler::new(5000, 16);

        assert_eq!(
            reassembler.parse_and_reassemble(&header.encode(), 0),
            Err(ReassembleError::InvalidFragmentIndex { index: 2, total: 2 })
        );

        let zero_total = PacketHeader {
            total_fragments: 0,
            fragment_index: 0,
            ..header
        };
        assert!(reassembler.parse_and_reassemble(&zero_total.encode(), 0).is_err());
        assert_eq!(reassembler.pending_messages(), 0);
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let frags = fragment_payload(key(), 0, &payload(10), MAX_PACKET_SIZE).unwrap();
        let mut reassembler = Reassembler::new(5000, 16);

        assert_eq!(
            reassembler.parse_and_reassemble(&frags[0][..HEADER_SIZE + 4], 0),
            Err(ReassembleError::TruncatedPayload {
                declared: 10,
                available: 4
            })
        );
        assert_eq!(reassembler.pending_messages(), 0);
    }

    #[test]
    fn test_fragment_count_mismatch_rejected() {
        let frags = fragment_payload(key(), 0, &payload(30), HEADER_SIZE + 10).unwrap();
        let other = fragment_payload(key(), 0, &payload(50), HEADER_SIZE + 10).unwrap();

        let mut reassembler = Reassembler::new(5000, 16);
        reassembler.parse_and_reassemble(&frags[0], 0).unwrap();

        assert_eq!(
            reassembler.parse_and_reassemble(&other[4], 0),
            Err(ReassembleError::FragmentCountMismatch {
                buffered: 3,
                received: 5
            })
        );
    }

    #[test]
    fn test_timeout_eviction() {
        let frags = fragment_payload(key(), 0, &payload(30), HEADER_SIZE + 10).unwrap();
        let mut reassembler = Reassembler::new(5000, 16);

        reassembler.parse_and_reassemble(&frags[0], 1_000).unwrap();
        assert!(reassembler.is_pending(&key()));
        assert_eq!(reassembler.first_seen(&key()), Some(1_000));

        assert!(reassembler.clean(6_000).is_empty());
        assert!(reassembler.is_pending(&key()));

        let evicted = reassembler.clean(6_001);
        assert_eq!(evicted, vec![key()]);
        assert!(!reassembler.is_pending(&key()));
        assert_eq!(reassembler.first_seen(&key()), None);
        assert_eq!(reassembler.tracked_timers(), 0);
    }

    #[test]
    fn test_pending_cap_evicts_oldest() {
        let mut reassembler = Reassembler::new(5000, 2);

        for (number, now) in [(1u32, 10u64), (2, 20), (3, 30)] {
            let k = MessageKey::new(1, 1, number, MessageType::Custom);
            let frags = fragment_payload(k, 0, &payload(30), HEADER_SIZE + 10).unwrap();
            reassembler.parse_and_reassemble(&frags[0], now).unwrap();
        }

        assert_eq!(reassembler.pending_messages(), 2);
        assert!(!reassembler.is_pending(&MessageKey::new(1, 1, 1, MessageType::Custom)));
        assert!(reassembler.is_pending(&MessageKey::new(1, 1, 3, MessageType::Custom)));
    }

    fn bare_header(packet_number: u32, total_fragments: u16) -> PacketHeader {
        PacketHeader {
            client_id: 1,
            token: 1,
            packet_number,
            timestamp: 0,
            msg_type: MessageType::Custom,
            total_fragments,
            fragment_index: 0,
            payload_len: 0,
        }
    }

    #[test]
    fn test_oversized_fragment_count_rejected() {
        let mut reassembler = Reassembler::new(5000, 1024);

        for number in 0..1024u32 {
            assert_eq!(
                reassembler.parse_and_reassemble(&bare_header(number, u16::MAX).encode(), 0),
                Err(ReassembleError::TooManyFragments {
                    total: u16::MAX,
                    max: DEFAULT_MAX_MESSAGE_FRAGMENTS
                })
            );
        }

        assert_eq!(reassembler.pending_messages(), 0);
        assert_eq!(reassembler.tracked_timers(), 0);
    }

    #[test]
    fn test_fragment_limit_is_configurable() {
        let mut reassembler = Reassembler::new(5000, 16).with_max_fragments(4);
        assert_eq!(reassembler.max_fragments(), 4);

        assert!(reassembler.parse_and_reassemble(&bare_header(1, 4).encode(), 0).is_ok());
        assert!(matches!(
            reassembler.parse_and_reassemble(&bare_header(2, 5).encode(), 0),
            Err(ReassembleError::TooManyFragments { total: 5, max: 4 })
        ));
        assert_eq!(reassembler.pending_messages(), 1);
    }

    #[test]
    fn test_partial_storage_follows_received_bytes() {
        let mut reassembler = Reassembler::new(5000, 1024).with_max_fragments(u16::MAX);

        for number in 0..1024u32 {
            reassembler
                .parse_and_reassemble(&bare_header(number, u16::MAX).encode(), 0)
                .unwrap();
        }
        assert_eq!(reassembler.pending_messages(), 1024);
        assert_eq!(reassembler.buffered_bytes(), 0);

        let frags = fragment_payload(key(), 0, &payload(30), HEADER_SIZE + 10).unwrap();
        reassembler.parse_and_reassemble(&frags[0], 1).unwrap();
        assert_eq!(reassembler.buffered_bytes(), 10);
    }

    #[test]
    fn test_completed_keys_are_bounded() {
        let mut reassembler = Reassembler::new(5000, 2);

        for number in 0..100u32 {
            let k = MessageKey::new(1, 1, number, MessageType::Custom);
            let frags = fragment_payload(k, 0, &[], MAX_PACKET_SIZE).unwrap();
            assert!(reassembler.parse_and_reassemble(&frags[0], 0).unwrap().is_some());
        }

        assert_eq!(reassembler.completed_keys(), 2 * COMPLETED_PER_PENDING);

        let newest = MessageKey::new(1, 1, 99, MessageType::Custom);
        let frags = fragment_payload(newest, 0, &[], MAX_PACKET_SIZE).unwrap();
        assert_eq!(
            reassembler.parse_and_reassemble(&frags[0], 0),
            Err(ReassembleError::Duplicate)
        );

        reassembler.clean(5_001);
        assert_eq!(reassembler.completed_keys(), 0);
    }

    #[test]
    fn test_forget_client() {
        let mut reassembler = Reassembler::new(5000, 16);
        for client_id in [1u32, 2] {
            let k = MessageKey::new(client_id, 9, 1, MessageType::EntityData);
            let frags = fragment_payload(k, 0, &payload(30), HEADER_SIZE + 10).unwrap();
            reassembler.parse_and_reassemble(&frags[0], 0).unwrap();
        }

        reassembler.forget_client(1);
        assert_eq!(reassembler.pending_messages(), 1);
        assert_eq!(reassembler.tracked_timers(), 1);
    }

    #[test]
    fn test_frame_decoder_split_and_joined() {
        let first = fragment_payload(key(), 0, &payload(40), MAX_PACKET_SIZE).unwrap();
        let second = fragment_payload(key(), 0, &[], MAX_PACKET_SIZE).unwrap();

        let mut stream = first[0].clone();
        stream.extend_from_slice(&second[0]);

        let mut decoder = FrameDecoder::new(MAX_PACKET_SIZE);
        decoder.push(&stream[..10]);
        assert_eq!(decoder.next_frame().unwrap(), None);

        decoder.push(&stream[10..HEADER_SIZE + 5]);
        assert_eq!(decoder.next_frame().unwrap(), None);

        decoder.push(&stream[HEADER_SIZE + 5..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(first[0].clone()));
        assert_eq!(decoder.next_frame().unwrap(), Some(second[0].clone()));
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_frame_decoder_rejects_oversized() {
        let frags = fragment_payload(key(), 0, &payload(100), MAX_PACKET_SIZE).unwrap();
        let mut decoder = FrameDecoder::new(HEADER_SIZE + 50);
        decoder.push(&frags[0]);

        assert_eq!(
            decoder.next_frame(),
            Err(ReassembleError::OversizedFrame {
                len: HEADER_SIZE + 100,
                max: HEADER_SIZE + 50
            })
        );
    }
}
