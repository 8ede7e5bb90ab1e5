use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, ToSocketAddrs};

use crate::backend::{NetworkBackend, Received, SocketHandle};
use crate::clock::{Clock, SystemClock};
use crate::config::NetworkConfig;
use crate::error::{NetError, NetResult};
use crate::event::{Channel, DisconnectReason, NetworkEvent, SendDataToServer};
use crate::fragment::{
    chunk_size, fragment_payload, FragmentError, FrameDecoder, MessageKey, ParsedPacket,
    ReassembleError, Reassembler,
};
use crate::session::{ClientInfo, ClientRegistry, ClientSession, ClientState};
use crate::wire::{read_header, read_u64_be, write_u64_be, MessageType};

const MAX_ACCEPTS_PER_TICK: usize = 64;
const MAX_RECEIVES_PER_TICK: usize = 4096;

/// Tick-driven driver for one side of the connection. Owns the backend, the
/// client registry (server) or session (client), and the reassembly buffer.
pub struct NetworkSystem<B: NetworkBackend> {
    backend: B,
    config: NetworkConfig,
    clock: Box<dyn Clock>,
    reassembly: Reassembler,
    decoders: HashMap<SocketHandle, FrameDecoder>,
    registry: ClientRegistry,
    session: ClientSession,
    server_udp: Option<SocketAddr>,
    next_packet_number: u32,
    delta_ms: f32,
    pending_events: VecDeque<NetworkEvent>,
}

impl<B: NetworkBackend> NetworkSystem<B> {
    pub fn new(backend: B, config: NetworkConfig) -> Self {
        Self::with_parts(
            backend,
            config,
            Box::new(SystemClock),
            ClientRegistry::from_entropy(),
        )
    }

    pub fn with_parts(
        backend: B,
        config: NetworkConfig,
        clock: Box<dyn Clock>,
        registry: ClientRegistry,
    ) -> Self {
        let reassembly = Reassembler::new(
            config.flags.drop_packet_timeout_ms.max(0.0) as u64,
            config.flags.max_pending_messages,
        )
        .with_max_fragments(config.flags.max_message_fragments);

        Self {
            backend,
            config,
            clock,
            reassembly,
            decoders: HashMap::new(),
            registry,
            session: ClientSession::new(),
            server_udp: None,
            next_packet_number: 0,
            delta_ms: 0.0,
            pending_events: VecDeque::new(),
        }
    }

    pub fn init(&mut self) {
        if self.config.is_server {
            log::info!(
                "Server ready (TCP:{} UDP:{})",
                self.config.tcp_port,
                self.config.udp_local_port
            );
        } else {
            self.attempt_connect();
        }
    }

    /// Accumulates elapsed time until the next `execute`.
    pub fn on_tick(&mut self, dt_ms: f32) {
        self.delta_ms += dt_ms;
    }

    pub fn on_send(&mut self, request: SendDataToServer) -> NetResult<()> {
        self.send_to_server(&request.data, request.over_tcp)
    }

    pub fn execute(&mut self) {
        let dt = std::mem::take(&mut self.delta_ms);

        if !self.config.flags.enabled {
            return;
        }

        if self.config.is_server {
            self.run_server_frame(dt);
        } else {
            self.run_client_frame(dt);
        }

        self.clean_reassembly_buffer();
    }

    pub fn tick(&mut self, dt_ms: f32) {
        self.on_tick(dt_ms);
        self.execute();
    }

    pub fn clean_reassembly_buffer(&mut self) {
        let now = self.clock.now_ms();
        let evicted = self.reassembly.clean(now);
        if !evicted.is_empty() {
            log::debug!("Reassembly buffer cleaned {} stale messages", evicted.len());
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = NetworkEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn is_server(&self) -> bool {
        self.config.is_server
    }

    pub fn current_time(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn reassembly(&self) -> &Reassembler {
        &self.reassembly
    }

    pub fn client_state(&self) -> ClientState {
        self.session.state
    }

    /// Id and token learned from the server, once connected.
    pub fn session_credentials(&self) -> Option<(u32, u32)> {
        self.session
            .is_connected()
            .then_some((self.session.client_id, self.session.token))
    }

    pub fn client_ids(&self) -> Vec<u32> {
        self.registry.ids()
    }

    pub fn client_info(&self, client_id: u32) -> Option<&ClientInfo> {
        self.registry.get_by_id(client_id)
    }

    pub fn client_exists(&self, client_id: u32) -> bool {
        self.registry.contains(client_id)
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    // ----- sending -----

    fn next_packet_number(&mut self) -> u32 {
        let number = self.next_packet_number;
        self.next_packet_number = self.next_packet_number.wrapping_add(1);
        number
    }

    fn fragments(
        &mut self,
        client_id: u32,
        token: u32,
        msg_type: MessageType,
        payload: &[u8],
    ) -> NetResult<Vec<Vec<u8>>> {
        let max = self.config.flags.max_message_fragments;
        let needed = payload
            .len()
            .div_ceil(chunk_size(self.config.flags.max_packet_size)?)
            .max(1);
        if needed > max as usize {
            return Err(FragmentError::FragmentLimit {
                len: payload.len(),
                needed,
                max,
            }
            .into());
        }

        let key = MessageKey::new(client_id, token, self.next_packet_number(), msg_type);
        let frags = fragment_payload(
            key,
            self.clock.now_ms(),
            payload,
            self.config.flags.max_packet_size,
        )?;
        Ok(frags)
    }

    fn send_tcp_message(
        &mut self,
        client_id: u32,
        token: u32,
        msg_type: MessageType,
        payload: &[u8],
        socket: SocketHandle,
    ) -> NetResult<()> {
        if !self.config.tcp_enabled {
            return Err(NetError::TcpDisabled);
        }

        for frag in self.fragments(client_id, token, msg_type, payload)? {
            self.backend.send_tcp(socket, &frag)?;
        }

        Ok(())
    }

    fn send_udp_message(
        &mut self,
        client_id: u32,
        token: u32,
        msg_type: MessageType,
        payload: &[u8],
        dest: SocketAddr,
    ) -> NetResult<()> {
        for frag in self.fragments(client_id, token, msg_type, payload)? {
            self.backend.send_udp(dest, &frag)?;
        }

        Ok(())
    }

    fn send_tcp_to_client(
        &mut self,
        client_id: u32,
        msg_type: MessageType,
        payload: &[u8],
    ) -> NetResult<()> {
        let (socket, token) = match self.registry.get_by_id(client_id) {
            Some(client) => (client.socket, client.token),
            None => return Err(NetError::UnknownClient(client_id)),
        };

        let result = self.send_tcp_message(client_id, token, msg_type, payload, socket);

        match &result {
            Ok(()) => {
                if let Some(client) = self.registry.get_by_id_mut(client_id) {
                    client.tcp_failures = 0;
                }
            }
            Err(NetError::Io(e)) => {
                let failures = self
                    .registry
                    .get_by_id_mut(client_id)
                    .map(|client| {
                        client.tcp_failures += 1;
                        client.tcp_failures
                    })
                    .unwrap_or(0);

                log::warn!(
                    "TCP {} to client {} failed ({}/{}): {}",
                    msg_type.as_str(),
                    client_id,
                    failures,
                    self.config.flags.max_tcp_failures,
                    e
                );

                if failures >= self.config.flags.max_tcp_failures {
                    self.drop_client(client_id, DisconnectReason::TransportFailure);
                }
            }
            Err(_) => {}
        }

        result
    }

    fn send_to_client_as(
        &mut self,
        client_id: u32,
        msg_type: MessageType,
        payload: &[u8],
        over_tcp: bool,
    ) -> NetResult<()> {
        if !self.config.is_server {
            return Err(NetError::WrongRole("server"));
        }

        if over_tcp {
            return self.send_tcp_to_client(client_id, msg_type, payload);
        }

        let client = self
            .registry
            .get_by_id(client_id)
            .ok_or(NetError::UnknownClient(client_id))?;
        let token = client.token;
        let dest = client.udp_addr.ok_or(NetError::UdpNotLinked(client_id))?;

        self.send_udp_message(client_id, token, msg_type, payload, dest)
    }

    /// Server side: sends an application payload to one client.
    pub fn send_to_client(&mut self, client_id: u32, data: &[u8], over_tcp: bool) -> NetResult<()> {
        self.send_to_client_as(client_id, MessageType::Custom, data, over_tcp)
    }

    pub fn send_entity_data_to_client(
        &mut self,
        client_id: u32,
        data: &[u8],
        over_tcp: bool,
    ) -> NetResult<()> {
        self.send_to_client_as(client_id, MessageType::EntityData, data, over_tcp)
    }

    /// Server side: sends to every client. Returns how many sends succeeded.
    pub fn broadcast(&mut self, data: &[u8], over_tcp: bool) -> usize {
        let mut delivered = 0;

        for client_id in self.registry.ids() {
            match self.send_to_client(client_id, data, over_tcp) {
                Ok(()) => delivered += 1,
                Err(e) => log::debug!("Broadcast to client {} skipped: {}", client_id, e),
            }
        }

        delivered
    }

    fn send_tcp_to_server(&mut self, msg_type: MessageType, payload: &[u8]) -> NetResult<()> {
        let socket = self.session.socket.ok_or(NetError::NotConnected)?;
        let (client_id, token) = (self.session.client_id, self.session.token);

        let result = self.send_tcp_message(client_id, token, msg_type, payload, socket);

        match &result {
            Ok(()) => self.session.tcp_failures = 0,
            Err(NetError::Io(e)) => {
                self.session.tcp_failures += 1;
                log::warn!(
                    "TCP {} to server failed ({}/{}): {}",
                    msg_type.as_str(),
                    self.session.tcp_failures,
                    self.config.flags.max_tcp_failures,
                    e
                );

                if self.session.tcp_failures >= self.config.flags.max_tcp_failures {
                    self.lose_server(DisconnectReason::TransportFailure);
                }
            }
            Err(_) => {}
        }

        result
    }

    /// Client side: sends an application payload to the server as a Custom
    /// message.
    pub fn send_to_server(&mut self, data: &[u8], over_tcp: bool) -> NetResult<()> {
        self.send_to_server_as(MessageType::Custom, data, over_tcp)
    }

    pub fn send_entity_data_to_server(&mut self, data: &[u8], over_tcp: bool) -> NetResult<()> {
        self.send_to_server_as(MessageType::EntityData, data, over_tcp)
    }

    fn send_to_server_as(
        &mut self,
        msg_type: MessageType,
        data: &[u8],
        over_tcp: bool,
    ) -> NetResult<()> {
        if self.config.is_server {
            return Err(NetError::WrongRole("client"));
        }

        if !self.session.is_connected() {
            return Err(NetError::NotConnected);
        }

        if over_tcp {
            return self.send_tcp_to_server(msg_type, data);
        }

        let dest = self.server_udp_addr().ok_or(NetError::NotConnected)?;
        let (client_id, token) = (self.session.client_id, self.session.token);
        self.send_udp_message(client_id, token, msg_type, data, dest)
    }

    /// Sends on the configured default channel: to the server on a client,
    /// to every client on a server.
    pub fn send_default(&mut self, data: &[u8]) -> NetResult<()> {
        let over_tcp = self.config.flags.reliable_channel;

        if self.config.is_server {
            self.broadcast(data, over_tcp);
            Ok(())
        } else {
            self.send_to_server(data, over_tcp)
        }
    }

    pub fn kick_client(&mut self, client_id: u32) -> NetResult<()> {
        self.close_client(client_id, DisconnectReason::Kicked)
    }

    fn close_client(&mut self, client_id: u32, reason: DisconnectReason) -> NetResult<()> {
        if !self.config.is_server {
            return Err(NetError::WrongRole("server"));
        }

        if !self.registry.contains(client_id) {
            return Err(NetError::UnknownClient(client_id));
        }

        if let Err(e) = self.send_tcp_to_client(client_id, MessageType::Disconnect, &[]) {
            log::debug!("Disconnect notice to client {} not sent: {}", client_id, e);
        }
        self.drop_client(client_id, reason);

        Ok(())
    }

    /// Client side: tells the server we are leaving and closes the stream.
    pub fn disconnect(&mut self) {
        if self.config.is_server || self.session.socket.is_none() {
            return;
        }

        if self.session.is_connected() {
            if let Err(e) = self.send_tcp_to_server(MessageType::Disconnect, &[]) {
                log::debug!("Disconnect notice to server not sent: {}", e);
            }
        }

        if self.session.socket.is_some() {
            self.lose_server(DisconnectReason::Graceful);
        }
    }

    pub fn shutdown(&mut self) {
        if self.config.is_server {
            for client_id in self.registry.ids() {
                let _ = self.close_client(client_id, DisconnectReason::Graceful);
            }
        } else {
            self.disconnect();
        }
    }

    // ----- server -----

    fn run_server_frame(&mut self, dt: f32) {
        self.accept_clients();
        self.advance_and_ping(dt);
        self.pump_inbound();
        self.expire_silent_clients();
    }

    fn accept_clients(&mut self) {
        for _ in 0..MAX_ACCEPTS_PER_TICK {
            let Some(socket) = self.backend.accept_tcp_client() else {
                break;
            };

            let set_index = self.backend.socket_set_index(socket).unwrap_or(0);
            let client_id = self.registry.register(socket, set_index).client_id;

            self.decoders
                .insert(socket, FrameDecoder::new(self.config.flags.max_packet_size));

            log::info!("New client {} on stream {}", client_id, socket);
            self.pending_events
                .push_back(NetworkEvent::ClientConnected { client_id });

            match self.send_tcp_to_client(client_id, MessageType::Connect, &[]) {
                Ok(()) => log::info!("Sent id {} and token to client", client_id),
                Err(e) => log::error!("Couldn't send id and token to client {}: {}", client_id, e),
            }
        }
    }

    fn advance_and_ping(&mut self, dt: f32) {
        let ping_timer = self.config.flags.ping_timer_ms;

        for client_id in self.registry.ids() {
            let due = match self.registry.get_by_id_mut(client_id) {
                Some(client) => {
                    client.advance(dt);
                    client.last_ping_sent_ms >= ping_timer
                }
                None => false,
            };

            if !due {
                continue;
            }

            let now = self.clock.now_ms();
            let mut payload = [0u8; 8];
            write_u64_be(&mut payload, now);

            if self
                .send_tcp_to_client(client_id, MessageType::Ping, &payload)
                .is_ok()
            {
                if let Some(client) = self.registry.get_by_id_mut(client_id) {
                    client.last_ping_sent_ms = 0.0;
                }
                log::debug!("Sent ping to client {} at {}", client_id, now);
            }
        }
    }

    fn expire_silent_clients(&mut self) {
        let timeout = self.config.flags.heartbeat_timeout_ms;

        for client_id in self.registry.timed_out(timeout) {
            log::warn!("Client {} silent for {} ms", client_id, timeout);
            let _ = self.close_client(client_id, DisconnectReason::Timeout);
        }
    }

    fn drop_client(&mut self, client_id: u32, reason: DisconnectReason) -> bool {
        let Some(client) = self.registry.remove_by_id(client_id) else {
            return false;
        };

        self.backend.close(client.socket);
        self.decoders.remove(&client.socket);
        self.reassembly.forget_client(client_id);

        log::info!("Client {} {}", client_id, reason.as_str());
        self.pending_events
            .push_back(NetworkEvent::ClientDisconnected { client_id, reason });

        true
    }

    fn handle_server_datagram(&mut self, from: SocketAddr, bytes: &[u8]) {
        let header = match read_header(bytes) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("Dropped UDP datagram from {}: {}", from, e);
                return;
            }
        };

        let newly_linked = match self.registry.authenticate(header.client_id, header.token) {
            Some(client) => {
                client.touch();
                if client.udp_addr == Some(from) {
                    false
                } else {
                    client.udp_addr = Some(from);
                    true
                }
            }
            None => {
                log::warn!(
                    "Dropped UDP {} from {}: unknown client {} or bad token",
                    header.msg_type.as_str(),
                    from,
                    header.client_id
                );
                return;
            }
        };

        if newly_linked {
            log::info!("Client {} linked over UDP from {}", header.client_id, from);
            self.pending_events.push_back(NetworkEvent::ClientLinked {
                client_id: header.client_id,
                addr: from,
            });
        }

        if let Some(packet) = self.reassemble(bytes) {
            self.handle_server_message(packet, Channel::Udp);
        }
    }

    fn handle_server_frame(&mut self, socket: SocketHandle, frame: &[u8]) {
        let header = match read_header(frame) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("Dropped TCP fragment on stream {}: {}", socket, e);
                return;
            }
        };

        match self.registry.get_mut(socket) {
            Some(client) if client.matches(header.client_id, header.token) => client.touch(),
            Some(client) => {
                log::warn!(
                    "Dropped TCP {} claiming client {} on stream of client {}",
                    header.msg_type.as_str(),
                    header.client_id,
                    client.client_id
                );
                return;
            }
            None => {
                log::debug!("Ignored data on unregistered stream {}", socket);
                return;
            }
        }

        if let Some(packet) = self.reassemble(frame) {
            self.handle_server_message(packet, Channel::Tcp);
        }
    }

    fn handle_server_message(&mut self, packet: ParsedPacket, channel: Channel) {
        let header = packet.header;
        let client_id = header.client_id;

        log::debug!(
            "Received {} from client {} ({} bytes)",
            header.msg_type.as_str(),
            client_id,
            packet.payload.len()
        );

        match header.msg_type {
            MessageType::Pong => self.handle_pong(client_id, &packet.payload),
            MessageType::Ping => {
                let echoed = self.send_tcp_to_client(client_id, MessageType::Pong, &packet.payload);
                if let Err(e) = echoed {
                    log::debug!("Pong to client {} not sent: {}", client_id, e);
                }
            }
            MessageType::Disconnect => {
                self.drop_client(client_id, DisconnectReason::Graceful);
            }
            MessageType::Custom | MessageType::EntityData => {
                self.pending_events.push_back(NetworkEvent::Message {
                    client_id,
                    msg_type: header.msg_type,
                    channel,
                    payload: packet.payload,
                });
            }
            MessageType::Heartbeat | MessageType::Handshake => {}
            MessageType::Connect => {
                log::warn!("Client {} sent a connect message", client_id);
            }
        }
    }

    fn handle_pong(&mut self, client_id: u32, payload: &[u8]) {
        if payload.len() < 8 {
            log::warn!("Pong from client {} has a {} byte payload", client_id, payload.len());
            return;
        }

        let sent_at = read_u64_be(payload);
        let now = self.clock.now_ms();

        let Some(client) = self.registry.get_by_id_mut(client_id) else {
            log::warn!("Received pong from unknown client {}", client_id);
            return;
        };

        client.rtt_ms = now.saturating_sub(sent_at) as f32;
        client.touch();

        log::debug!("Client {} rtt {} ms", client_id, client.rtt_ms);
    }

    // ----- client -----

    fn run_client_frame(&mut self, dt: f32) {
        if self.session.state == ClientState::Connecting {
            self.session.since_attempt_ms += dt;

            if self.session.since_attempt_ms >= self.config.flags.reconnect_delay_ms {
                self.attempt_connect();
            }

            if self.session.state == ClientState::Connecting {
                return;
            }
        }

        self.pump_inbound();

        if self.session.state != ClientState::Connecting {
            self.session.last_heartbeat_ms += dt;

            if self.session.last_heartbeat_ms >= self.config.flags.heartbeat_timeout_ms {
                log::warn!(
                    "No word from server for {} ms",
                    self.session.last_heartbeat_ms
                );
                self.lose_server(DisconnectReason::Timeout);
            }
        }
    }

    fn attempt_connect(&mut self) {
        match self.backend.connect_to_server() {
            Ok(socket) => {
                self.session.stream_open(socket);
                self.decoders
                    .insert(socket, FrameDecoder::new(self.config.flags.max_packet_size));
                log::info!(
                    "TCP connected to {}:{}",
                    self.config.peer_address,
                    self.config.tcp_port
                );
            }
            Err(e) => {
                self.session.since_attempt_ms = 0.0;
                log::warn!(
                    "TCP connect to {}:{} failed ({}), retry in {} ms",
                    self.config.peer_address,
                    self.config.tcp_port,
                    e,
                    self.config.flags.reconnect_delay_ms
                );
            }
        }
    }

    fn server_udp_addr(&mut self) -> Option<SocketAddr> {
        if self.server_udp.is_none() {
            let target = (self.config.peer_address.as_str(), self.config.udp_peer_port);
            match target.to_socket_addrs() {
                Ok(mut addrs) => self.server_udp = addrs.next(),
                Err(e) => log::warn!(
                    "Could not resolve {}:{}: {}",
                    self.config.peer_address,
                    self.config.udp_peer_port,
                    e
                ),
            }
        }
        self.server_udp
    }

    fn send_udp_handshake(&mut self) {
        let Some(dest) = self.server_udp_addr() else {
            log::warn!("UDP handshake skipped, server address unknown");
            return;
        };

        let (client_id, token) = (self.session.client_id, self.session.token);
        match self.send_udp_message(client_id, token, MessageType::Handshake, &[], dest) {
            Ok(()) => log::info!("UDP handshake sent to {}", dest),
            Err(e) => log::warn!("UDP handshake to {} failed: {}", dest, e),
        }
    }

    fn lose_server(&mut self, reason: DisconnectReason) {
        if let Some(socket) = self.session.socket {
            self.backend.close(socket);
            self.decoders.remove(&socket);
        }

        self.reassembly.forget_client(self.session.client_id);
        self.session.reset();

        log::info!("Server session {}", reason.as_str());
        self.pending_events
            .push_back(NetworkEvent::DisconnectedFromServer { reason });
    }

    fn handle_client_datagram(&mut self, from: SocketAddr, bytes: &[u8]) {
        if !self.session.is_connected() {
            return;
        }

        let header = match read_header(bytes) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("Dropped UDP datagram from {}: {}", from, e);
                return;
            }
        };

        if header.client_id != self.session.client_id || header.token != self.session.token {
            log::warn!("Dropped UDP {} from {}: bad credentials", header.msg_type.as_str(), from);
            return;
        }

        if let Some(packet) = self.reassemble(bytes) {
            self.handle_client_message(packet, Channel::Udp);
        }
    }

    fn handle_client_frame(&mut self, socket: SocketHandle, frame: &[u8]) {
        if self.session.socket != Some(socket) {
            log::debug!("Ignored data on stale stream {}", socket);
            return;
        }

        if let Some(packet) = self.reassemble(frame) {
            self.handle_client_message(packet, Channel::Tcp);
        }
    }

    fn handle_client_message(&mut self, packet: ParsedPacket, channel: Channel) {
        let header = packet.header;

        log::debug!(
            "Received {} from server ({} bytes)",
            header.msg_type.as_str(),
            packet.payload.len()
        );

        match self.session.state {
            ClientState::Connecting => return,
            ClientState::WaitingForId => {
                if header.msg_type == MessageType::Connect {
                    self.session.establish(header.client_id, header.token);
                    log::info!("Connected to server as client {}", header.client_id);
                    self.pending_events.push_back(NetworkEvent::ConnectedToServer {
                        client_id: header.client_id,
                    });
                    self.send_udp_handshake();
                }
                return;
            }
            ClientState::Connected => {}
        }

        if header.client_id != self.session.client_id || header.token != self.session.token {
            log::warn!("Dropped {} with foreign credentials", header.msg_type.as_str());
            return;
        }

        self.session.last_heartbeat_ms = 0.0;

        match header.msg_type {
            MessageType::Ping => {
                let echo = if packet.payload.len() >= 8 {
                    packet.payload[..8].to_vec()
                } else {
                    header.timestamp.to_be_bytes().to_vec()
                };

                match self.send_tcp_to_server(MessageType::Pong, &echo) {
                    Ok(()) => log::debug!("Sent pong to server"),
                    Err(e) => log::warn!("Failed to send pong to server: {}", e),
                }
            }
            MessageType::Disconnect => {
                self.lose_server(DisconnectReason::Graceful);
            }
            MessageType::Custom | MessageType::EntityData => {
                self.pending_events.push_back(NetworkEvent::Message {
                    client_id: header.client_id,
                    msg_type: header.msg_type,
                    channel,
                    payload: packet.payload,
                });
            }
            MessageType::Pong
            | MessageType::Heartbeat
            | MessageType::Handshake
            | MessageType::Connect => {}
        }
    }

    // ----- shared inbound path -----

    fn pump_inbound(&mut self) {
        for _ in 0..MAX_RECEIVES_PER_TICK {
            let Some(received) = self.backend.receive() else {
                break;
            };

            match received {
                Received::Udp { from, bytes } => {
                    if self.config.is_server {
                        self.handle_server_datagram(from, &bytes);
                    } else {
                        self.handle_client_datagram(from, &bytes);
                    }
                }
                Received::Tcp { socket, bytes } => self.handle_stream_bytes(socket, &bytes),
                Received::TcpClosed { socket } => self.handle_stream_closed(socket),
            }
        }
    }

    fn handle_stream_bytes(&mut self, socket: SocketHandle, bytes: &[u8]) {
        let max = self.config.flags.max_packet_size;
        let decoder = self
            .decoders
            .entry(socket)
            .or_insert_with(|| FrameDecoder::new(max));
        decoder.push(bytes);

        let mut frames = Vec::new();
        let mut poisoned = false;

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Corrupt TCP stream {}: {}", socket, e);
                    poisoned = true;
                    break;
                }
            }
        }

        for frame in frames {
            if self.config.is_server {
                self.handle_server_frame(socket, &frame);
            } else {
                self.handle_client_frame(socket, &frame);
            }
        }

        if poisoned {
            self.drop_stream(socket, DisconnectReason::ProtocolViolation);
        }
    }

    fn handle_stream_closed(&mut self, socket: SocketHandle) {
        self.drop_stream(socket, DisconnectReason::TransportFailure);
    }

    fn drop_stream(&mut self, socket: SocketHandle, reason: DisconnectReason) {
        if self.config.is_server {
            match self.registry.get(socket).map(|c| c.client_id) {
                Some(client_id) => {
                    self.drop_client(client_id, reason);
                }
                None => {
                    self.backend.close(socket);
                    self.decoders.remove(&socket);
                }
            }
        } else if self.session.socket == Some(socket) {
            self.lose_server(reason);
        } else {
            self.decoders.remove(&socket);
        }
    }

    fn reassemble(&mut self, raw: &[u8]) -> Option<ParsedPacket> {
        match self
            .reassembly
            .parse_and_reassemble(raw, self.clock.now_ms())
        {
            Ok(packet) => packet,
            Err(ReassembleError::Duplicate) => {
                log::debug!("Dropped duplicate fragment");
                None
            }
            Err(e) => {
                log::warn!("Dropped fragment: {}", e);
                None
            }
        }
    }
}
