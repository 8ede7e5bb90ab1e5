use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use pgnet::{Channel, MessageType, NetworkEvent, NetworkSystem, SocketBackend};

use crate::config::ServerConfig;

pub struct EchoServer {
    system: NetworkSystem<SocketBackend>,
    config: ServerConfig,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    running: Arc<AtomicBool>,
}

impl EchoServer {
    pub fn new(config: ServerConfig) -> io::Result<Self> {
        let backend = SocketBackend::new(&config.network)?;
        let mut system = NetworkSystem::new(backend, config.network.clone());
        system.init();

        let rate = config.flags().update_rate_hz.max(1.0);
        let tick_duration = Duration::from_secs_f64(1.0 / rate as f64);

        Ok(Self {
            system,
            config,
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_tcp_addr(&self) -> Option<SocketAddr> {
        self.system.backend().local_tcp_addr()
    }

    pub fn local_udp_addr(&self) -> Option<SocketAddr> {
        self.system.backend().local_udp_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn client_count(&self) -> usize {
        self.system.client_count()
    }

    /// Ticks until the running flag is cleared, then disconnects every client.
    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.system.shutdown();
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = now - self.last_tick_time;
        self.last_tick_time = now;
        self.accumulator += delta;

        if self.accumulator < self.tick_duration {
            return;
        }

        let elapsed = std::mem::take(&mut self.accumulator);
        self.system.tick(elapsed.as_secs_f32() * 1000.0);
        self.handle_events();
    }

    fn handle_events(&mut self) {
        let events: Vec<NetworkEvent> = self.system.drain_events().collect();

        for event in events {
            match event {
                NetworkEvent::ClientConnected { client_id } => {
                    log::info!(
                        "Client {} connected ({} online)",
                        client_id,
                        self.system.client_count()
                    );
                }
                NetworkEvent::ClientLinked { client_id, addr } => {
                    log::info!("Client {} reachable over UDP at {}", client_id, addr);
                }
                NetworkEvent::ClientDisconnected { client_id, reason } => {
                    log::info!("Client {} {}", client_id, reason.as_str());
                }
                NetworkEvent::Message {
                    client_id,
                    msg_type,
                    channel,
                    payload,
                } => self.handle_message(client_id, msg_type, channel, payload),
                NetworkEvent::ConnectedToServer { .. }
                | NetworkEvent::DisconnectedFromServer { .. } => {}
            }
        }
    }

    fn handle_message(
        &mut self,
        client_id: u32,
        msg_type: MessageType,
        channel: Channel,
        payload: Vec<u8>,
    ) {
        log::info!(
            "{} from client {} over {:?}: {}",
            msg_type.as_str(),
            client_id,
            channel,
            String::from_utf8_lossy(&payload)
        );

        if !self.config.echo || msg_type != MessageType::Custom {
            return;
        }

        let over_tcp = channel == Channel::Tcp;

        if self.config.broadcast_echo {
            let delivered = self.system.broadcast(&payload, over_tcp);
            log::debug!("Echo broadcast to {} clients", delivered);
        } else if let Err(e) = self.system.send_to_client(client_id, &payload, over_tcp) {
            log::warn!("Echo to client {} failed: {}", client_id, e);
        }
    }
}
