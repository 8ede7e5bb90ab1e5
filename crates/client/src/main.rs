mod console;

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use console::{Console, ConsoleLine};
use pgnet::{
    NetworkConfig, NetworkEvent, NetworkSystem, SendDataToServer, SocketBackend, SystemFlags,
};

#[derive(Parser)]
#[command(name = "pgnet-client")]
#[command(about = "Connects to a pgnet server and sends stdin lines as custom messages")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    #[arg(long, default_value_t = pgnet::DEFAULT_TCP_PORT)]
    tcp_port: u16,

    #[arg(long, default_value_t = pgnet::DEFAULT_UDP_PORT)]
    udp_port: u16,

    #[arg(long, default_value_t = 0, help = "Local UDP port, 0 for ephemeral")]
    local_udp_port: u16,

    #[arg(long, help = "Send lines over UDP instead of TCP")]
    udp: bool,

    #[arg(short, long, default_value_t = 60.0)]
    tick_rate: f32,

    #[arg(long, default_value_t = 1000.0, help = "Delay between connect attempts in ms")]
    reconnect_delay: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let flags = SystemFlags {
        reliable_channel: !args.udp,
        update_rate_hz: args.tick_rate,
        reconnect_delay_ms: args.reconnect_delay,
        ..Default::default()
    };

    let config = NetworkConfig {
        udp_local_port: args.local_udp_port,
        ..NetworkConfig::client(args.server, args.tcp_port, args.udp_port)
    }
    .with_flags(flags);

    let over_tcp = config.flags.reliable_channel;
    let tick_duration =
        Duration::from_secs_f64(1.0 / config.flags.update_rate_hz.max(1.0) as f64);

    let backend = SocketBackend::new(&config)?;
    let mut system = NetworkSystem::new(backend, config);
    system.init();

    let console = Console::spawn()?;
    let mut last_tick = Instant::now();

    'outer: loop {
        while let Some(line) = console.try_next() {
            match line {
                ConsoleLine::Quit => break 'outer,
                ConsoleLine::Text(text) => {
                    let request = SendDataToServer {
                        data: text.into_bytes(),
                        over_tcp,
                    };
                    if let Err(e) = system.on_send(request) {
                        log::warn!("Message not sent: {}", e);
                    }
                }
            }
        }

        let now = Instant::now();
        system.tick((now - last_tick).as_secs_f32() * 1000.0);
        last_tick = now;

        for event in system.drain_events() {
            match event {
                NetworkEvent::ConnectedToServer { client_id } => {
                    log::info!("Session established as client {}", client_id);
                }
                NetworkEvent::DisconnectedFromServer { reason } => {
                    log::warn!("Server session {}", reason.as_str());
                }
                NetworkEvent::Message {
                    msg_type,
                    channel,
                    payload,
                    ..
                } => {
                    println!(
                        "[{} {:?}] {}",
                        msg_type.as_str(),
                        channel,
                        String::from_utf8_lossy(&payload)
                    );
                }
                _ => {}
            }
        }

        std::thread::sleep(tick_duration);
    }

    system.disconnect();
    log::info!("Client shutting down");

    Ok(())
}
