mod config;
mod console;
mod server;

use anyhow::Result;
use clap::Parser;

use config::ServerConfig;
use pgnet::{NetworkConfig, SystemFlags};
use server::EchoServer;

#[derive(Parser)]
#[command(name = "pgnet-server")]
#[command(about = "TCP/UDP session server that echoes custom messages")]
struct Args {
    #[arg(long, default_value_t = pgnet::DEFAULT_TCP_PORT)]
    tcp_port: u16,

    #[arg(long, default_value_t = pgnet::DEFAULT_UDP_PORT)]
    udp_port: u16,

    #[arg(long, help = "Serve UDP only")]
    no_tcp: bool,

    #[arg(short, long, default_value_t = 60.0)]
    tick_rate: f32,

    #[arg(long, default_value_t = 1000.0, help = "Ping interval in ms")]
    ping_interval: f32,

    #[arg(long, default_value_t = 10000.0, help = "Silence before a client is dropped, in ms")]
    heartbeat_timeout: f32,

    #[arg(long, default_value_t = 5000.0, help = "Partial message lifetime in ms")]
    drop_timeout: f32,

    #[arg(long, default_value_t = 64)]
    socket_set_size: usize,

    #[arg(long, help = "Do not echo custom messages")]
    no_echo: bool,

    #[arg(long, help = "Echo custom messages to every client")]
    broadcast: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let flags = SystemFlags {
        update_rate_hz: args.tick_rate,
        ping_timer_ms: args.ping_interval,
        heartbeat_timeout_ms: args.heartbeat_timeout,
        drop_packet_timeout_ms: args.drop_timeout,
        socket_set_size: args.socket_set_size,
        ..Default::default()
    };

    let network = NetworkConfig {
        tcp_enabled: !args.no_tcp,
        ..NetworkConfig::server(args.tcp_port, args.udp_port)
    }
    .with_flags(flags);

    let config = ServerConfig {
        network,
        echo: !args.no_echo,
        broadcast_echo: args.broadcast,
    };

    let mut server = EchoServer::new(config)?;

    if let Some(addr) = server.local_tcp_addr() {
        log::info!("Listening for TCP on {}", addr);
    }
    if let Some(addr) = server.local_udp_addr() {
        log::info!("Listening for UDP on {}", addr);
    }

    console::spawn_quit_watcher(server.running())?;
    log::info!("Type /quit to stop");

    server.run();
    log::info!("Server shutting down");

    Ok(())
}
