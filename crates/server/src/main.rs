mod config;
mod events;
mod server;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use config::ServerConfig;
use events::ServerEvent;
use glide::{PacketLossSimulation, ProtocolConfig};
use server::GameServer;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "glide-server")]
#[command(about = "Authoritative movement server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = glide::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = glide::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long, default_value_t = 3, help = "Intents expected per batch")]
    redundancy: usize,

    #[arg(long, default_value_t = 1, help = "Ticks between corrections")]
    cadence: u32,

    #[arg(long, default_value_t = 128, help = "Intents buffered ahead of the server tick")]
    history: usize,

    #[arg(long, default_value_t = 10, help = "Seconds of silence before a client is dropped")]
    timeout: u64,

    #[arg(long, default_value_t = 0.0, help = "Outbound packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Seed for simulated packet loss")]
    loss_seed: u64,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let protocol = ProtocolConfig {
        tick_rate: args.tick_rate,
        redundancy: args.redundancy,
        reconciliation_cadence: args.cadence,
        history_capacity: args.history,
        ..Default::default()
    };
    protocol.validate().context("invalid protocol configuration")?;

    let config = ServerConfig {
        protocol,
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.timeout),
        packet_loss: (args.loss_percent > 0.0)
            .then(|| PacketLossSimulation::new(args.loss_percent, args.loss_seed)),
        ..Default::default()
    };

    let mut server = GameServer::new(&bind_addr, config)
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    log::info!("Server started on {}", server.local_addr());

    let running = server.running();
    let started = Instant::now();
    let deadline = args.duration.map(Duration::from_secs);
    let mut last_stats = Instant::now();

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            log_event(event);
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            let stats = server.stats();
            log::info!(
                "tick {} | {}/{} clients, {} entities | applied {} fallbacks {} clamped {} dup {} late {} | sent {} recv {} rejected {}",
                stats.tick,
                stats.client_count,
                stats.max_clients,
                stats.entity_count,
                stats.authority.applied,
                stats.authority.fallbacks,
                stats.authority.clamped,
                stats.authority.duplicates,
                stats.authority.late,
                stats.network_stats.packets_sent,
                stats.network_stats.packets_received,
                stats.network_stats.packets_rejected,
            );
        }

        if deadline.is_some_and(|d| started.elapsed() >= d) {
            running.store(false, Ordering::SeqCst);
        }

        std::thread::sleep(Duration::from_millis(1).min(server.tick_duration()));
    }

    log::info!("Server shutting down");
    server.shutdown_connections();
    for event in server.drain_events() {
        log_event(event);
    }

    Ok(())
}

fn log_event(event: ServerEvent) {
    match event {
        ServerEvent::ClientConnected {
            client_id,
            addr,
            entity_id,
        } => {
            log::info!(
                "Client {} connected from {} (entity {})",
                client_id,
                addr,
                entity_id
            );
        }
        ServerEvent::ClientDisconnected { client_id, reason } => {
            log::info!("Client {} {}", client_id, reason.as_str());
        }
        ServerEvent::ConnectionDenied { addr, reason } => {
            log::warn!("Connection denied to {}: {}", addr, reason);
        }
        ServerEvent::EntityOrphaned { entity_id } => {
            log::info!("Entity {} lost its owner", entity_id);
        }
        ServerEvent::Error { message } => {
            log::error!("{}", message);
        }
    }
}
