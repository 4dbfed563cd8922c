mod net;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use glide::{PacketLossSimulation, ProtocolConfig};
use net::{ClientConfig, InputPattern, NetworkClient};

const STATS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "glide-client")]
#[command(about = "Headless predicting client driven by a scripted input pattern")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:27020", help = "Server address")]
    server: String,

    #[arg(long, value_enum, default_value_t = InputPattern::Circle)]
    pattern: InputPattern,

    #[arg(short, long, default_value_t = glide::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 3, help = "Intents resent in every batch")]
    redundancy: usize,

    #[arg(long, default_value_t = 4, help = "Ticks to run ahead of the server")]
    lead: u32,

    #[arg(long, default_value_t = 128, help = "Intents kept for replay")]
    history: usize,

    #[arg(long, default_value_t = 2.0, help = "Correction distance that snaps instead of smoothing")]
    snap_threshold: f32,

    #[arg(long, default_value_t = 0.0, help = "Outbound packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Seed for simulated packet loss")]
    loss_seed: u64,

    #[arg(long, default_value_t = 30, help = "Seconds to run before disconnecting")]
    duration: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr: SocketAddr = args
        .server
        .parse()
        .with_context(|| format!("invalid server address {}", args.server))?;

    let protocol = ProtocolConfig {
        tick_rate: args.tick_rate,
        redundancy: args.redundancy,
        input_lead_ticks: args.lead,
        history_capacity: args.history,
        snap_threshold: args.snap_threshold,
        ..Default::default()
    };
    protocol.validate().context("invalid protocol configuration")?;

    let config = ClientConfig {
        protocol,
        packet_loss: (args.loss_percent > 0.0)
            .then(|| PacketLossSimulation::new(args.loss_percent, args.loss_seed)),
        ..Default::default()
    };

    let mut client = NetworkClient::new(config)?;
    client.connect(server_addr)?;

    let started = Instant::now();
    let mut last_stats = Instant::now();
    let mut was_connected = false;

    while started.elapsed() < Duration::from_secs(args.duration) {
        client.update(args.pattern)?;

        if was_connected && !client.is_connected() {
            anyhow::bail!("lost connection to {}", server_addr);
        }
        was_connected = client.is_connected();

        if last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            log_stats(&client);
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    log_stats(&client);
    client.disconnect()?;
    Ok(())
}

fn log_stats(client: &NetworkClient) {
    let stats = client.stats();
    let Some(replay) = stats.replay else {
        log::info!("{:?}, waiting for welcome", client.state());
        return;
    };

    let position = client.visual_position().unwrap_or_default();
    log::info!(
        "tick {:?} | pos ({:.2}, {:.2}) | corrections {} ignored {} replayed {} snaps {} last error {:.4} | sent {} dropped {}",
        stats.tick,
        position.x,
        position.z,
        replay.corrections,
        replay.ignored,
        replay.replayed,
        replay.snaps,
        replay.last_error,
        stats.network_stats.packets_sent,
        stats.network_stats.packets_dropped,
    );
}
