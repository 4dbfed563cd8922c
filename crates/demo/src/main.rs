use anyhow::{Context, Result, bail};
use clap::Parser;
use glam::Vec3;

use glide::{
    AuthorityServer, ClientId, Entity, InputAxes, KinematicStep, LinkConditions, LossyLink,
    MovementConfig, OwningClient, Packet, PacketHeader, PacketType, ProtocolConfig,
    ReconcileOutcome, SimulationState, Tick,
};

#[derive(Parser)]
#[command(name = "glide-demo")]
#[command(about = "Runs clients and an authority in-process over simulated lossy links")]
struct Args {
    #[arg(long, default_value_t = 3)]
    clients: u32,

    #[arg(long, default_value_t = 1200)]
    ticks: Tick,

    #[arg(long, default_value_t = 3)]
    redundancy: usize,

    #[arg(long, default_value_t = 1)]
    cadence: u32,

    #[arg(long, default_value_t = 6, help = "Ticks the clients run ahead of the server")]
    lead: u32,

    #[arg(long, default_value_t = 10.0, help = "Loss percentage in both directions")]
    loss_percent: f32,

    #[arg(long, default_value_t = 3, help = "One-way latency in ticks")]
    latency: u32,

    #[arg(long, default_value_t = 2, help = "Extra random delay in ticks")]
    jitter: u32,

    #[arg(long, default_value_t = 1)]
    seed: u64,
}

/// One connected client and the two directions of its link, carrying encoded packets.
struct Peer {
    client_id: ClientId,
    owner: OwningClient<KinematicStep>,
    uplink: LossyLink<Vec<u8>>,
    downlink: LossyLink<Vec<u8>>,
    sequence: u32,
    snaps: Vec<Tick>,
}

impl Peer {
    fn next_header(&mut self) -> PacketHeader {
        let header = PacketHeader::new(self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        header
    }
}

/// Each client steers its own circle and pauses now and then; the final two
/// seconds are idle so everything settles.
fn scripted_axes(
    client_id: ClientId,
    tick: Tick,
    total: Tick,
    tick_rate: u32,
) -> Option<InputAxes> {
    if tick + tick_rate * 2 > total {
        return None;
    }
    let seconds = tick as f32 / tick_rate as f32;
    if (seconds as u32 + client_id) % 5 == 0 {
        return None;
    }
    let angle = seconds * (0.5 + client_id as f32 * 0.25);
    Some(InputAxes::new(angle.sin(), angle.cos()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = ProtocolConfig {
        redundancy: args.redundancy,
        reconciliation_cadence: args.cadence,
        input_lead_ticks: args.lead,
        ..Default::default()
    };
    config.validate().context("invalid protocol configuration")?;
    if args.lead <= args.latency + args.jitter {
        log::warn!(
            "lead of {} ticks does not cover {} ticks of latency, expect idle fallbacks",
            args.lead,
            args.latency + args.jitter
        );
    }

    let step = || KinematicStep::new(MovementConfig::default(), config.tick_rate);
    let mut server = AuthorityServer::new(&config, step());

    let mut peers = Vec::new();
    for index in 0..args.clients {
        let client_id = index + 1;
        let initial = SimulationState::at_rest(0, Vec3::new(client_id as f32 * 2.0, 0.0, 0.0));
        if !server.spawn(client_id, Some(client_id), initial) {
            bail!("entity {} spawned twice", client_id);
        }

        let conditions = |salt: u64| {
            LinkConditions::perfect()
                .with_latency(args.latency, args.jitter)
                .with_loss(args.loss_percent, args.seed ^ (u64::from(client_id) << 8) ^ salt)
        };
        peers.push(Peer {
            client_id,
            owner: OwningClient::new(Entity::owned(client_id), &config, step(), initial),
            uplink: LossyLink::new(conditions(1)),
            downlink: LossyLink::new(conditions(2)),
            sequence: 0,
            snaps: Vec::new(),
        });
    }

    let dt = 1.0 / config.tick_rate as f32;
    for now in 1..=args.ticks {
        for peer in &mut peers {
            let axes = scripted_axes(peer.client_id, now, args.ticks, config.tick_rate);
            let Some(batch) = peer.owner.tick(now, axes) else {
                continue;
            };
            let packet = Packet::new(peer.next_header(), PacketType::IntentBatch(batch));
            peer.uplink.send(now, packet.serialize()?);
        }

        for peer in &mut peers {
            for bytes in peer.uplink.deliver(now) {
                match Packet::deserialize(&bytes)?.payload {
                    PacketType::IntentBatch(batch) => {
                        server.receive(&batch);
                    }
                    other => log::warn!("unexpected uplink payload {:?}", other),
                }
            }
        }

        if now > config.input_lead_ticks {
            let (_, outbound) = server.advance(now - config.input_lead_ticks);
            for out in outbound {
                let Some(peer) = peers.iter_mut().find(|p| p.client_id == out.client_id) else {
                    continue;
                };
                let packet = Packet::new(
                    PacketHeader::new(now),
                    PacketType::Correction(out.correction),
                );
                peer.downlink.send(now, packet.serialize()?);
            }
        }

        for peer in &mut peers {
            for bytes in peer.downlink.deliver(now) {
                let PacketType::Correction(correction) = Packet::deserialize(&bytes)?.payload
                else {
                    continue;
                };
                if let Some(ReconcileOutcome::Snapped { tick, .. }) =
                    peer.owner.on_correction(&correction)
                {
                    peer.snaps.push(tick);
                }
            }
            peer.owner.replayer_mut().update_visuals(dt);
        }
    }

    print_summary(&args, &server, &peers);
    Ok(())
}

fn print_summary(args: &Args, server: &AuthorityServer<KinematicStep>, peers: &[Peer]) {
    let authority = server.stats();
    println!(
        "{} clients, {} ticks, R={} K={} lead={} | loss {:.1}% latency {}+{} ticks",
        args.clients,
        args.ticks,
        args.redundancy,
        args.cadence,
        args.lead,
        args.loss_percent,
        args.latency,
        args.jitter
    );
    println!(
        "authority: applied {} fallbacks {} clamped {} duplicates {} late {} rejected {}",
        authority.applied,
        authority.fallbacks,
        authority.clamped,
        authority.duplicates,
        authority.late,
        authority.rejected
    );

    for peer in peers {
        let replay = peer.owner.replayer().stats();
        let up = peer.uplink.stats();
        let down = peer.downlink.stats();
        let drift = server
            .state(peer.client_id)
            .map(|s| s.position_error(peer.owner.state()))
            .unwrap_or(f32::NAN);

        println!(
            "client {}: corrections {} ignored {} replayed {} snaps {} last error {:.4} | up {}/{} down {}/{} delivered | final drift {:.6}",
            peer.client_id,
            replay.corrections,
            replay.ignored,
            replay.replayed,
            replay.snaps,
            replay.last_error,
            up.delivered,
            up.sent,
            down.delivered,
            down.sent,
            drift
        );
        if !peer.snaps.is_empty() {
            println!("  snapped at ticks {:?}", peer.snaps);
        }
    }
}
