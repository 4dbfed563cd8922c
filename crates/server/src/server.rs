use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use glam::Vec3;

use glide::{
    AuthorityServer, AuthorityStats, ClientId, ConnectionManager, ConnectionState, EntityId,
    IntentBatch, KinematicStep, NetworkEndpoint, NetworkStats, OutboundCorrection, Packet,
    PacketHeader, PacketType, SimulationState, StateFrame, Tick, TickClock,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};

const SPAWN_SPACING: f32 = 2.0;

pub struct GameServer {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
    config: ServerConfig,
    authority: AuthorityServer<KinematicStep>,
    clock: TickClock,
    next_entity_id: EntityId,
    orphans: Vec<(EntityId, Tick)>,
    last_tick_time: Instant,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<ServerEvent>,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let mut endpoint = NetworkEndpoint::bind(bind_addr)?;
        if let Some(loss) = config.packet_loss.clone() {
            endpoint.set_loss_simulation(loss);
        }

        let step = KinematicStep::new(config.movement.clone(), config.protocol.tick_rate);

        Ok(Self {
            endpoint,
            connections: ConnectionManager::with_timeout(config.max_clients, config.client_timeout),
            authority: AuthorityServer::new(&config.protocol, step),
            clock: TickClock::starting_at(config.protocol.tick_rate, 1),
            next_entity_id: 1,
            orphans: Vec::new(),
            last_tick_time: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn shutdown_connections(&mut self) {
        let client_ids: Vec<ClientId> = self.connections.iter().map(|c| c.client_id).collect();
        for client_id in client_ids {
            self.send_to_client(client_id, PacketType::Disconnect);
            self.drop_client(client_id, DisconnectReason::Shutdown);
        }
    }

    /// Drains the socket, then runs every tick that is due. Intents that arrived
    /// before a tick are always considered for it.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = now - self.last_tick_time;
        self.last_tick_time = now;
        self.clock.accumulate(delta.as_secs_f32());

        if let Err(e) = self.process_network() {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("network error: {}", e),
            });
        }

        while let Some(tick) = self.clock.consume_tick() {
            self.tick(tick);
        }
    }

    fn tick(&mut self, tick: Tick) {
        let (_, outbound) = self.authority.advance(tick);
        for OutboundCorrection {
            client_id,
            correction,
        } in outbound
        {
            self.send_to_client(client_id, PacketType::Correction(correction));
        }

        for client in self.connections.cleanup_timed_out() {
            let orphaned = self.authority.revoke_owner(client.client_id);
            for entity_id in orphaned {
                self.orphans
                    .push((entity_id, tick.saturating_add(self.config.orphan_ticks)));
                self.pending_events
                    .push_back(ServerEvent::EntityOrphaned { entity_id });
            }
            self.pending_events.push_back(ServerEvent::ClientDisconnected {
                client_id: client.client_id,
                reason: DisconnectReason::Timeout,
            });
        }

        let authority = &mut self.authority;
        self.orphans.retain(|&(entity_id, expires)| {
            if tick < expires {
                return true;
            }
            authority.despawn(entity_id);
            false
        });
    }

    fn process_network(&mut self) -> io::Result<()> {
        let packets = self.endpoint.receive()?;
        self.handle_packets(packets);
        Ok(())
    }

    /// A failure while answering one datagram is reported and the rest are still
    /// handled.
    fn handle_packets(&mut self, packets: Vec<(Packet, SocketAddr)>) {
        for (packet, addr) in packets {
            if let Err(e) = self.handle_packet(packet, addr) {
                self.pending_events.push_back(ServerEvent::Error {
                    message: format!("failed to handle packet from {}: {}", addr, e),
                });
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) -> io::Result<()> {
        match packet.payload {
            PacketType::Hello => self.handle_hello(addr)?,
            PacketType::IntentBatch(batch) => self.handle_intent_batch(addr, &batch),
            PacketType::Disconnect => self.handle_disconnect(addr),
            other => log::debug!("ignoring unexpected {:?} from {}", other, addr),
        }

        if let Some(client) = self.connections.get_by_addr_mut(&addr) {
            client.touch();
        }

        Ok(())
    }

    /// Repeated hellos from a connected client get the same welcome again, so a lost
    /// welcome is recovered by the client simply retrying.
    fn handle_hello(&mut self, addr: SocketAddr) -> io::Result<()> {
        let spawn_tick = self.clock.last_tick().unwrap_or(0);

        let client = match self.connections.get_or_create(addr) {
            Ok(client) => client,
            Err(e) => {
                self.pending_events.push_back(ServerEvent::ConnectionDenied {
                    addr,
                    reason: e.to_string(),
                });
                let packet = Packet::new(PacketHeader::new(0), PacketType::Disconnect);
                self.endpoint.send_to(&packet, addr)?;
                return Ok(());
            }
        };
        let client_id = client.client_id;

        let entity_id = match client.entity_id {
            Some(entity_id) => entity_id,
            None => {
                let entity_id = self.next_entity_id;
                self.next_entity_id += 1;

                let position = Vec3::new(entity_id as f32 * SPAWN_SPACING, 0.0, 0.0);
                let initial = SimulationState::at_rest(spawn_tick, position);
                self.authority.spawn(entity_id, Some(client_id), initial);

                client.entity_id = Some(entity_id);
                client.state = ConnectionState::Connected;
                self.pending_events.push_back(ServerEvent::ClientConnected {
                    client_id,
                    addr,
                    entity_id,
                });
                entity_id
            }
        };

        // A repeated hello reports where the entity is now, not where it spawned.
        let Some(current) = self.authority.state(entity_id).copied() else {
            return Ok(());
        };
        self.send_to_client(
            client_id,
            PacketType::Welcome {
                entity_id,
                server_tick: current.tick,
                state: StateFrame::from_state(&current),
            },
        );
        Ok(())
    }

    fn handle_intent_batch(&mut self, addr: SocketAddr, batch: &IntentBatch) {
        let Some(client) = self.connections.get_by_addr(&addr) else {
            log::debug!("intent batch from unknown address {}", addr);
            return;
        };

        if client.state != ConnectionState::Connected {
            return;
        }
        if client.entity_id != Some(batch.entity_id) {
            log::warn!(
                "client {} sent intents for entity {} it does not own",
                client.client_id,
                batch.entity_id
            );
            return;
        }

        self.authority.receive(batch);
    }

    fn handle_disconnect(&mut self, addr: SocketAddr) {
        if let Some(client_id) = self.connections.get_by_addr(&addr).map(|c| c.client_id) {
            self.drop_client(client_id, DisconnectReason::Graceful);
        }
    }

    fn drop_client(&mut self, client_id: ClientId, reason: DisconnectReason) {
        let Some(client) = self.connections.remove(client_id) else {
            return;
        };
        if let Some(entity_id) = client.entity_id {
            self.authority.despawn(entity_id);
        }
        self.pending_events
            .push_back(ServerEvent::ClientDisconnected { client_id, reason });
    }

    fn send_to_client(&mut self, client_id: ClientId, payload: PacketType) {
        let Some(client) = self.connections.get_mut(client_id) else {
            return;
        };
        let addr = client.addr;
        let packet = Packet::new(PacketHeader::new(client.next_sequence()), payload);

        if let Err(e) = self.endpoint.send_to(&packet, addr) {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("failed to send to {}: {}", addr, e),
            });
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.clock.last_tick().unwrap_or(0),
            client_count: self.connections.connected_count(),
            max_clients: self.config.max_clients,
            entity_count: self.authority.simulator().entity_count(),
            authority: self.authority.stats(),
            network_stats: self.endpoint.stats().clone(),
        }
    }

    pub fn tick_duration(&self) -> Duration {
        self.clock.tick_duration()
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: Tick,
    pub client_count: usize,
    pub max_clients: usize,
    pub entity_count: usize,
    pub authority: AuthorityStats,
    pub network_stats: NetworkStats,
}
