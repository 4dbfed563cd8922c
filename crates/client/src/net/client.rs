use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use glam::Vec3;

use glide::{
    ConnectionState, Correction, Entity, EntityId, FeedbackEvent, KinematicStep,
    NetworkEndpoint, NetworkStats, OwningClient, Packet, PacketType, ReconcileOutcome,
    ReplayStats, StateFrame, Tick, TickClock,
};

use super::config::ClientConfig;
use super::input::InputPattern;

pub struct NetworkClient {
    endpoint: NetworkEndpoint,
    config: ClientConfig,
    state: ConnectionState,
    clock: TickClock,
    owner: Option<OwningClient<KinematicStep>>,
    connection_start_time: Option<Instant>,
    last_hello_time: Instant,
    last_frame_time: Instant,
}

impl NetworkClient {
    pub fn new(config: ClientConfig) -> io::Result<Self> {
        let mut endpoint = NetworkEndpoint::bind("0.0.0.0:0")?;
        if let Some(loss) = config.packet_loss.clone() {
            endpoint.set_loss_simulation(loss);
        }

        Ok(Self {
            endpoint,
            clock: TickClock::new(config.protocol.tick_rate),
            state: ConnectionState::Disconnected,
            owner: None,
            connection_start_time: None,
            last_hello_time: Instant::now(),
            last_frame_time: Instant::now(),
            config,
        })
    }

    pub fn connect(&mut self, server_addr: SocketAddr) -> io::Result<()> {
        log::info!("Connecting to {}", server_addr);

        self.endpoint.set_remote(server_addr);
        self.state = ConnectionState::Connecting;
        self.connection_start_time = Some(Instant::now());
        self.send_hello()
    }

    pub fn disconnect(&mut self) -> io::Result<()> {
        if self.state == ConnectionState::Connected {
            let packet = self.endpoint.create_packet(PacketType::Disconnect);
            self.endpoint.send(&packet)?;
        }

        self.reset();
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn reset(&mut self) {
        if let Some(owner) = self.owner.as_mut() {
            owner.release();
        }
        self.owner = None;
        self.state = ConnectionState::Disconnected;
        self.connection_start_time = None;
        self.clock = TickClock::new(self.config.protocol.tick_rate);
    }

    fn send_hello(&mut self) -> io::Result<()> {
        let packet = self.endpoint.create_packet(PacketType::Hello);
        self.endpoint.send(&packet)?;
        self.last_hello_time = Instant::now();
        Ok(())
    }

    /// Called once per frame: reads the socket, then runs every tick the frame
    /// covers, sending one intent batch per tick.
    pub fn update(&mut self, input: InputPattern) -> io::Result<()> {
        let now = Instant::now();
        let delta = now - self.last_frame_time;
        self.last_frame_time = now;

        self.process_network()?;

        match self.state {
            ConnectionState::Connecting => {
                if self
                    .connection_start_time
                    .is_some_and(|start| {
                        start.elapsed() > Duration::from_secs(self.config.connection_timeout_secs)
                    })
                {
                    log::warn!("Connection timeout");
                    self.reset();
                } else if self.last_hello_time.elapsed() >= self.config.hello_interval {
                    self.send_hello()?;
                }
            }
            ConnectionState::Connected => {
                self.clock.accumulate(delta.as_secs_f32());
                while let Some(tick) = self.clock.consume_tick() {
                    self.run_tick(tick, input)?;
                }

                if let Some(owner) = self.owner.as_mut() {
                    owner.replayer_mut().update_visuals(delta.as_secs_f32());
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn run_tick(&mut self, tick: Tick, input: InputPattern) -> io::Result<()> {
        let Some(owner) = self.owner.as_mut() else {
            return Ok(());
        };

        let axes = input.axes(tick, self.config.protocol.tick_rate);
        let Some(batch) = owner.tick(tick, axes) else {
            return Ok(());
        };

        for event in owner.drain_feedback() {
            match event {
                FeedbackEvent::StartedMoving { tick } => {
                    log::debug!("started moving at tick {}", tick)
                }
                FeedbackEvent::Stopped { tick, position } => {
                    log::debug!("stopped at tick {} at {:?}", tick, position)
                }
            }
        }

        let packet = self.endpoint.create_packet(PacketType::IntentBatch(batch));
        self.endpoint.send(&packet)?;
        Ok(())
    }

    fn process_network(&mut self) -> io::Result<()> {
        let packets = self.endpoint.receive()?;

        for (packet, addr) in packets {
            if Some(addr) != self.endpoint.remote_addr() {
                log::debug!("ignoring packet from unexpected address {}", addr);
                continue;
            }
            self.handle_packet(packet);
        }

        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet.payload {
            PacketType::Welcome {
                entity_id,
                server_tick,
                state,
            } => self.handle_welcome(entity_id, server_tick, &state),
            PacketType::Correction(correction) => self.handle_correction(&correction),
            PacketType::Disconnect => {
                log::info!("Disconnected by server");
                self.reset();
            }
            other => log::debug!("ignoring unexpected {:?}", other),
        }
    }

    fn handle_welcome(&mut self, entity_id: EntityId, server_tick: Tick, state: &StateFrame) {
        if self.state != ConnectionState::Connecting {
            return;
        }

        let lead = self.config.protocol.input_lead_ticks;
        let initial = state.to_state(server_tick);
        let step = KinematicStep::new(
            self.config.movement.clone(),
            self.config.protocol.tick_rate,
        );

        let owner = OwningClient::new(
            Entity::owned(entity_id),
            &self.config.protocol,
            step,
            initial,
        );
        let epoch = server_tick.saturating_add(lead).saturating_add(1);
        if !self.clock.resync(epoch) {
            log::warn!("welcome for tick {} is behind the local clock", server_tick);
            return;
        }
        self.owner = Some(owner);
        self.state = ConnectionState::Connected;

        log::info!(
            "Connected: entity {} at server tick {}, predicting from tick {}",
            entity_id,
            server_tick,
            self.clock.next_tick()
        );
    }

    fn handle_correction(&mut self, correction: &Correction) {
        let Some(owner) = self.owner.as_mut() else {
            return;
        };

        match owner.on_correction(correction) {
            Some(ReconcileOutcome::Snapped {
                tick,
                error,
                history_gap,
                ..
            }) => {
                log::info!(
                    "snapped at tick {} (error {:.3}, history gap {})",
                    tick,
                    error,
                    history_gap
                );
            }
            Some(outcome) => log::trace!("{:?}", outcome),
            None => {}
        }
    }

    pub fn visual_position(&self) -> Option<Vec3> {
        let owner = self.owner.as_ref()?;
        Some(owner.replayer().visual_position(self.clock.alpha()))
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            tick: self.clock.last_tick(),
            replay: self.owner.as_ref().map(|o| o.replayer().stats()),
            network_stats: self.endpoint.stats().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientStats {
    pub tick: Option<Tick>,
    pub replay: Option<ReplayStats>,
    pub network_stats: NetworkStats,
}
