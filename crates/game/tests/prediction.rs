use glide::{
    AuthoritativeSimulator, AuthorityServer, Correction, Entity, InputAxes, IntentBatch,
    KinematicStep, LinkConditions, LossyLink, MoveIntent, MovementConfig, OwningClient,
    PredictionReplayer, ProtocolConfig, ReconcileOutcome, SimulationState, StepContext,
    StepFunction, Tick, TickReport,
};

const ENTITY: u32 = 1;
const CLIENT: u32 = 7;

fn step_fn(config: &ProtocolConfig) -> KinematicStep {
    KinematicStep::new(MovementConfig::default(), config.tick_rate)
}

/// Owning client and authority wired together through two simulated links. Time is
/// measured in client ticks; the server simulates `now - input_lead_ticks`.
struct Session {
    lead: Tick,
    server: AuthorityServer<KinematicStep>,
    client: OwningClient<KinematicStep>,
    uplink: LossyLink<IntentBatch>,
    downlink: LossyLink<Correction>,
    sent: Vec<IntentBatch>,
    reports: Vec<TickReport>,
    outcomes: Vec<ReconcileOutcome>,
}

impl Session {
    fn new(config: ProtocolConfig, uplink: LinkConditions, downlink: LinkConditions) -> Self {
        config.validate().unwrap();

        let mut server = AuthorityServer::new(&config, step_fn(&config));
        assert!(server.spawn(ENTITY, Some(CLIENT), SimulationState::default()));
        let client = OwningClient::new(
            Entity::owned(ENTITY),
            &config,
            step_fn(&config),
            SimulationState::default(),
        );

        Self {
            lead: config.input_lead_ticks,
            server,
            client,
            uplink: LossyLink::new(uplink),
            downlink: LossyLink::new(downlink),
            sent: Vec::new(),
            reports: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    fn perfect(config: ProtocolConfig) -> Self {
        Self::new(config, LinkConditions::perfect(), LinkConditions::perfect())
    }

    fn tick(&mut self, now: Tick, axes: Option<InputAxes>) {
        if let Some(batch) = self.client.tick(now, axes) {
            self.sent.push(batch.clone());
            self.uplink.send(now, batch);
        }
        for batch in self.uplink.deliver(now) {
            self.server.receive(&batch);
        }

        if now > self.lead {
            let (reports, outbound) = self.server.advance(now - self.lead);
            self.reports.extend(reports);
            for out in outbound {
                assert_eq!(out.client_id, CLIENT);
                self.downlink.send(now, out.correction);
            }
        }

        for correction in self.downlink.deliver(now) {
            if let Some(outcome) = self.client.on_correction(&correction) {
                self.outcomes.push(outcome);
            }
        }
    }

    fn run(
        &mut self,
        ticks: std::ops::RangeInclusive<Tick>,
        input: impl Fn(Tick) -> Option<InputAxes>,
    ) {
        for now in ticks {
            self.tick(now, input(now));
        }
    }

    fn report(&self, tick: Tick) -> &TickReport {
        self.reports
            .iter()
            .find(|r| r.state.tick == tick)
            .unwrap_or_else(|| panic!("tick {tick} was never simulated"))
    }
}

fn walk(tick: Tick) -> Option<InputAxes> {
    match tick {
        1..=40 => Some(InputAxes::new(0.0, 1.0)),
        41..=60 => Some(InputAxes::new(0.7, 0.7)),
        _ => None,
    }
}

#[test]
fn replay_is_bit_identical() {
    let step = step_fn(&ProtocolConfig::default());
    let intents: Vec<MoveIntent> = (1..=300)
        .map(|t| {
            let phase = t as f32 * 0.05;
            MoveIntent::new(t, phase.sin(), (phase * 0.7).cos()).sanitized().0
        })
        .collect();

    let run = |replaying: bool| {
        let mut state = SimulationState::default();
        intents
            .iter()
            .map(|intent| {
                let mut ctx = if replaying {
                    StepContext::replaying()
                } else {
                    StepContext::live()
                };
                state = step.step(&state, intent, &mut ctx);
                state
            })
            .collect::<Vec<_>>()
    };

    let live = run(false);
    let again = run(false);
    let replayed = run(true);
    for ((a, b), c) in live.iter().zip(&again).zip(&replayed) {
        assert!(a.bit_identical(b));
        assert!(a.bit_identical(c));
    }
}

#[test]
fn duplicate_intents_apply_once() {
    let config = ProtocolConfig::default();
    let mut single = AuthoritativeSimulator::new(step_fn(&config), 128, 64);
    let mut repeated = AuthoritativeSimulator::new(step_fn(&config), 128, 64);
    single.spawn(ENTITY, Some(CLIENT), SimulationState::default());
    repeated.spawn(ENTITY, Some(CLIENT), SimulationState::default());

    let batch = IntentBatch::new(ENTITY, vec![MoveIntent::new(1, 1.0, 0.0)]);
    single.receive(&batch);
    repeated.receive(&batch);
    assert_eq!(repeated.receive(&batch).duplicates, 1);

    single.advance(1);
    repeated.advance(1);
    assert_eq!(repeated.receive(&batch).late, 1);
    assert!(repeated.advance(1).is_empty());

    let a = single.state(ENTITY).unwrap();
    let b = repeated.state(ENTITY).unwrap();
    assert!(a.bit_identical(b));
    assert_eq!(repeated.stats().applied, 1);
}

#[test]
fn redundancy_recovers_any_single_loss() {
    for redundancy in 2..=4 {
        for dropped in 5..20 {
            let config = ProtocolConfig {
                redundancy,
                input_lead_ticks: 1,
                ..Default::default()
            };
            let mut session = Session::perfect(config);
            session.uplink.drop_sent_at(dropped);
            session.run(1..=30, |_| Some(InputAxes::new(1.0, 0.0)));

            let stats = session.server.stats();
            assert_eq!(stats.fallbacks, 0, "R={redundancy}, dropped batch {dropped}");
            assert!(!session.report(dropped).fallback);
        }
    }
}

#[test]
fn without_redundancy_a_loss_falls_back() {
    let config = ProtocolConfig {
        redundancy: 1,
        input_lead_ticks: 1,
        ..Default::default()
    };
    let mut session = Session::perfect(config);
    session.uplink.drop_sent_at(10);
    session.run(1..=20, |_| Some(InputAxes::new(1.0, 0.0)));

    assert_eq!(session.server.stats().fallbacks, 1);
    let report = session.report(10);
    assert!(report.fallback);
    assert!(report.intent.is_idle());
}

#[test]
fn dropped_tick_recovered_from_next_batch() {
    let config = ProtocolConfig {
        redundancy: 3,
        input_lead_ticks: 1,
        ..Default::default()
    };
    let mut session = Session::perfect(config);
    session.uplink.drop_sent_at(10);
    session.run(1..=13, |_| Some(InputAxes::new(0.0, 1.0)));

    let eleventh = &session.sent[10];
    assert_eq!(eleventh.oldest_tick(), Some(9));
    assert_eq!(eleventh.newest_tick(), Some(11));
    let twelfth = &session.sent[11];
    assert_eq!(twelfth.oldest_tick(), Some(10));
    assert_eq!(twelfth.newest_tick(), Some(12));

    let report = session.report(10);
    assert!(!report.fallback);
    assert_eq!(report.intent, MoveIntent::new(10, 0.0, 1.0));
    assert_eq!(session.server.stats().fallbacks, 0);
}

#[test]
fn total_loss_still_advances_on_idle() {
    let config = ProtocolConfig::default();
    let lead = config.input_lead_ticks;
    let mut session = Session::new(
        config,
        LinkConditions::perfect().with_loss(100.0, 3),
        LinkConditions::perfect(),
    );
    session.run(1..=60, walk);

    let simulated = 60 - lead;
    let stats = session.server.stats();
    assert_eq!(stats.fallbacks, simulated as u64);
    assert_eq!(stats.applied, simulated as u64);

    let state = session.server.state(ENTITY).unwrap();
    assert_eq!(state.tick, simulated);
    assert!(state.is_at_rest());
    assert_eq!(state.position, glam::Vec3::ZERO);
}

#[test]
fn clamped_intent_is_corrected_by_replay() {
    let config = ProtocolConfig::default();
    let mut server = AuthorityServer::new(&config, step_fn(&config));
    server.spawn(ENTITY, Some(CLIENT), SimulationState::default());
    let mut client = PredictionReplayer::new(
        step_fn(&config),
        SimulationState::default(),
        config.history_capacity,
        config.snap_threshold,
    );

    // Tick 48 carries an out-of-range axis that only the client applies verbatim.
    let intent_for = |tick: Tick| {
        let horizontal = if tick == 48 { 1.6 } else { 1.0 };
        MoveIntent::new(tick, horizontal, 0.0)
    };
    for tick in 1..=50 {
        let intent = intent_for(tick);
        client.predict(intent);
        server.receive(&IntentBatch::new(ENTITY, vec![intent]));
    }
    let predicted = *client.state();

    let mut correction = None;
    for tick in 1..=48 {
        let (reports, outbound) = server.advance(tick);
        assert_eq!(reports[0].clamped, tick == 48);
        correction = outbound.into_iter().next().map(|out| out.correction);
    }
    let correction = correction.unwrap();
    assert_eq!(correction.tick, 48);

    let outcome = client.reconcile(&correction);
    match outcome {
        ReconcileOutcome::Converged {
            tick,
            replayed,
            error,
        } => {
            assert_eq!(tick, 48);
            assert_eq!(replayed, 2);
            assert!(error > 0.0);
        }
        other => panic!("expected convergence, got {other:?}"),
    }

    server.advance(49);
    server.advance(50);
    let authority = server.state(ENTITY).unwrap();
    assert!(client.state().bit_identical(authority));
    assert!(client.state().position.x < predicted.position.x);
}

#[test]
fn lossy_session_converges_with_authority() {
    let config = ProtocolConfig::default();
    let mut session = Session::new(
        config,
        LinkConditions::perfect()
            .with_latency(2, 1)
            .with_loss(25.0, 42),
        LinkConditions::perfect().with_latency(2, 0),
    );
    session.run(1..=200, walk);

    let client = session.client.state();
    let authority = session.server.state(ENTITY).unwrap();
    assert_eq!(client.position, authority.position);
    assert_eq!(client.rotation, authority.rotation);
    assert!(client.is_at_rest() && authority.is_at_rest());

    let stats = session.client.replayer().stats();
    assert!(stats.corrections > 0);
    assert!(session.uplink.stats().dropped > 0);
}

#[test]
fn sustained_latency_beyond_history_snaps() {
    let config = ProtocolConfig {
        history_capacity: 8,
        input_lead_ticks: 1,
        ..Default::default()
    };
    let mut session = Session::new(
        config,
        LinkConditions::perfect(),
        LinkConditions::perfect().with_latency(20, 0),
    );
    session.run(1..=60, |_| Some(InputAxes::new(1.0, 0.0)));

    assert!(session.outcomes.iter().any(|outcome| matches!(
        outcome,
        ReconcileOutcome::Snapped {
            history_gap: true,
            ..
        }
    )));
    assert_eq!(session.server.stats().fallbacks, 0);
    assert_eq!(session.client.state().tick, 60);
}
