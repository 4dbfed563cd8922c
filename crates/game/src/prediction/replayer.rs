use glam::Vec3;

use crate::event::FeedbackEvent;
use crate::net::{Correction, MoveIntent};
use crate::simulation::{SimulationState, StepContext, StepFunction, Tick};

use super::history::InputHistoryBuffer;

const ERROR_CORRECTION_SPEED: f32 = 20.0;
const ERROR_THRESHOLD: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Older than or equal to a correction already applied.
    Ignored { tick: Tick },
    /// Local state now matches the authority, with any jump hidden by smoothing.
    Converged {
        tick: Tick,
        replayed: usize,
        error: f32,
    },
    /// The jump was too large to hide, or history needed for the replay had already
    /// been evicted.
    Snapped {
        tick: Tick,
        replayed: usize,
        error: f32,
        history_gap: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplayStats {
    pub predicted: u64,
    pub corrections: u64,
    pub ignored: u64,
    pub replayed: u64,
    pub snaps: u64,
    pub last_error: f32,
}

/// Client-side prediction for one owned entity.
///
/// Every tick the freshly sampled intent is stored and simulated immediately. When
/// the authority's state for some tick arrives, local state is replaced by it and all
/// stored intents after that tick are simulated again, flagged as replays. Confirmed
/// intents stay in the history so the redundancy window sent each tick stays full.
pub struct PredictionReplayer<S> {
    step: S,
    state: SimulationState,
    prev_position: Vec3,
    visual_offset: Vec3,
    history: InputHistoryBuffer,
    last_correction: Option<Tick>,
    snap_threshold: f32,
    stats: ReplayStats,
}

impl<S: StepFunction> PredictionReplayer<S> {
    pub fn new(
        step: S,
        initial: SimulationState,
        history_capacity: usize,
        snap_threshold: f32,
    ) -> Self {
        Self {
            step,
            state: initial,
            prev_position: initial.position,
            visual_offset: Vec3::ZERO,
            history: InputHistoryBuffer::new(history_capacity),
            last_correction: None,
            snap_threshold,
            stats: ReplayStats::default(),
        }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn history(&self) -> &InputHistoryBuffer {
        &self.history
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    pub fn last_correction(&self) -> Option<Tick> {
        self.last_correction
    }

    /// Stores `intent` and advances the local prediction by one tick.
    pub fn predict(&mut self, intent: MoveIntent) -> Vec<FeedbackEvent> {
        let mut feedback = self.fill_skipped(intent.tick);

        if !self.history.push(intent) {
            log::warn!(
                "intent for tick {} is older than the input history, not stored",
                intent.tick
            );
        }

        self.prev_position = self.state.position;
        let mut ctx = StepContext::live();
        self.state = self.step.step(&self.state, &intent, &mut ctx);
        self.stats.predicted += 1;
        feedback.extend(ctx.take_feedback());
        feedback
    }

    /// Ticks between the current state and `tick` that were never sampled, such as
    /// the input lead after a handshake, get the idle intent the authority falls
    /// back to for them.
    fn fill_skipped(&mut self, tick: Tick) -> Vec<FeedbackEvent> {
        let first = self.state.tick.saturating_add(1);
        if tick <= first {
            return Vec::new();
        }
        if (tick - first) as usize >= self.history.capacity() {
            log::warn!(
                "prediction jumps from tick {} to {}, beyond the input history",
                self.state.tick,
                tick
            );
            return Vec::new();
        }

        log::debug!("predicting ticks {}..{} as idle", first, tick);
        let mut feedback = Vec::new();
        for skipped in first..tick {
            let idle = MoveIntent::idle(skipped);
            self.history.push(idle);
            let mut ctx = StepContext::live();
            self.state = self.step.step(&self.state, &idle, &mut ctx);
            self.stats.predicted += 1;
            feedback.extend(ctx.take_feedback());
        }
        feedback
    }

    pub fn reconcile(&mut self, correction: &Correction) -> ReconcileOutcome {
        let tick = correction.tick;
        if self.last_correction.is_some_and(|last| tick <= last) {
            self.stats.ignored += 1;
            return ReconcileOutcome::Ignored { tick };
        }
        self.last_correction = Some(tick);

        let before = self.state;
        let history_gap = !self.history.covers_after(tick);
        if history_gap {
            log::warn!(
                "correction for tick {} predates retained input history (oldest {:?})",
                tick,
                self.history.oldest_tick()
            );
        }

        self.state = correction.simulation_state();
        let pending = self.history.after(tick);
        for intent in &pending {
            let mut ctx = StepContext::replaying();
            self.state = self.step.step(&self.state, intent, &mut ctx);
        }

        let replayed = pending.len();
        let error = before.position_error(&self.state);
        self.stats.corrections += 1;
        self.stats.replayed += replayed as u64;
        self.stats.last_error = error;

        let shift = self.state.position - before.position;
        if history_gap || error > self.snap_threshold {
            log::warn!(
                "snapping entity state at tick {} (error {:.3}, replayed {})",
                tick,
                error,
                replayed
            );
            self.prev_position = self.state.position;
            self.visual_offset = Vec3::ZERO;
            self.stats.snaps += 1;
            return ReconcileOutcome::Snapped {
                tick,
                replayed,
                error,
                history_gap,
            };
        }

        if error > ERROR_THRESHOLD {
            log::debug!(
                "prediction diverged at tick {} by {:.4}, replayed {} intents",
                tick,
                error,
                replayed
            );
            // Shift the logical position but keep what is on screen where it was.
            self.prev_position += shift;
            self.visual_offset -= shift;
        }

        ReconcileOutcome::Converged {
            tick,
            replayed,
            error,
        }
    }

    /// Decays the hidden correction offset.
    pub fn update_visuals(&mut self, dt: f32) {
        let decay = (-ERROR_CORRECTION_SPEED * dt).exp();
        self.visual_offset *= decay;
    }

    pub fn visual_position(&self, alpha: f32) -> Vec3 {
        self.prev_position.lerp(self.state.position, alpha) + self.visual_offset
    }

    pub fn visual_offset(&self) -> Vec3 {
        self.visual_offset
    }

    /// Drops all buffered intents, e.g. when ownership is revoked.
    pub fn discard_history(&mut self) {
        self.history.clear();
    }

    pub fn reset(&mut self, state: SimulationState) {
        self.state = state;
        self.prev_position = state.position;
        self.visual_offset = Vec3::ZERO;
        self.history.clear();
        self.last_correction = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::simulation::{KinematicStep, MovementConfig};

    fn replayer() -> PredictionReplayer<KinematicStep> {
        PredictionReplayer::new(
            KinematicStep::new(MovementConfig::default(), 60),
            SimulationState::default(),
            64,
            2.0,
        )
    }

    #[test]
    fn agreeing_correction_changes_nothing() {
        let mut client = replayer();
        let mut authority = SimulationState::default();
        let step = KinematicStep::new(MovementConfig::default(), 60);

        for tick in 1..=10 {
            let intent = MoveIntent::new(tick, 1.0, 0.0);
            client.predict(intent);
            if tick <= 6 {
                authority = step.step(&authority, &intent, &mut StepContext::live());
            }
        }
        let predicted = *client.state();

        let outcome = client.reconcile(&Correction::new(1, &authority));
        assert_eq!(
            outcome,
            ReconcileOutcome::Converged {
                tick: 6,
                replayed: 4,
                error: 0.0
            }
        );
        assert!(client.state().bit_identical(&predicted));

        let window: Vec<Tick> = client.history().window(3).iter().map(|i| i.tick).collect();
        assert_eq!(window, vec![8, 9, 10]);
        assert_eq!(client.history().oldest_tick(), Some(1));
    }

    #[test]
    fn confirmed_intents_stay_in_send_window() {
        let mut client = replayer();
        for tick in 1..=3 {
            client.predict(MoveIntent::new(tick, 0.0, 1.0));
        }

        let confirmed = *client.state();
        client.reconcile(&Correction::new(1, &confirmed));

        let window: Vec<Tick> = client.history().window(3).iter().map(|i| i.tick).collect();
        assert_eq!(window, vec![1, 2, 3]);
    }

    #[test]
    fn unsampled_ticks_are_predicted_idle() {
        let start = SimulationState::at_rest(100, Vec3::new(4.0, 0.0, 0.0));
        let mut client = PredictionReplayer::new(
            KinematicStep::new(MovementConfig::default(), 60),
            start,
            64,
            2.0,
        );

        client.predict(MoveIntent::idle(105));
        assert_eq!(client.state().tick, 105);
        assert_eq!(client.stats().predicted, 5);
        assert!(client.history().covers_after(100));
        assert_eq!(client.history().get(102), Some(&MoveIntent::idle(102)));
    }

    #[test]
    fn stale_corrections_are_ignored() {
        let mut client = replayer();
        for tick in 1..=5 {
            client.predict(MoveIntent::new(tick, 0.0, 1.0));
        }

        let newer = Correction::new(1, &SimulationState::at_rest(4, Vec3::ZERO));
        let older = Correction::new(1, &SimulationState::at_rest(3, Vec3::ZERO));

        assert!(matches!(client.reconcile(&newer), ReconcileOutcome::Converged { .. }));
        assert_eq!(client.reconcile(&older), ReconcileOutcome::Ignored { tick: 3 });
        assert_eq!(client.reconcile(&newer), ReconcileOutcome::Ignored { tick: 4 });
        assert_eq!(client.stats().ignored, 2);
    }

    #[test]
    fn small_error_is_smoothed() {
        let mut client = replayer();
        for tick in 1..=3 {
            client.predict(MoveIntent::idle(tick));
        }
        client.update_visuals(0.0);
        let on_screen = client.visual_position(1.0);

        let shifted = SimulationState::at_rest(3, Vec3::new(0.5, 0.0, 0.0));
        let outcome = client.reconcile(&Correction::new(1, &shifted));
        assert!(matches!(outcome, ReconcileOutcome::Converged { .. }));

        assert_eq!(client.state().position.x, 0.5);
        assert!((client.visual_position(1.0) - on_screen).length() < 1e-6);

        client.update_visuals(0.05);
        let x = client.visual_position(1.0).x;
        assert!(x > 0.1 && x < 0.5);
    }

    #[test]
    fn large_error_snaps() {
        let mut client = replayer();
        client.predict(MoveIntent::idle(1));

        let far = SimulationState::at_rest(1, Vec3::new(10.0, 0.0, 0.0));
        let outcome = client.reconcile(&Correction::new(1, &far));
        assert!(matches!(
            outcome,
            ReconcileOutcome::Snapped {
                history_gap: false,
                ..
            }
        ));
        assert_eq!(client.visual_position(0.0), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn evicted_history_snaps_instead_of_failing() {
        let mut client = PredictionReplayer::new(
            KinematicStep::new(MovementConfig::default(), 60),
            SimulationState::default(),
            8,
            2.0,
        );
        for tick in 1..=30 {
            client.predict(MoveIntent::new(tick, 1.0, 0.0));
        }

        let ancient = SimulationState::at_rest(5, Vec3::ZERO);
        let outcome = client.reconcile(&Correction::new(1, &ancient));
        match outcome {
            ReconcileOutcome::Snapped {
                replayed,
                history_gap,
                ..
            } => {
                assert!(history_gap);
                assert_eq!(replayed, 8);
            }
            other => panic!("expected a snap, got {other:?}"),
        }
        assert_eq!(client.state().tick, 30);
    }

    #[test]
    fn replay_emits_no_feedback() {
        let calls = RefCell::new(Vec::new());
        let noisy = |state: &SimulationState, intent: &MoveIntent, ctx: &mut StepContext| {
            calls.borrow_mut().push((intent.tick, ctx.is_replaying()));
            ctx.emit(FeedbackEvent::StartedMoving { tick: intent.tick });
            let mut next = *state;
            next.tick = intent.tick;
            next.position.x += intent.horizontal;
            next
        };
        let mut client = PredictionReplayer::new(noisy, SimulationState::default(), 64, 2.0);

        for tick in 1..=3 {
            let feedback = client.predict(MoveIntent::new(tick, 1.0, 0.0));
            assert_eq!(feedback, vec![FeedbackEvent::StartedMoving { tick }]);
        }

        let rest = SimulationState::at_rest(1, Vec3::ZERO);
        client.reconcile(&Correction::new(1, &rest));
        assert_eq!(client.stats().replayed, 2);

        let feedback = client.predict(MoveIntent::new(4, 1.0, 0.0));
        assert_eq!(feedback, vec![FeedbackEvent::StartedMoving { tick: 4 }]);
        assert_eq!(
            *calls.borrow(),
            vec![
                (1, false),
                (2, false),
                (3, false),
                (2, true),
                (3, true),
                (4, false)
            ]
        );
    }
}
