use crate::config::ProtocolConfig;
use crate::entity::Entity;
use crate::event::FeedbackEvent;
use crate::net::{Correction, IntentBatch};
use crate::simulation::{SimulationState, StepFunction, Tick};

use super::replayer::{PredictionReplayer, ReconcileOutcome};
use super::sampler::{InputAxes, InputSampler};

/// Everything the owning client runs for one entity: sampling, prediction and the
/// redundant intent window sent to the server each tick.
pub struct OwningClient<S> {
    entity: Entity,
    sampler: InputSampler,
    replayer: PredictionReplayer<S>,
    redundancy: usize,
    feedback: Vec<FeedbackEvent>,
}

impl<S: StepFunction> OwningClient<S> {
    pub fn new(entity: Entity, config: &ProtocolConfig, step: S, initial: SimulationState) -> Self {
        Self {
            entity,
            sampler: InputSampler::default(),
            replayer: PredictionReplayer::new(
                step,
                initial,
                config.history_capacity,
                config.snap_threshold,
            ),
            redundancy: config.redundancy,
            feedback: Vec::new(),
        }
    }

    pub fn with_sampler(mut self, sampler: InputSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn state(&self) -> &SimulationState {
        self.replayer.state()
    }

    pub fn replayer(&self) -> &PredictionReplayer<S> {
        &self.replayer
    }

    pub fn replayer_mut(&mut self) -> &mut PredictionReplayer<S> {
        &mut self.replayer
    }

    /// Samples, predicts and returns the batch to send for `tick`. Returns `None`
    /// once ownership has been released.
    pub fn tick(&mut self, tick: Tick, axes: Option<InputAxes>) -> Option<IntentBatch> {
        if !self.entity.is_owner() {
            return None;
        }

        let intent = self.sampler.sample(tick, axes);
        let feedback = self.replayer.predict(intent);
        self.feedback.extend(feedback);

        let window = self.replayer.history().window(self.redundancy);
        Some(IntentBatch::new(self.entity.id, window))
    }

    pub fn on_correction(&mut self, correction: &Correction) -> Option<ReconcileOutcome> {
        if correction.entity_id != self.entity.id {
            log::debug!(
                "correction for entity {} delivered to owner of {}",
                correction.entity_id,
                self.entity.id
            );
            return None;
        }
        if !self.entity.is_owner() {
            return None;
        }
        Some(self.replayer.reconcile(correction))
    }

    pub fn drain_feedback(&mut self) -> Vec<FeedbackEvent> {
        std::mem::take(&mut self.feedback)
    }

    /// Stops producing intents and throws away the input history.
    pub fn release(&mut self) {
        log::info!("released ownership of entity {}", self.entity.id);
        self.entity.revoke_ownership();
        self.replayer.discard_history();
        self.feedback.clear();
    }
}
