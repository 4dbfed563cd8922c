use std::collections::BTreeMap;

use crate::entity::{ClientId, Entity, EntityId};
use crate::net::{IntentBatch, MoveIntent};

use super::inbox::{InboxVerdict, IntentInbox};
use super::state::StateHistory;
use super::step::{StepContext, StepFunction};
use super::{SimulationState, Tick};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    pub applied: u64,
    pub fallbacks: u64,
    pub clamped: u64,
    pub duplicates: u64,
    pub late: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReceipt {
    pub accepted: u32,
    pub duplicates: u32,
    pub late: u32,
    pub rejected: u32,
}

/// Outcome of simulating one entity for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub entity_id: EntityId,
    /// The intent actually applied, after validation.
    pub intent: MoveIntent,
    pub state: SimulationState,
    /// No intent arrived in time and the idle intent was used.
    pub fallback: bool,
    pub clamped: bool,
}

#[derive(Debug)]
struct AuthorityEntity {
    entity: Entity,
    state: SimulationState,
    inbox: IntentInbox,
    history: StateHistory,
    owner: Option<ClientId>,
}

/// The single source of truth for every entity's movement.
///
/// Clients only ever contribute intents; state is produced here by the shared step
/// function. Entities are stepped in ascending id order.
pub struct AuthoritativeSimulator<S> {
    step: S,
    entities: BTreeMap<EntityId, AuthorityEntity>,
    max_intent_lead: u32,
    state_history_capacity: usize,
    stats: AuthorityStats,
}

impl<S: StepFunction> AuthoritativeSimulator<S> {
    pub fn new(step: S, max_intent_lead: u32, state_history_capacity: usize) -> Self {
        Self {
            step,
            entities: BTreeMap::new(),
            max_intent_lead,
            state_history_capacity,
            stats: AuthorityStats::default(),
        }
    }

    pub fn step_function(&self) -> &S {
        &self.step
    }

    /// Registers an entity whose next simulated tick is `initial.tick + 1`.
    pub fn spawn(
        &mut self,
        entity_id: EntityId,
        owner: Option<ClientId>,
        initial: SimulationState,
    ) -> bool {
        if self.entities.contains_key(&entity_id) {
            log::warn!("entity {} already spawned", entity_id);
            return false;
        }

        let mut history = StateHistory::new(self.state_history_capacity);
        history.push(initial);
        self.entities.insert(
            entity_id,
            AuthorityEntity {
                entity: Entity::authoritative(entity_id),
                state: initial,
                inbox: IntentInbox::starting_after(self.max_intent_lead, initial.tick),
                history,
                owner,
            },
        );
        log::info!(
            "spawned entity {} at tick {} (owner {:?})",
            entity_id,
            initial.tick,
            owner
        );
        true
    }

    pub fn despawn(&mut self, entity_id: EntityId) -> Option<SimulationState> {
        let entity = self.entities.remove(&entity_id)?;
        log::info!("despawned entity {} at tick {}", entity_id, entity.state.tick);
        Some(entity.state)
    }

    pub fn set_owner(&mut self, entity_id: EntityId, owner: Option<ClientId>) -> bool {
        match self.entities.get_mut(&entity_id) {
            Some(entity) => {
                entity.owner = owner;
                if owner.is_none() {
                    entity.inbox.clear();
                }
                true
            }
            None => false,
        }
    }

    pub fn entity(&self, entity_id: EntityId) -> Option<Entity> {
        self.entities.get(&entity_id).map(|e| e.entity)
    }

    pub fn owner(&self, entity_id: EntityId) -> Option<ClientId> {
        self.entities.get(&entity_id).and_then(|e| e.owner)
    }

    /// Entities owned by `client_id`, ascending.
    pub fn owned_by(&self, client_id: ClientId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.owner == Some(client_id))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Files every intent in the batch under its tick. Copies of ticks that are
    /// already queued or already simulated are dropped.
    pub fn receive(&mut self, batch: &IntentBatch) -> BatchReceipt {
        let mut receipt = BatchReceipt::default();

        let Some(entity) = self.entities.get_mut(&batch.entity_id) else {
            log::debug!("intent batch for unknown entity {}", batch.entity_id);
            receipt.rejected = batch.intents.len() as u32;
            self.stats.rejected += batch.intents.len() as u64;
            return receipt;
        };

        if entity.owner.is_none() {
            log::debug!("intent batch for unowned entity {}", batch.entity_id);
            receipt.rejected = batch.intents.len() as u32;
            self.stats.rejected += batch.intents.len() as u64;
            return receipt;
        }

        for intent in &batch.intents {
            match entity.inbox.insert(*intent) {
                InboxVerdict::Accepted => receipt.accepted += 1,
                InboxVerdict::Duplicate => receipt.duplicates += 1,
                InboxVerdict::Late => receipt.late += 1,
                InboxVerdict::TooFarAhead => {
                    log::debug!(
                        "entity {}: intent for tick {} too far ahead of {:?}",
                        batch.entity_id,
                        intent.tick,
                        entity.inbox.last_taken()
                    );
                    receipt.rejected += 1;
                }
            }
        }

        self.stats.duplicates += receipt.duplicates as u64;
        self.stats.late += receipt.late as u64;
        self.stats.rejected += receipt.rejected as u64;
        receipt
    }

    /// Simulates `tick` for every entity that has not simulated it yet.
    pub fn advance(&mut self, tick: Tick) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(self.entities.len());

        for (&entity_id, entity) in &mut self.entities {
            if !entity.entity.is_authority() {
                continue;
            }
            if tick <= entity.state.tick {
                log::trace!(
                    "entity {} already at tick {}, skipping {}",
                    entity_id,
                    entity.state.tick,
                    tick
                );
                continue;
            }

            let (received, fallback) = match entity.inbox.take(tick) {
                Some(intent) => (intent, false),
                None => (MoveIntent::idle(tick), true),
            };
            let (intent, clamped) = received.sanitized();

            if fallback && entity.owner.is_some() {
                log::debug!("entity {}: no intent for tick {}, using idle", entity_id, tick);
                self.stats.fallbacks += 1;
            }
            if clamped {
                log::debug!(
                    "entity {}: clamped intent at tick {} ({}, {})",
                    entity_id,
                    tick,
                    received.horizontal,
                    received.vertical
                );
                self.stats.clamped += 1;
            }

            let mut ctx = StepContext::live();
            let state = self.step.step(&entity.state, &intent, &mut ctx);
            entity.state = state;
            entity.history.push(state);
            self.stats.applied += 1;

            reports.push(TickReport {
                entity_id,
                intent,
                state,
                fallback,
                clamped,
            });
        }

        reports
    }

    pub fn state(&self, entity_id: EntityId) -> Option<&SimulationState> {
        self.entities.get(&entity_id).map(|e| &e.state)
    }

    pub fn state_at(&self, entity_id: EntityId, tick: Tick) -> Option<&SimulationState> {
        self.entities.get(&entity_id)?.history.get(tick)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn stats(&self) -> AuthorityStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::simulation::{KinematicStep, MovementConfig};

    fn simulator() -> AuthoritativeSimulator<KinematicStep> {
        let mut sim = AuthoritativeSimulator::new(
            KinematicStep::new(MovementConfig::default(), 60),
            128,
            64,
        );
        sim.spawn(1, Some(7), SimulationState::at_rest(0, Vec3::ZERO));
        sim
    }

    #[test]
    fn duplicate_delivery_applies_once() {
        let mut sim = simulator();
        let batch = IntentBatch::new(1, vec![MoveIntent::new(1, 1.0, 0.0)]);

        assert_eq!(sim.receive(&batch).accepted, 1);
        assert_eq!(sim.receive(&batch).duplicates, 1);
        sim.advance(1);
        let after_first = *sim.state(1).unwrap();

        assert_eq!(sim.receive(&batch).late, 1);
        assert!(sim.advance(1).is_empty());
        assert!(sim.state(1).unwrap().bit_identical(&after_first));
        assert_eq!(sim.stats().applied, 1);
    }

    #[test]
    fn missing_intent_falls_back_to_idle() {
        let mut sim = simulator();

        let reports = sim.advance(1);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].fallback);
        assert!(reports[0].intent.is_idle());
        assert_eq!(reports[0].state.tick, 1);
        assert_eq!(sim.stats().fallbacks, 1);
    }

    #[test]
    fn oversized_intent_is_normalized() {
        let mut sim = simulator();
        sim.receive(&IntentBatch::new(1, vec![MoveIntent::new(1, 3.0, 3.0)]));

        let report = sim.advance(1)[0];
        assert!(report.clamped);
        assert!((report.intent.axes().length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unowned_entities_ignore_intents_but_keep_ticking() {
        let mut sim = simulator();
        sim.set_owner(1, None);

        let receipt = sim.receive(&IntentBatch::new(1, vec![MoveIntent::new(1, 1.0, 0.0)]));
        assert_eq!(receipt.rejected, 1);

        let reports = sim.advance(1);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].intent.is_idle());
    }

    #[test]
    fn spawned_entities_are_authoritative() {
        let sim = simulator();
        let entity = sim.entity(1).unwrap();
        assert!(entity.is_authority());
        assert!(!entity.is_owner());
        assert!(sim.entity(2).is_none());
    }

    #[test]
    fn state_history_retained() {
        let mut sim = simulator();
        for tick in 1..=10 {
            sim.advance(tick);
        }
        assert_eq!(sim.state_at(1, 4).map(|s| s.tick), Some(4));
        assert_eq!(sim.state(1).map(|s| s.tick), Some(10));
    }
}
