use std::collections::HashMap;

use crate::entity::EntityId;
use crate::net::Correction;

use super::authority::TickReport;
use super::{SimulationState, Tick};

#[derive(Debug, Clone, Copy, Default)]
struct ChannelEntry {
    active: bool,
    trailing: usize,
    last_sent: Option<Tick>,
}

/// Decides when authoritative state is sent back to an entity's owner.
///
/// Corrections go out every `cadence` ticks while the entity is active (it applied
/// a non-idle intent or was still moving since the previous emission). Once it goes
/// idle the latest state is repeated for `redundancy - 1` further emissions so that
/// a lost final correction is still recovered, then the channel goes quiet.
#[derive(Debug)]
pub struct ReconciliationChannel {
    cadence: u32,
    redundancy: usize,
    entries: HashMap<EntityId, ChannelEntry>,
}

impl ReconciliationChannel {
    pub fn new(cadence: u32, redundancy: usize) -> Self {
        Self {
            cadence: cadence.max(1),
            redundancy: redundancy.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn cadence(&self) -> u32 {
        self.cadence
    }

    pub fn is_due(&self, tick: Tick) -> bool {
        tick % self.cadence == 0
    }

    /// Starts tracking an entity; its first due tick always emits.
    pub fn register(&mut self, entity_id: EntityId) {
        self.entries.insert(
            entity_id,
            ChannelEntry {
                active: true,
                ..Default::default()
            },
        );
    }

    pub fn unregister(&mut self, entity_id: EntityId) {
        self.entries.remove(&entity_id);
    }

    pub fn observe(&mut self, report: &TickReport) {
        if let Some(entry) = self.entries.get_mut(&report.entity_id) {
            if !report.intent.is_idle() || !report.state.is_at_rest() {
                entry.active = true;
            }
        }
    }

    /// Returns the correction to send for `entity_id` at `tick`, if any.
    pub fn emit(
        &mut self,
        tick: Tick,
        entity_id: EntityId,
        state: &SimulationState,
    ) -> Option<Correction> {
        if !self.is_due(tick) {
            return None;
        }
        let entry = self.entries.get_mut(&entity_id)?;

        if entry.active {
            entry.active = false;
            entry.trailing = self.redundancy - 1;
        } else if entry.trailing > 0 {
            entry.trailing -= 1;
        } else {
            return None;
        }

        entry.last_sent = Some(state.tick);
        Some(Correction::new(entity_id, state))
    }

    pub fn last_sent(&self, entity_id: EntityId) -> Option<Tick> {
        self.entries.get(&entity_id).and_then(|e| e.last_sent)
    }
}
