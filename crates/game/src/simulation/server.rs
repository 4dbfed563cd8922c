use crate::config::ProtocolConfig;
use crate::entity::{ClientId, EntityId};
use crate::net::{Correction, IntentBatch};

use super::authority::{AuthoritativeSimulator, AuthorityStats, BatchReceipt, TickReport};
use super::channel::ReconciliationChannel;
use super::step::StepFunction;
use super::{SimulationState, Tick};

/// A correction addressed to the client that owns the entity.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCorrection {
    pub client_id: ClientId,
    pub correction: Correction,
}

/// Authoritative simulation plus the reconciliation channel, driven one tick at a
/// time by the server loop.
pub struct AuthorityServer<S> {
    simulator: AuthoritativeSimulator<S>,
    channel: ReconciliationChannel,
    last_tick: Option<Tick>,
}

impl<S: StepFunction> AuthorityServer<S> {
    pub fn new(config: &ProtocolConfig, step: S) -> Self {
        Self {
            simulator: AuthoritativeSimulator::new(
                step,
                config.max_intent_lead(),
                config.state_history_capacity,
            ),
            channel: ReconciliationChannel::new(config.reconciliation_cadence, config.redundancy),
            last_tick: None,
        }
    }

    pub fn simulator(&self) -> &AuthoritativeSimulator<S> {
        &self.simulator
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    pub fn spawn(
        &mut self,
        entity_id: EntityId,
        owner: Option<ClientId>,
        initial: SimulationState,
    ) -> bool {
        if !self.simulator.spawn(entity_id, owner, initial) {
            return false;
        }
        self.channel.register(entity_id);
        true
    }

    pub fn despawn(&mut self, entity_id: EntityId) -> Option<SimulationState> {
        self.channel.unregister(entity_id);
        self.simulator.despawn(entity_id)
    }

    /// Detaches every entity owned by `client_id`. The entities stay in the
    /// simulation and keep ticking on idle intents until despawned.
    pub fn revoke_owner(&mut self, client_id: ClientId) -> Vec<EntityId> {
        let owned = self.simulator.owned_by(client_id);
        for &entity_id in &owned {
            self.simulator.set_owner(entity_id, None);
        }
        owned
    }

    pub fn receive(&mut self, batch: &IntentBatch) -> BatchReceipt {
        self.simulator.receive(batch)
    }

    /// Simulates `tick` and collects the corrections due this tick.
    pub fn advance(&mut self, tick: Tick) -> (Vec<TickReport>, Vec<OutboundCorrection>) {
        let reports = self.simulator.advance(tick);
        self.last_tick = Some(tick);

        let mut outbound = Vec::new();
        for report in &reports {
            self.channel.observe(report);

            let Some(client_id) = self.simulator.owner(report.entity_id) else {
                continue;
            };
            if let Some(correction) = self.channel.emit(tick, report.entity_id, &report.state) {
                log::trace!(
                    "correction for entity {} at tick {} -> client {}",
                    report.entity_id,
                    correction.tick,
                    client_id
                );
                outbound.push(OutboundCorrection {
                    client_id,
                    correction,
                });
            }
        }

        (reports, outbound)
    }

    pub fn state(&self, entity_id: EntityId) -> Option<&SimulationState> {
        self.simulator.state(entity_id)
    }

    pub fn stats(&self) -> AuthorityStats {
        self.simulator.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MoveIntent;
    use crate::simulation::{KinematicStep, MovementConfig};

    fn server(cadence: u32) -> AuthorityServer<KinematicStep> {
        let config = ProtocolConfig {
            reconciliation_cadence: cadence,
            ..Default::default()
        };
        AuthorityServer::new(
            &config,
            KinematicStep::new(MovementConfig::default(), config.tick_rate),
        )
    }

    #[test]
    fn corrections_go_to_owner() {
        let mut server = server(1);
        assert!(server.spawn(1, Some(9), SimulationState::default()));
        assert!(!server.spawn(1, Some(9), SimulationState::default()));

        server.receive(&IntentBatch::new(1, vec![MoveIntent::new(1, 1.0, 0.0)]));
        let (reports, outbound) = server.advance(1);

        assert_eq!(reports.len(), 1);
        assert!(!reports[0].fallback);
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].client_id, 9);
        assert_eq!(outbound[0].correction.tick, 1);
        assert_eq!(server.last_tick(), Some(1));
    }

    #[test]
    fn revoked_entities_keep_ticking_silently() {
        let mut server = server(1);
        server.spawn(1, Some(9), SimulationState::default());
        server.spawn(2, Some(4), SimulationState::default());

        assert_eq!(server.revoke_owner(9), vec![1]);
        let receipt = server.receive(&IntentBatch::new(1, vec![MoveIntent::new(1, 1.0, 0.0)]));
        assert_eq!(receipt.rejected, 1);

        let (reports, outbound) = server.advance(1);
        assert_eq!(reports.len(), 2);
        assert!(outbound.iter().all(|o| o.client_id == 4));
        assert_eq!(server.state(1).map(|s| s.tick), Some(1));
    }

    #[test]
    fn despawn_removes_entity() {
        let mut server = server(2);
        server.spawn(5, None, SimulationState::default());
        assert!(server.despawn(5).is_some());
        let (reports, outbound) = server.advance(1);
        assert!(reports.is_empty());
        assert!(outbound.is_empty());
    }
}
