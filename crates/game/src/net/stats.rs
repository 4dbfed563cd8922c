use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Outbound loss applied by a [`NetworkEndpoint`](super::NetworkEndpoint) before a
/// datagram hits the socket. Lets the real UDP bins exercise redundancy without an
/// external network shaper.
#[derive(Debug, Clone)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
    rng: ChaCha8Rng,
}

impl Default for PacketLossSimulation {
    fn default() -> Self {
        Self::disabled()
    }
}

impl PacketLossSimulation {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            loss_percent: 0.0,
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    pub fn new(loss_percent: f32, seed: u64) -> Self {
        Self {
            enabled: loss_percent > 0.0,
            loss_percent: loss_percent.clamp(0.0, 100.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn should_drop(&mut self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        self.rng.gen_range(0.0..100.0) < self.loss_percent
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub packets_rejected: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl NetworkStats {
    /// Share of outbound packets discarded by loss simulation.
    pub fn drop_percent(&self) -> f32 {
        let attempted = self.packets_sent + self.packets_dropped;
        if attempted == 0 {
            return 0.0;
        }
        self.packets_dropped as f32 / attempted as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_drops() {
        let mut sim = PacketLossSimulation::disabled();
        assert!((0..100).all(|_| !sim.should_drop()));
    }

    #[test]
    fn full_loss_always_drops() {
        let mut sim = PacketLossSimulation::new(100.0, 1);
        assert!((0..100).all(|_| sim.should_drop()));
    }
}
