use serde::{Deserialize, Serialize};

use crate::net::DEFAULT_TICK_RATE;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("tick rate must be at least 1 Hz")]
    ZeroTickRate,
    #[error("redundancy window must be at least 1")]
    ZeroRedundancy,
    #[error("reconciliation cadence must be at least 1 tick")]
    ZeroCadence,
    #[error("input history capacity {capacity} is smaller than the redundancy window {redundancy}")]
    HistoryTooSmall { capacity: usize, redundancy: usize },
    #[error("state history capacity {capacity} cannot cover a cadence of {cadence} ticks")]
    StateHistoryTooSmall { capacity: usize, cadence: u32 },
    #[error("snap threshold must be positive, got {0}")]
    InvalidSnapThreshold(f32),
}

/// Knobs shared by both peers. Client and server must agree on `tick_rate` and the
/// movement parameters; the rest may differ per side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub tick_rate: u32,
    /// Number of trailing intents resent in every batch (R).
    pub redundancy: usize,
    /// Corrections go out every `reconciliation_cadence` ticks (K).
    pub reconciliation_cadence: u32,
    pub history_capacity: usize,
    pub state_history_capacity: usize,
    /// How far ahead of the server's tick the client stamps its intents.
    pub input_lead_ticks: u32,
    /// Corrections that move the prediction further than this snap instead of blending.
    pub snap_threshold: f32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            redundancy: 3,
            reconciliation_cadence: 1,
            history_capacity: 128,
            state_history_capacity: 64,
            input_lead_ticks: 4,
            snap_threshold: 2.0,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.redundancy == 0 {
            return Err(ConfigError::ZeroRedundancy);
        }
        if self.reconciliation_cadence == 0 {
            return Err(ConfigError::ZeroCadence);
        }
        if self.history_capacity < self.redundancy {
            return Err(ConfigError::HistoryTooSmall {
                capacity: self.history_capacity,
                redundancy: self.redundancy,
            });
        }
        if self.state_history_capacity < self.reconciliation_cadence as usize {
            return Err(ConfigError::StateHistoryTooSmall {
                capacity: self.state_history_capacity,
                cadence: self.reconciliation_cadence,
            });
        }
        if !(self.snap_threshold > 0.0) {
            return Err(ConfigError::InvalidSnapThreshold(self.snap_threshold));
        }
        Ok(())
    }

    /// Furthest the server will buffer intents ahead of its own tick.
    pub fn max_intent_lead(&self) -> u32 {
        self.history_capacity as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ProtocolConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inconsistent_values() {
        let config = ProtocolConfig {
            redundancy: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroRedundancy));

        let config = ProtocolConfig {
            redundancy: 8,
            history_capacity: 4,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::HistoryTooSmall {
                capacity: 4,
                redundancy: 8
            })
        );

        let config = ProtocolConfig {
            snap_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSnapThreshold(_))
        ));
    }
}
