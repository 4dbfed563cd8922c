use std::time::Duration;

use glide::{MovementConfig, PacketLossSimulation, ProtocolConfig};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub protocol: ProtocolConfig,
    pub movement: MovementConfig,
    pub connection_timeout_secs: u64,
    pub hello_interval: Duration,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            movement: MovementConfig::default(),
            connection_timeout_secs: 10,
            hello_interval: Duration::from_millis(250),
            packet_loss: None,
        }
    }
}
