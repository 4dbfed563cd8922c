use std::time::Duration;

use glide::{MovementConfig, PacketLossSimulation, ProtocolConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub protocol: ProtocolConfig,
    pub movement: MovementConfig,
    pub max_clients: usize,
    pub client_timeout: Duration,
    /// Ticks an entity keeps simulating after its owner times out.
    pub orphan_ticks: u32,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            movement: MovementConfig::default(),
            max_clients: 32,
            client_timeout: Duration::from_secs(10),
            orphan_ticks: 300,
            packet_loss: None,
        }
    }
}
