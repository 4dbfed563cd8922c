mod connection;
mod endpoint;
mod protocol;
mod simulator;
mod stats;

pub use connection::{ClientConnection, ConnectionError, ConnectionManager, ConnectionState};
pub use endpoint::NetworkEndpoint;
pub use protocol::{
    Correction, DEFAULT_PORT, DEFAULT_TICK_RATE, IntentBatch, MAX_PACKET_SIZE, MoveIntent,
    PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketError, PacketHeader, PacketType,
    StateFrame,
};
pub use simulator::{LinkConditions, LinkStats, LossyLink};
pub use stats::{NetworkStats, PacketLossSimulation};
