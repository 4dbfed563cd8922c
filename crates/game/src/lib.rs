pub mod config;
pub mod entity;
pub mod event;
pub mod net;
pub mod prediction;
pub mod simulation;

pub use config::{ConfigError, ProtocolConfig};
pub use entity::{ClientId, Entity, EntityId, EntityRoles};
pub use event::FeedbackEvent;
pub use net::{
    ClientConnection, ConnectionError, ConnectionManager, ConnectionState, Correction,
    DEFAULT_PORT, DEFAULT_TICK_RATE, IntentBatch, LinkConditions, LinkStats, LossyLink,
    MoveIntent, NetworkEndpoint, NetworkStats, Packet, PacketError, PacketHeader,
    PacketLossSimulation, PacketType, StateFrame,
};
pub use prediction::{
    InputAxes, InputHistoryBuffer, InputSampler, OwningClient, PredictionReplayer,
    ReconcileOutcome, ReplayStats,
};
pub use simulation::{
    AuthoritativeSimulator, AuthorityServer, AuthorityStats, KinematicStep, MovementConfig,
    OutboundCorrection, SimulationState, StepContext, StepFlags, StepFunction, Tick, TickClock,
    TickReport,
};
