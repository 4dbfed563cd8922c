mod authority;
mod channel;
mod inbox;
mod server;
mod state;
mod step;
mod tick;

pub use authority::{AuthoritativeSimulator, AuthorityStats, BatchReceipt, TickReport};
pub use channel::ReconciliationChannel;
pub use inbox::{InboxVerdict, IntentInbox};
pub use server::{AuthorityServer, OutboundCorrection};
pub use state::{SimulationState, StateHistory};
pub use step::{KinematicStep, MovementConfig, StepContext, StepFlags, StepFunction};
pub use tick::{Tick, TickClock};
