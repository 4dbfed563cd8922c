mod client;
mod history;
mod replayer;
mod sampler;

pub use client::OwningClient;
pub use history::InputHistoryBuffer;
pub use replayer::{PredictionReplayer, ReconcileOutcome, ReplayStats};
pub use sampler::{InputAxes, InputSampler};
