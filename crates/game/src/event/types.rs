use crate::simulation::Tick;

/// Cosmetic side effects raised by the step function on a live (non-replayed) tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedbackEvent {
    StartedMoving { tick: Tick },
    Stopped { tick: Tick, position: [f32; 3] },
}

impl FeedbackEvent {
    pub fn tick(&self) -> Tick {
        match self {
            Self::StartedMoving { tick } | Self::Stopped { tick, .. } => *tick,
        }
    }
}
