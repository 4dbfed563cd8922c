use crate::net::MoveIntent;
use crate::simulation::Tick;

/// Raw movement axes as read from whatever input device is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputAxes {
    pub horizontal: f32,
    pub vertical: f32,
}

impl InputAxes {
    pub fn new(horizontal: f32, vertical: f32) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }
}

/// Turns the axes read on a client tick into that tick's [`MoveIntent`].
#[derive(Debug, Clone)]
pub struct InputSampler {
    dead_zone: f32,
}

impl Default for InputSampler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DEAD_ZONE)
    }
}

impl InputSampler {
    pub const DEFAULT_DEAD_ZONE: f32 = 0.05;

    pub fn new(dead_zone: f32) -> Self {
        Self {
            dead_zone: dead_zone.clamp(0.0, 1.0),
        }
    }

    pub fn dead_zone(&self) -> f32 {
        self.dead_zone
    }

    /// No device input yields the idle intent. The result already satisfies the
    /// authority's validation, so an honest client never gets clamped.
    pub fn sample(&self, tick: Tick, axes: Option<InputAxes>) -> MoveIntent {
        let Some(axes) = axes else {
            return MoveIntent::idle(tick);
        };

        let filter = |v: f32| if v.abs() < self.dead_zone { 0.0 } else { v };
        let raw = MoveIntent::new(tick, filter(axes.horizontal), filter(axes.vertical));
        raw.sanitized().0
    }
}
