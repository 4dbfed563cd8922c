use clap::ValueEnum;
use glide::{InputAxes, Tick};

/// Scripted stand-in for a human at the keyboard. Axes are a pure function of the
/// tick so two runs with the same pattern send the same intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InputPattern {
    /// No input device: every tick is idle.
    Idle,
    /// Walk forward forever.
    Line,
    /// Steer in a continuous circle.
    #[default]
    Circle,
    /// Walk the four sides of a square, two seconds each.
    Square,
    /// Alternate one second of walking with one second standing still.
    Stutter,
}

impl InputPattern {
    pub fn axes(self, tick: Tick, tick_rate: u32) -> Option<InputAxes> {
        let tick_rate = tick_rate.max(1);
        let seconds = tick as f32 / tick_rate as f32;

        match self {
            InputPattern::Idle => None,
            InputPattern::Line => Some(InputAxes::new(0.0, 1.0)),
            InputPattern::Circle => {
                let angle = seconds * std::f32::consts::FRAC_PI_2;
                Some(InputAxes::new(angle.sin(), angle.cos()))
            }
            InputPattern::Square => {
                let side = (tick / (tick_rate * 2)) % 4;
                Some(match side {
                    0 => InputAxes::new(0.0, 1.0),
                    1 => InputAxes::new(1.0, 0.0),
                    2 => InputAxes::new(0.0, -1.0),
                    _ => InputAxes::new(-1.0, 0.0),
                })
            }
            InputPattern::Stutter => {
                if (tick / tick_rate) % 2 == 0 {
                    Some(InputAxes::new(0.0, 1.0))
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_are_deterministic() {
        for pattern in InputPattern::value_variants() {
            for tick in [0, 17, 119, 1000] {
                assert_eq!(pattern.axes(tick, 60), pattern.axes(tick, 60));
            }
        }
    }

    #[test]
    fn square_turns_every_two_seconds() {
        let pattern = InputPattern::Square;
        assert_eq!(pattern.axes(0, 60), Some(InputAxes::new(0.0, 1.0)));
        assert_eq!(pattern.axes(120, 60), Some(InputAxes::new(1.0, 0.0)));
        assert_eq!(pattern.axes(480, 60), Some(InputAxes::new(0.0, 1.0)));
    }

    #[test]
    fn stutter_rests_on_odd_seconds() {
        let pattern = InputPattern::Stutter;
        assert!(pattern.axes(30, 60).is_some());
        assert!(pattern.axes(90, 60).is_none());
    }
}
