use glam::{Vec2, Vec3};

use super::Tick;

const REST_EPSILON: f32 = 1e-6;

/// Everything the step function needs to resume simulating an entity.
///
/// `tick` is the tick whose intent produced this state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationState {
    pub tick: Tick,
    pub position: Vec3,
    pub rotation: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::at_rest(0, Vec3::ZERO)
    }
}

impl SimulationState {
    pub fn at_rest(tick: Tick, position: Vec3) -> Self {
        Self {
            tick,
            position,
            rotation: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
        }
    }

    pub fn is_at_rest(&self) -> bool {
        self.linear_velocity.length_squared() <= REST_EPSILON
            && self.angular_velocity.abs() <= REST_EPSILON
    }

    pub fn position_error(&self, other: &SimulationState) -> f32 {
        self.position.distance(other.position)
    }

    /// Divergence test used when comparing a prediction against the authority.
    pub fn approx_eq(&self, other: &SimulationState, tolerance: f32) -> bool {
        self.tick == other.tick
            && self.position_error(other) <= tolerance
            && (self.rotation - other.rotation).abs() <= tolerance
            && self.linear_velocity.distance(other.linear_velocity) <= tolerance
            && (self.angular_velocity - other.angular_velocity).abs() <= tolerance
    }

    /// Exact comparison, distinguishing `0.0` from `-0.0` and NaN payloads.
    pub fn bit_identical(&self, other: &SimulationState) -> bool {
        let bits = |s: &SimulationState| {
            [
                s.position.x.to_bits(),
                s.position.y.to_bits(),
                s.position.z.to_bits(),
                s.rotation.to_bits(),
                s.linear_velocity.x.to_bits(),
                s.linear_velocity.y.to_bits(),
                s.angular_velocity.to_bits(),
            ]
        };
        self.tick == other.tick && bits(self) == bits(other)
    }
}

/// Tick-indexed ring of past states for one entity.
#[derive(Debug)]
pub struct StateHistory {
    states: Vec<Option<SimulationState>>,
    capacity: usize,
}

impl StateHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            states: vec![None; capacity],
            capacity,
        }
    }

    pub fn push(&mut self, state: SimulationState) {
        let index = (state.tick as usize) % self.capacity;
        self.states[index] = Some(state);
    }

    pub fn get(&self, tick: Tick) -> Option<&SimulationState> {
        let index = (tick as usize) % self.capacity;
        self.states[index].as_ref().filter(|s| s.tick == tick)
    }

    pub fn latest(&self) -> Option<&SimulationState> {
        self.states
            .iter()
            .filter_map(|s| s.as_ref())
            .max_by_key(|s| s.tick)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.states {
            *slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.states.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
