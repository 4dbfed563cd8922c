use bitflags::bitflags;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::event::FeedbackEvent;
use crate::net::MoveIntent;

use super::SimulationState;

const MOVING_EPSILON: f32 = 1e-6;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StepFlags: u8 {
        /// The step re-applies an intent that was already simulated once.
        const REPLAYING = 1 << 0;
    }
}

/// Per-invocation capabilities handed to a [`StepFunction`].
///
/// Feedback emitted while `REPLAYING` is dropped here, so step implementations do
/// not need to check the flag themselves.
#[derive(Debug, Default)]
pub struct StepContext {
    flags: StepFlags,
    feedback: Vec<FeedbackEvent>,
}

impl StepContext {
    pub fn new(flags: StepFlags) -> Self {
        Self {
            flags,
            feedback: Vec::new(),
        }
    }

    pub fn live() -> Self {
        Self::new(StepFlags::empty())
    }

    pub fn replaying() -> Self {
        Self::new(StepFlags::REPLAYING)
    }

    pub fn flags(&self) -> StepFlags {
        self.flags
    }

    pub fn is_replaying(&self) -> bool {
        self.flags.contains(StepFlags::REPLAYING)
    }

    pub fn emit(&mut self, event: FeedbackEvent) {
        if self.is_replaying() {
            return;
        }
        self.feedback.push(event);
    }

    pub fn take_feedback(&mut self) -> Vec<FeedbackEvent> {
        std::mem::take(&mut self.feedback)
    }
}

/// The shared simulation step. Must be a pure function of `(state, intent)`: the
/// same inputs yield bit-identical output on client and server, whether or not the
/// context is replaying.
pub trait StepFunction {
    fn step(
        &self,
        state: &SimulationState,
        intent: &MoveIntent,
        ctx: &mut StepContext,
    ) -> SimulationState;
}

impl<F> StepFunction for F
where
    F: Fn(&SimulationState, &MoveIntent, &mut StepContext) -> SimulationState,
{
    fn step(
        &self,
        state: &SimulationState,
        intent: &MoveIntent,
        ctx: &mut StepContext,
    ) -> SimulationState {
        self(state, intent, ctx)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub move_speed: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub turn_rate: f32,
    pub max_angular_speed: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            acceleration: 40.0,
            deceleration: 30.0,
            turn_rate: 10.0,
            max_angular_speed: 12.0,
        }
    }
}

/// Ground movement on the XZ plane: velocity eases toward `axes * move_speed` and the
/// body turns to face its direction of travel.
#[derive(Debug, Clone)]
pub struct KinematicStep {
    config: MovementConfig,
    dt: f32,
}

impl KinematicStep {
    pub fn new(config: MovementConfig, tick_rate: u32) -> Self {
        Self {
            config,
            dt: 1.0 / tick_rate.max(1) as f32,
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }
}

impl StepFunction for KinematicStep {
    fn step(
        &self,
        state: &SimulationState,
        intent: &MoveIntent,
        ctx: &mut StepContext,
    ) -> SimulationState {
        let config = &self.config;
        let dt = self.dt;

        let axes = intent.axes();
        let target_velocity = axes * config.move_speed;
        let rate = if axes == Vec2::ZERO {
            config.deceleration
        } else {
            config.acceleration
        };
        let linear_velocity = move_towards(state.linear_velocity, target_velocity, rate * dt);

        let displacement = linear_velocity * dt;
        let position = state.position + Vec3::new(displacement.x, 0.0, displacement.y);

        let moving = linear_velocity.length_squared() > MOVING_EPSILON;
        let angular_velocity = if moving {
            let heading = linear_velocity.x.atan2(linear_velocity.y);
            let error = normalize_angle(heading - state.rotation);
            (error * config.turn_rate).clamp(-config.max_angular_speed, config.max_angular_speed)
        } else {
            0.0
        };
        let rotation = normalize_angle(state.rotation + angular_velocity * dt);

        let was_moving = state.linear_velocity.length_squared() > MOVING_EPSILON;
        if moving && !was_moving {
            ctx.emit(FeedbackEvent::StartedMoving { tick: intent.tick });
        } else if was_moving && !moving {
            ctx.emit(FeedbackEvent::Stopped {
                tick: intent.tick,
                position: position.to_array(),
            });
        }

        SimulationState {
            tick: intent.tick,
            position,
            rotation,
            linear_velocity,
            angular_velocity,
        }
    }
}

fn move_towards(current: Vec2, target: Vec2, max_delta: f32) -> Vec2 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance == 0.0 {
        target
    } else {
        current + delta / distance * max_delta
    }
}

fn normalize_angle(angle: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let mut normalized = angle % two_pi;
    if normalized > std::f32::consts::PI {
        normalized -= two_pi;
    } else if normalized < -std::f32::consts::PI {
        normalized += two_pi;
    }
    normalized
}
