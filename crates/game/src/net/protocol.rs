use glam::{Vec2, Vec3};
use rkyv::util::AlignedVec;
use rkyv::{rancor, Archive, Deserialize, Serialize};

use crate::entity::EntityId;
use crate::simulation::{SimulationState, Tick};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x474C_4944;
pub const DEFAULT_PORT: u16 = 27020;
pub const DEFAULT_TICK_RATE: u32 = 60;

// Slack so an already normalized diagonal is not renormalized into different bits.
const MAGNITUDE_TOLERANCE: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

/// One entity's desired movement for one tick.
///
/// Axes are expected in `[-1, 1]`. The idle intent (both axes zero) is a real value
/// that is sampled, buffered and sent like any other.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct MoveIntent {
    pub tick: Tick,
    pub horizontal: f32,
    pub vertical: f32,
}

impl MoveIntent {
    pub fn new(tick: Tick, horizontal: f32, vertical: f32) -> Self {
        Self {
            tick,
            horizontal,
            vertical,
        }
    }

    pub fn idle(tick: Tick) -> Self {
        Self::new(tick, 0.0, 0.0)
    }

    pub fn is_idle(&self) -> bool {
        self.horizontal == 0.0 && self.vertical == 0.0
    }

    pub fn axes(&self) -> Vec2 {
        Vec2::new(self.horizontal, self.vertical)
    }

    /// Returns the intent with non-finite axes zeroed, each axis clamped to `[-1, 1]`
    /// and the combined magnitude limited to 1, plus whether anything changed.
    pub fn sanitized(&self) -> (Self, bool) {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        let mut axes = Vec2::new(
            finite(self.horizontal).clamp(-1.0, 1.0),
            finite(self.vertical).clamp(-1.0, 1.0),
        );
        if axes.length_squared() > 1.0 + MAGNITUDE_TOLERANCE {
            axes = axes.normalize();
        }

        let sanitized = Self::new(self.tick, axes.x, axes.y);
        let changed = sanitized.horizontal.to_bits() != self.horizontal.to_bits()
            || sanitized.vertical.to_bits() != self.vertical.to_bits();
        (sanitized, changed)
    }
}

/// Wire form of a [`SimulationState`]. Floats are carried bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct StateFrame {
    pub position: [f32; 3],
    pub rotation: f32,
    pub linear_velocity: [f32; 2],
    pub angular_velocity: f32,
}

impl StateFrame {
    pub fn from_state(state: &SimulationState) -> Self {
        Self {
            position: state.position.to_array(),
            rotation: state.rotation,
            linear_velocity: state.linear_velocity.to_array(),
            angular_velocity: state.angular_velocity,
        }
    }

    pub fn to_state(&self, tick: Tick) -> SimulationState {
        SimulationState {
            tick,
            position: Vec3::from_array(self.position),
            rotation: self.rotation,
            linear_velocity: Vec2::from_array(self.linear_velocity),
            angular_velocity: self.angular_velocity,
        }
    }
}

/// Client → server, once per tick: the trailing redundancy window, oldest first.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct IntentBatch {
    pub entity_id: EntityId,
    pub intents: Vec<MoveIntent>,
}

impl IntentBatch {
    pub fn new(entity_id: EntityId, intents: Vec<MoveIntent>) -> Self {
        Self { entity_id, intents }
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.intents.first().map(|i| i.tick)
    }

    pub fn newest_tick(&self) -> Option<Tick> {
        self.intents.last().map(|i| i.tick)
    }

    pub fn contains_tick(&self, tick: Tick) -> bool {
        self.intents.iter().any(|i| i.tick == tick)
    }
}

/// Server → owning client: authoritative state at `tick`.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Correction {
    pub entity_id: EntityId,
    pub tick: Tick,
    pub state: StateFrame,
}

impl Correction {
    pub fn new(entity_id: EntityId, state: &SimulationState) -> Self {
        Self {
            entity_id,
            tick: state.tick,
            state: StateFrame::from_state(state),
        }
    }

    pub fn simulation_state(&self) -> SimulationState {
        self.state.to_state(self.tick)
    }
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PacketType {
    Hello,
    /// Spawn state of the entity the client now owns, as of `server_tick`.
    Welcome {
        entity_id: EntityId,
        server_tick: Tick,
        state: StateFrame,
    },
    IntentBatch(IntentBatch),
    Correction(Correction),
    Disconnect,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: PacketType,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("packet of {0} bytes exceeds the {max} byte limit", max = MAX_PACKET_SIZE)]
    TooLarge(usize),
}

impl Packet {
    pub fn new(header: PacketHeader, payload: PacketType) -> Self {
        Self { header, payload }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)?;
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        // Socket buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(PacketError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_intent_is_a_real_value() {
        let idle = MoveIntent::idle(7);
        assert_eq!(idle.tick, 7);
        assert!(idle.is_idle());
        assert!(!MoveIntent::new(7, 0.0, -0.5).is_idle());
    }

    #[test]
    fn sanitize_clamps_and_normalizes() {
        let (clean, changed) = MoveIntent::new(1, 0.5, -0.5).sanitized();
        assert!(!changed);
        assert_eq!(clean, MoveIntent::new(1, 0.5, -0.5));

        let (clean, changed) = MoveIntent::new(1, 4.0, 0.0).sanitized();
        assert!(changed);
        assert_eq!(clean.horizontal, 1.0);

        let (clean, changed) = MoveIntent::new(1, 1.0, 1.0).sanitized();
        assert!(changed);
        assert!((clean.axes().length() - 1.0).abs() < 1e-6);

        let (clean, changed) = MoveIntent::new(1, f32::NAN, f32::INFINITY).sanitized();
        assert!(changed);
        assert!(clean.is_idle());
    }

    #[test]
    fn correction_carries_exact_bits() {
        let state = SimulationState {
            tick: 42,
            position: Vec3::new(0.1, 0.0, -3.3),
            rotation: 1.234,
            linear_velocity: Vec2::new(0.7, -0.001),
            angular_velocity: -0.25,
        };

        let correction = Correction::new(9, &state);
        assert_eq!(correction.tick, 42);
        assert_eq!(correction.simulation_state(), state);
    }

    #[test]
    fn packet_serialization() {
        let batch = IntentBatch::new(
            3,
            vec![
                MoveIntent::new(9, 1.0, 0.0),
                MoveIntent::idle(10),
                MoveIntent::new(11, -0.5, 0.25),
            ],
        );
        let packet = Packet::new(PacketHeader::new(5), PacketType::IntentBatch(batch.clone()));

        let bytes = packet.serialize().unwrap();
        let decoded = Packet::deserialize(&bytes).unwrap();

        assert_eq!(decoded.header, packet.header);
        match decoded.payload {
            PacketType::IntentBatch(decoded_batch) => assert_eq!(decoded_batch, batch),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let intents = (0..200).map(|t| MoveIntent::new(t, 1.0, 1.0)).collect();
        let packet = Packet::new(
            PacketHeader::new(0),
            PacketType::IntentBatch(IntentBatch::new(1, intents)),
        );

        assert!(matches!(packet.serialize(), Err(PacketError::TooLarge(_))));
    }
}
