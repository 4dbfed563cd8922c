use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::simulation::Tick;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub latency_ticks: u32,
    pub jitter_ticks: u32,
    pub seed: u64,
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self::perfect()
    }
}

impl LinkConditions {
    pub fn perfect() -> Self {
        Self {
            loss_percent: 0.0,
            latency_ticks: 0,
            jitter_ticks: 0,
            seed: 0,
        }
    }

    pub fn with_latency(mut self, latency_ticks: u32, jitter_ticks: u32) -> Self {
        self.latency_ticks = latency_ticks;
        self.jitter_ticks = jitter_ticks;
        self
    }

    pub fn with_loss(mut self, loss_percent: f32, seed: u64) -> Self {
        self.loss_percent = loss_percent.clamp(0.0, 100.0);
        self.seed = seed;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

#[derive(Debug)]
struct InFlight<T> {
    release_tick: Tick,
    order: u64,
    message: T,
}

impl<T> PartialEq for InFlight<T> {
    fn eq(&self, other: &Self) -> bool {
        self.release_tick == other.release_tick && self.order == other.order
    }
}

impl<T> Eq for InFlight<T> {}

impl<T> PartialOrd for InFlight<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for InFlight<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_tick
            .cmp(&self.release_tick)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// One direction of an unreliable, tick-clocked link.
///
/// Messages are dropped with `loss_percent` probability and otherwise released
/// `latency_ticks` (plus up to `jitter_ticks`) after being sent. Jitter can reorder
/// messages; messages released on the same tick come out in send order. The RNG is
/// seeded so every run with the same conditions behaves the same.
pub struct LossyLink<T> {
    conditions: LinkConditions,
    rng: ChaCha8Rng,
    in_flight: BinaryHeap<InFlight<T>>,
    next_order: u64,
    scripted_drops: BTreeSet<Tick>,
    drop_next: u32,
    stats: LinkStats,
}

impl<T> LossyLink<T> {
    pub fn new(conditions: LinkConditions) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(conditions.seed),
            conditions,
            in_flight: BinaryHeap::new(),
            next_order: 0,
            scripted_drops: BTreeSet::new(),
            drop_next: 0,
            stats: LinkStats::default(),
        }
    }

    pub fn perfect() -> Self {
        Self::new(LinkConditions::perfect())
    }

    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.rng = ChaCha8Rng::seed_from_u64(conditions.seed);
        self.conditions = conditions;
    }

    /// Drops whatever is sent on `tick`.
    pub fn drop_sent_at(&mut self, tick: Tick) {
        self.scripted_drops.insert(tick);
    }

    /// Drops the next `count` messages regardless of conditions.
    pub fn drop_next(&mut self, count: u32) {
        self.drop_next += count;
    }

    /// Returns `false` if the message was lost.
    pub fn send(&mut self, now: Tick, message: T) -> bool {
        self.stats.sent += 1;

        if self.should_drop(now) {
            self.stats.dropped += 1;
            log::trace!("link dropped message sent at tick {}", now);
            return false;
        }

        let jitter = if self.conditions.jitter_ticks > 0 {
            self.rng.gen_range(0..=self.conditions.jitter_ticks)
        } else {
            0
        };
        let release_tick = now
            .saturating_add(self.conditions.latency_ticks)
            .saturating_add(jitter);

        self.in_flight.push(InFlight {
            release_tick,
            order: self.next_order,
            message,
        });
        self.next_order += 1;
        true
    }

    /// Everything due at or before `now`, in release order.
    pub fn deliver(&mut self, now: Tick) -> Vec<T> {
        let mut delivered = Vec::new();
        while self
            .in_flight
            .peek()
            .is_some_and(|flight| flight.release_tick <= now)
        {
            if let Some(flight) = self.in_flight.pop() {
                delivered.push(flight.message);
            }
        }
        self.stats.delivered += delivered.len() as u64;
        delivered
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn should_drop(&mut self, now: Tick) -> bool {
        if self.scripted_drops.remove(&now) {
            return true;
        }
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return true;
        }
        self.conditions.loss_percent > 0.0
            && self.rng.gen_range(0.0..100.0) < self.conditions.loss_percent
    }
}
