use crate::net::MoveIntent;
use crate::simulation::Tick;

/// Client-side ring of recently sampled intents, one slot per tick.
///
/// Slot `tick % capacity` holds the intent for `tick`, so pushing a new tick evicts
/// the one `capacity` ticks older. Pushing a tick twice replaces the earlier value.
#[derive(Debug)]
pub struct InputHistoryBuffer {
    slots: Vec<Option<MoveIntent>>,
    capacity: usize,
    newest: Option<Tick>,
}

impl InputHistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            capacity,
            newest: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores `intent`. Returns `false` if its tick is already older than the
    /// retained window.
    pub fn push(&mut self, intent: MoveIntent) -> bool {
        if let Some(newest) = self.newest {
            if (newest as u64) >= intent.tick as u64 + self.capacity as u64 {
                return false;
            }
            if intent.tick > newest {
                // Ticks skipped between the old head and this one must not leave stale
                // entries masquerading as part of the window.
                let first_gap = newest as u64 + 1;
                let last_gap = (intent.tick as u64).min(first_gap + self.capacity as u64);
                for gap in first_gap..last_gap {
                    self.slots[(gap % self.capacity as u64) as usize] = None;
                }
            }
        }

        let index = (intent.tick as usize) % self.capacity;
        self.slots[index] = Some(intent);
        self.newest = Some(self.newest.map_or(intent.tick, |n| n.max(intent.tick)));
        true
    }

    pub fn get(&self, tick: Tick) -> Option<&MoveIntent> {
        let index = (tick as usize) % self.capacity;
        self.slots[index].as_ref().filter(|i| i.tick == tick)
    }

    pub fn newest_tick(&self) -> Option<Tick> {
        self.newest
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.slots.iter().flatten().map(|i| i.tick).min()
    }

    /// The newest `count` retained intents, oldest first.
    pub fn window(&self, count: usize) -> Vec<MoveIntent> {
        let Some(newest) = self.newest else {
            return Vec::new();
        };
        let count = count.min(self.capacity) as u64;
        let start = (newest as u64 + 1).saturating_sub(count) as Tick;
        self.range(start, newest)
    }

    /// Every retained intent with a tick strictly greater than `tick`, ascending.
    pub fn after(&self, tick: Tick) -> Vec<MoveIntent> {
        let Some(newest) = self.newest else {
            return Vec::new();
        };
        if tick >= newest {
            return Vec::new();
        }
        let window_start = (newest as u64 + 1).saturating_sub(self.capacity as u64) as Tick;
        self.range((tick + 1).max(window_start), newest)
    }

    /// Whether every tick after `tick` up to the newest is still retained, i.e. a
    /// replay starting from `tick` would not skip anything.
    pub fn covers_after(&self, tick: Tick) -> bool {
        match self.newest {
            None => true,
            Some(newest) if tick >= newest => true,
            Some(newest) => ((tick + 1)..=newest).all(|t| self.get(t).is_some()),
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.newest = None;
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn range(&self, from: Tick, to: Tick) -> Vec<MoveIntent> {
        (from..=to).filter_map(|t| self.get(t).copied()).collect()
    }
}
