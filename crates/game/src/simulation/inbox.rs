use std::collections::BTreeMap;

use crate::net::MoveIntent;

use super::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxVerdict {
    Accepted,
    /// A copy for this tick is already waiting.
    Duplicate,
    /// The tick has already been simulated, with this intent or the idle fallback.
    Late,
    /// Further ahead than the inbox is willing to hold.
    TooFarAhead,
}

/// Server-side store of received intents for one entity, keyed by tick.
///
/// Each tick is handed out by [`IntentInbox::take`] at most once; anything arriving
/// for a tick at or before the last taken one is discarded.
#[derive(Debug)]
pub struct IntentInbox {
    pending: BTreeMap<Tick, MoveIntent>,
    last_taken: Option<Tick>,
    max_ahead: u32,
}

impl IntentInbox {
    pub fn new(max_ahead: u32) -> Self {
        Self {
            pending: BTreeMap::new(),
            last_taken: None,
            max_ahead,
        }
    }

    /// Marks every tick up to and including `tick` as already decided.
    pub fn starting_after(max_ahead: u32, tick: Tick) -> Self {
        Self {
            last_taken: Some(tick),
            ..Self::new(max_ahead)
        }
    }

    pub fn insert(&mut self, intent: MoveIntent) -> InboxVerdict {
        if let Some(last) = self.last_taken {
            if intent.tick <= last {
                return InboxVerdict::Late;
            }
            if intent.tick - last > self.max_ahead {
                return InboxVerdict::TooFarAhead;
            }
        }

        if self.pending.contains_key(&intent.tick) {
            return InboxVerdict::Duplicate;
        }

        self.pending.insert(intent.tick, intent);
        InboxVerdict::Accepted
    }

    /// Removes and returns the intent for `tick`, discarding anything older.
    pub fn take(&mut self, tick: Tick) -> Option<MoveIntent> {
        let newer = self.pending.split_off(&tick.saturating_add(1));
        let mut due = std::mem::replace(&mut self.pending, newer);
        self.last_taken = Some(self.last_taken.map_or(tick, |last| last.max(tick)));
        due.remove(&tick)
    }

    pub fn last_taken(&self) -> Option<Tick> {
        self.last_taken
    }

    pub fn contains(&self, tick: Tick) -> bool {
        self.pending.contains_key(&tick)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
