use std::time::Duration;

/// Discrete simulation step index shared by both peers.
pub type Tick = u32;

/// Fixed-rate tick source.
///
/// Wall-clock deltas are accumulated and converted into whole ticks. Every tick
/// handed out by [`TickClock::consume_tick`] or [`TickClock::advance`] is exactly one
/// greater than the previous one, starting from the epoch the clock was created with.
#[derive(Debug, Clone)]
pub struct TickClock {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
    next_tick: Tick,
}

impl TickClock {
    const MAX_FRAME_DELTA: f32 = 0.25;

    pub fn new(tick_rate: u32) -> Self {
        Self::starting_at(tick_rate, 0)
    }

    pub fn starting_at(tick_rate: u32, epoch: Tick) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
            next_tick: epoch,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    /// The tick that the next call to `consume_tick`/`advance` will issue.
    pub fn next_tick(&self) -> Tick {
        self.next_tick
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.next_tick.checked_sub(1)
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.clamp(0.0, Self::MAX_FRAME_DELTA);
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> Option<Tick> {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            Some(self.advance())
        } else {
            None
        }
    }

    /// Issues the next tick without touching the accumulator.
    pub fn advance(&mut self) -> Tick {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Moves the epoch forward, e.g. after a handshake tells the client where the
    /// server is. Returns `false` and leaves the clock alone if `epoch` would make a
    /// tick repeat.
    pub fn resync(&mut self, epoch: Tick) -> bool {
        if epoch < self.next_tick {
            return false;
        }
        self.next_tick = epoch;
        self.accumulator = 0.0;
        true
    }

    pub fn alpha(&self) -> f32 {
        self.accumulator / self.dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
