use std::time::{Duration, Instant};

/// Paces the control loop at a fixed number of ticks per second.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    period: Duration,
    last_tick: Instant,
}

impl RateLimiter {
    pub fn new(ticks_per_second: u32) -> Self {
        Self::new_at(ticks_per_second, Instant::now())
    }

    pub fn new_at(ticks_per_second: u32, now: Instant) -> Self {
        let period = Duration::from_secs(1) / ticks_per_second.max(1);
        Self {
            period,
            last_tick: now,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Milliseconds left until the next tick boundary, never less than 1.
    pub fn remaining_millis(&self) -> u64 {
        self.remaining_millis_at(Instant::now())
    }

    pub fn remaining_millis_at(&self, now: Instant) -> u64 {
        let deadline = self.last_tick + self.period;
        let left = deadline.saturating_duration_since(now).as_millis();
        u64::try_from(left).unwrap_or(u64::MAX).max(1)
    }

    pub fn mark_tick(&mut self) {
        self.mark_tick_at(Instant::now());
    }

    pub fn mark_tick_at(&mut self, now: Instant) {
        self.last_tick = now;
    }

    /// Block until the next tick boundary, then start a new period.
    pub fn sleep(&mut self) {
        std::thread::sleep(Duration::from_millis(self.remaining_millis()));
        self.mark_tick();
    }
}
