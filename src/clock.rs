// Monotonic microsecond clock used for throughput sampling

#[cfg(test)]
use std::cell::Cell;
use std::time::Instant;

pub trait Clock {
    fn now_us(&self) -> u64;
}

/// Microseconds since the clock was created
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Clock that only moves when told to, or by a fixed step per reading.
#[cfg(test)]
#[derive(Default)]
pub struct ManualClock {
    now: Cell<u64>,
    step: Cell<u64>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `step_us` every time the clock is read
    pub fn with_step(step_us: u64) -> Self {
        let clock = Self::default();
        clock.step.set(step_us);
        clock
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now.set(self.now.get() + ms * 1000);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + self.step.get());
        t
    }
}
