//! Monotonic millisecond clock and interval timers
//!
//! Every unit in this crate measures time with a wrapping `u32` millisecond
//! counter, the same shape a microcontroller tick counter has. Elapsed time is
//! always computed with [`elapsed_ms`], which stays correct across wraparound.

use std::time::Instant;

/// Source of monotonic milliseconds. The counter is allowed to wrap.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Milliseconds elapsed from `since` to `now`, wraparound-safe.
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Host clock backed by [`Instant`], truncated to a wrapping `u32`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the point: the counter wraps like a hardware tick.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Fixed-interval timer that restarts itself when it fires.
#[derive(Debug, Clone)]
pub struct SimpleTimer {
    interval_ms: u32,
    last_trigger_ms: u32,
}

impl SimpleTimer {
    pub fn new(interval_ms: u32, now_ms: u32) -> Self {
        Self {
            interval_ms,
            last_trigger_ms: now_ms,
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn set_interval(&mut self, interval_ms: u32, now_ms: u32) {
        self.interval_ms = interval_ms;
        self.restart(now_ms);
    }

    pub fn restart(&mut self, now_ms: u32) {
        self.last_trigger_ms = now_ms;
    }

    /// True once more than the interval has passed; restarts the timer when it fires.
    pub fn triggered(&mut self, now_ms: u32) -> bool {
        if elapsed_ms(now_ms, self.last_trigger_ms) > self.interval_ms {
            self.restart(now_ms);
            return true;
        }
        false
    }

    pub fn elapsed(&self, now_ms: u32) -> u32 {
        elapsed_ms(now_ms, self.last_trigger_ms)
    }
}
