//! Device-level features running on top of the broker connection

pub mod app;
pub mod command_responder;
pub mod stats_reporter;

pub use app::{assemble_device_app, build_device_app};
pub use command_responder::{CommandResponder, DebugCommand, COMMAND_TOPIC, LOG_TOPIC};
pub use stats_reporter::DeviceStatsReporter;

use crate::clock::elapsed_ms;

/// Whole seconds since start, accumulated from a wrapping millisecond clock
#[derive(Debug, Clone, Copy)]
pub struct UptimeCounter {
    last_ms: u32,
    carry_ms: u32,
    seconds: u64,
}

impl UptimeCounter {
    pub fn new(now_ms: u32) -> Self {
        Self {
            last_ms: now_ms,
            carry_ms: 0,
            seconds: 0,
        }
    }

    /// Fold the time since the last update in. Must be called more often than
    /// the clock wraps.
    pub fn update(&mut self, now_ms: u32) -> u64 {
        let total = u64::from(self.carry_ms) + u64::from(elapsed_ms(now_ms, self.last_ms));
        self.last_ms = now_ms;
        self.seconds += total / 1000;
        self.carry_ms = (total % 1000) as u32;
        self.seconds
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_keeps_remainder() {
        let mut uptime = UptimeCounter::new(0);
        assert_eq!(uptime.update(600), 0);
        assert_eq!(uptime.update(1_200), 1);
        assert_eq!(uptime.update(1_999), 1);
        assert_eq!(uptime.update(2_000), 2);
        assert_eq!(uptime.update(12_000), 12);
    }

    #[test]
    fn test_uptime_across_wrap() {
        let mut uptime = UptimeCounter::new(u32::MAX - 499);
        assert_eq!(uptime.update(1_500), 2);
        assert_eq!(uptime.seconds(), 2);
    }
}
