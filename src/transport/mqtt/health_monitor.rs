//! Pure reconnection and connection health logic for the broker connector
//!
//! Decisions take the clock reading as an argument so they can be tested
//! without a session or a timer.

use super::connection::ConnectionState;
use crate::clock::elapsed_ms;
use tracing::{debug, info, warn};

/// Pure reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide whether a connection attempt is due.
    ///
    /// The first attempt after startup is immediate. Later attempts wait for
    /// `interval_ms` since the previous one. Nothing is attempted while the
    /// link is down.
    pub fn should_attempt(
        last_attempt_ms: Option<u32>,
        now_ms: u32,
        interval_ms: u32,
        link_up: bool,
    ) -> ReconnectionDecision {
        if !link_up {
            return ReconnectionDecision::LinkDown;
        }

        match last_attempt_ms {
            None => ReconnectionDecision::Proceed,
            Some(last) if elapsed_ms(now_ms, last) > interval_ms => ReconnectionDecision::Proceed,
            Some(_) => ReconnectionDecision::Wait,
        }
    }

    /// Whole seconds since the session came up; zero when not connected.
    pub fn connection_time_seconds(connected_since_ms: Option<u32>, now_ms: u32) -> u32 {
        connected_since_ms
            .map(|since| elapsed_ms(now_ms, since) / 1000)
            .unwrap_or(0)
    }

    pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
        if from == to {
            return;
        }
        match to {
            ConnectionState::Connected => info!(?from, "MQTT connected"),
            ConnectionState::Disconnected if from == ConnectionState::Connected => {
                warn!("MQTT connection lost")
            }
            _ => debug!(?from, ?to, "MQTT state change"),
        }
    }
}

/// Outcome of [`HealthMonitor::should_attempt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionDecision {
    Proceed,
    /// Interval since the last attempt has not elapsed yet
    Wait,
    LinkDown,
}
