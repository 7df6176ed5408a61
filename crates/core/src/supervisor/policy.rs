//! Heartbeat deadline policy.

use paws_protocol::config_models::SupervisorConfig;
use paws_protocol::status_models::StatusEvent;
use std::time::Duration;

/// Upper bound on any single heartbeat deadline.
///
/// Keeps `Instant` arithmetic in range when a child asks for an absurd
/// `timeoutForNextStatus`.
pub const MAX_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Decides how long the watchdog waits for the next status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatPolicy {
    /// Deadline after a line that carries no `timeoutForNextStatus`.
    pub default_deadline: Duration,

    /// Factor applied to every child-requested timeout.
    pub timeout_multiplier: f64,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}

impl HeartbeatPolicy {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            default_deadline: seconds(config.default_deadline_secs),
            timeout_multiplier: config.timeout_multiplier,
        }
    }

    /// Deadline to arm after `event` arrives.
    ///
    /// For a progress line, a positive `timeoutForNextStatus` is scaled by
    /// the multiplier and anything else falls back to the default deadline.
    /// Exception and unrecognized lines return `None`: they count as a
    /// heartbeat but keep the deadline length already in force.
    pub fn deadline_after(&self, event: &StatusEvent) -> Option<Duration> {
        let StatusEvent::Progress(update) = event else {
            return None;
        };
        Some(match update.timeout_for_next_status {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                seconds(secs * self.timeout_multiplier)
            }
            _ => self.default_deadline,
        })
    }

    /// Deadline for the first status line, allowing `stall` extra time.
    pub fn initial_deadline(&self, stall: Duration) -> Duration {
        self.default_deadline.saturating_add(stall).min(MAX_DEADLINE)
    }
}

/// Convert float seconds to a `Duration` clamped to `[0, MAX_DEADLINE]`.
pub fn seconds(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_DEADLINE)
        .min(MAX_DEADLINE)
}
