//! Supervisor configuration models for `paws.toml`.
//!
//! This module defines the settings that control how the supervisor
//! launches children and how patient it is with their heartbeats.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Represents supervisor settings from `paws.toml`.
///
/// Every key is optional; missing keys take the values from
/// [`SupervisorConfig::default`].
///
/// # Example
///
/// ```toml
/// # paws.toml
/// timeout_multiplier = 2.0
/// default_deadline_secs = 5.0
/// initial_stall_secs = 30.0
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Scales every `timeoutForNextStatus` a child reports.
    ///
    /// Slow test rigs raise this instead of patching every tool.
    pub timeout_multiplier: f64,

    /// Heartbeat deadline used when a status line carries no timeout.
    pub default_deadline_secs: f64,

    /// Grace period before the first status line is expected.
    ///
    /// Zero means the first line is held to `default_deadline_secs`.
    pub initial_stall_secs: f64,

    /// Interpreter that runs the command line as `<shell> -c <line>`.
    pub shell: String,

    /// Descriptor number the child writes status lines to.
    pub status_fd: i32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            timeout_multiplier: 1.0,
            default_deadline_secs: 2.0,
            initial_stall_secs: 0.0,
            shell: "/bin/bash".to_string(),
            status_fd: 3,
        }
    }
}
