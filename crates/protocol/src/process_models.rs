//! Runtime process state models.
//!
//! This module defines the structures served to clients that poll the
//! state of a supervised instrument-control process.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::status_models::ReportState;

/// Exit code recorded when the supervisor kills the child, either because
/// the heartbeat deadline expired or because a client asked it to stop.
///
/// Outside the 0..=255 range any real process can return.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Identifies one supervised process in the process table.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(transparent)]
pub struct ProcessId(#[ts(type = "string")] pub Uuid);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where the process is in its lifecycle.
///
/// READY -> RUNNING -> COMPLETE
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Record exists but no process has been started for it.
    #[default]
    Ready,

    /// The process is running under supervision.
    Running,

    /// The process has exited and the record is final.
    Complete,
}

/// How the process ended. Only meaningful once execution is COMPLETE.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    /// Not finished yet. Serialized as an empty string.
    #[default]
    #[serde(rename = "")]
    Incomplete,

    /// Exited with code 0.
    Success,

    /// Exited with a non-zero code.
    Failed,

    /// Killed by the supervisor or terminated by a signal.
    Aborted,
}

/// Progress breakdown derived from the latest progress report.
///
/// `stage_progress` is `counter / counter_max` for the current stage.
/// `net_progress` weighs completed stages fully and the current stage by
/// `stage_progress`, normalized by the sum of `stage_weights`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    pub counter: u64,
    pub counter_max: u64,
    pub ready: bool,
    pub stage_name: String,
    pub stage_number: u32,
    pub stage_weights: Vec<f64>,

    /// Fraction of the current stage completed, in `[0, 1]` when the child
    /// keeps `counter <= counter_max`.
    pub stage_progress: f64,

    /// Fraction of the whole job completed.
    pub net_progress: f64,
}

impl ProgressMetrics {
    /// Compute metrics from raw counters and stage weights.
    pub fn compute(
        counter: u64,
        counter_max: u64,
        ready: bool,
        stage_name: String,
        stage_number: u32,
        stage_weights: Vec<f64>,
    ) -> Self {
        let stage_progress = if counter_max > 0 {
            counter as f64 / counter_max as f64
        } else {
            0.0
        };

        let weight_sum: f64 = stage_weights.iter().sum();
        let mut net_progress = 0.0;
        if weight_sum > 0.0 {
            for (index, weight) in stage_weights.iter().enumerate() {
                let index = index as u32;
                if index < stage_number {
                    net_progress += weight / weight_sum;
                } else if index == stage_number {
                    net_progress += weight * stage_progress / weight_sum;
                }
            }
        }

        Self {
            counter,
            counter_max,
            ready,
            stage_name,
            stage_number,
            stage_weights,
            stage_progress,
            net_progress,
        }
    }
}

/// Point-in-time copy of a supervised process's status record.
///
/// Every field comes from the same critical section, so a snapshot never
/// mixes values from two different status lines.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    /// True while the process is under supervision.
    pub armed: bool,

    pub execution_status: ExecutionStatus,

    pub completion_status: CompletionStatus,

    /// Set once the record is final. [`TIMEOUT_EXIT_CODE`] means the
    /// supervisor killed the process.
    pub exit_code: Option<i32>,

    #[serde(rename = "PID")]
    pub pid: Option<u32>,

    /// Last state reported by the child.
    pub state: ReportState,

    /// Message from the last `exception` report.
    pub message: Option<String>,

    /// Timestamp of the last status event, as reported by the child.
    pub time_stamp: Option<String>,

    /// Deadline the child requested for its next status line, in seconds.
    pub timeout_for_next_status: Option<f64>,

    pub progress: ProgressMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_metrics_mid_stage() {
        let metrics =
            ProgressMetrics::compute(50, 100, false, "Run".to_string(), 1, vec![10.0, 80.0, 10.0]);
        assert!((metrics.stage_progress - 0.5).abs() < 1e-9);
        // 10/100 for stage 0 plus 80 * 0.5 / 100 for stage 1.
        assert!((metrics.net_progress - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_progress_metrics_without_weights() {
        let metrics = ProgressMetrics::compute(3, 0, true, String::new(), 0, vec![]);
        assert_eq!(metrics.stage_progress, 0.0);
        assert_eq!(metrics.net_progress, 0.0);
        assert!(metrics.ready);
    }

    #[test]
    fn test_completion_status_serialization() {
        assert_eq!(
            serde_json::to_value(CompletionStatus::Incomplete).unwrap(),
            ""
        );
        assert_eq!(
            serde_json::to_value(CompletionStatus::Aborted).unwrap(),
            "ABORTED"
        );
    }
}
