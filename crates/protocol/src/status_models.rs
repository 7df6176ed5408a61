//! Status protocol models.
//!
//! Instrument-control processes report progress by writing one line per
//! update on a dedicated status descriptor:
//!
//! ```text
//! <TAG> <json-object>\n
//! ```
//!
//! This module defines the tag, the JSON report carried after it, and the
//! decoded [`StatusEvent`] that the supervisor consumes.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Generic status tag understood by every tool.
pub const GENERIC_STATUS_TAG: &str = "_STATUS";

/// Status tag emitted by the basecaller.
pub const BASECALLER_STATUS_TAG: &str = "PA_BASECALLER_STATUS";

/// The token that introduces a status line.
///
/// `_STATUS` and `PA_BASECALLER_STATUS` are the two tags seen in the field.
/// Other tools use their own `<TOOL>_STATUS` token with the same schema,
/// which is preserved verbatim in [`StatusTag::Tool`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatusTag {
    /// `_STATUS`
    Generic,
    /// `PA_BASECALLER_STATUS`
    Basecaller,
    /// Any other token ending in `_STATUS`, e.g. `PA_PPA_STATUS`.
    Tool(String),
}

impl StatusTag {
    /// Classify a leading token, returning `None` if it is not a status tag.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            GENERIC_STATUS_TAG => Some(StatusTag::Generic),
            BASECALLER_STATUS_TAG => Some(StatusTag::Basecaller),
            other if other.len() > GENERIC_STATUS_TAG.len()
                && other.ends_with(GENERIC_STATUS_TAG)
                && !other.starts_with('+') =>
            {
                Some(StatusTag::Tool(other.to_string()))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StatusTag::Generic => GENERIC_STATUS_TAG,
            StatusTag::Basecaller => BASECALLER_STATUS_TAG,
            StatusTag::Tool(token) => token,
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StatusTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StatusTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        StatusTag::from_token(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("expected a *_STATUS tag, got {s}")))
    }
}

/// Lifecycle state reported by the child.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum ReportState {
    /// Normal progress update. Assumed when `state` is absent.
    #[default]
    Progress,

    /// The child hit a failure and describes it in `message`.
    Exception,
}

/// The JSON object that follows a status tag.
///
/// Every field is optional on the wire. Missing numeric fields decode as
/// zero and a missing `state` decodes as [`ReportState::Progress`].
///
/// # Example
///
/// ```json
/// {"counter":0,"counterMax":1,"ready":false,"stageName":"StartUp",
///  "stageNumber":0,"stageWeights":[10,80,10],"state":"progress",
///  "timeStamp":"2022-03-21T23:27:40Z","timeoutForNextStatus":300}
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(default)]
    pub state: ReportState,

    /// Failure description. Present when `state` is `exception`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Monotonic work counter, e.g. frames or ZMWs processed.
    #[serde(default)]
    pub counter: u64,

    /// Value `counter` is expected to reach when the stage is done.
    #[serde(default)]
    pub counter_max: u64,

    /// Set when the instrument may resume feeding data.
    #[serde(default)]
    pub ready: bool,

    #[serde(default)]
    pub stage_name: String,

    /// Zero-based index into `stage_weights`.
    #[serde(default)]
    pub stage_number: u32,

    /// Relative weight of each stage. Not normalized.
    #[serde(default)]
    pub stage_weights: Vec<f64>,

    /// ISO-8601 UTC time of the report, `Z` suffixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,

    /// Seconds until the next report is due. The supervisor kills the
    /// child if nothing arrives in time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_for_next_status: Option<f64>,
}

impl StatusReport {
    /// Render the report as a complete status line (without newline).
    pub fn to_line(&self, tag: &StatusTag) -> serde_json::Result<String> {
        Ok(format!("{tag} {}", serde_json::to_string(self)?))
    }
}

/// A progress update decoded from a status line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub counter: u64,
    pub counter_max: u64,
    pub ready: bool,
    pub stage_name: String,
    pub stage_number: u32,
    pub stage_weights: Vec<f64>,
    pub time_stamp: Option<String>,
    pub timeout_for_next_status: Option<f64>,
}

/// One decoded line from the status descriptor.
///
/// Uses tagged enum serialization:
/// ```json
/// { "kind": "exception", "payload": { "message": "HELLO", "timeStamp": null } }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum StatusEvent {
    /// A `state: "progress"` report.
    Progress(ProgressUpdate),

    /// A `state: "exception"` report.
    #[serde(rename_all = "camelCase")]
    Exception {
        message: String,
        time_stamp: Option<String>,
    },

    /// A line that is not `<TAG> <json>`.
    ///
    /// Carries no data but still proves the channel is alive.
    Unrecognized { line: String },
}

impl StatusEvent {
    /// Child-reported timestamp, if the event carries one.
    pub fn time_stamp(&self) -> Option<&str> {
        match self {
            StatusEvent::Progress(update) => update.time_stamp.as_deref(),
            StatusEvent::Exception { time_stamp, .. } => time_stamp.as_deref(),
            StatusEvent::Unrecognized { .. } => None,
        }
    }

    /// Child-requested deadline for the next line, in seconds.
    pub fn timeout_for_next_status(&self) -> Option<f64> {
        match self {
            StatusEvent::Progress(update) => update.timeout_for_next_status,
            _ => None,
        }
    }

    /// Convert back into the wire report. `Unrecognized` has none.
    pub fn to_report(&self) -> Option<StatusReport> {
        match self {
            StatusEvent::Progress(update) => Some(StatusReport {
                state: ReportState::Progress,
                message: None,
                counter: update.counter,
                counter_max: update.counter_max,
                ready: update.ready,
                stage_name: update.stage_name.clone(),
                stage_number: update.stage_number,
                stage_weights: update.stage_weights.clone(),
                time_stamp: update.time_stamp.clone(),
                timeout_for_next_status: update.timeout_for_next_status,
            }),
            StatusEvent::Exception {
                message,
                time_stamp,
            } => Some(StatusReport {
                state: ReportState::Exception,
                message: Some(message.clone()),
                time_stamp: time_stamp.clone(),
                ..StatusReport::default()
            }),
            StatusEvent::Unrecognized { .. } => None,
        }
    }
}
