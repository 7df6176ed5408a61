//! Status line parser.
//!
//! Decodes one line from a child's status descriptor. The accepted shape is
//! a status tag token followed by a single JSON object:
//!
//! ```text
//! _STATUS {"counter": 123}
//! PA_BASECALLER_STATUS {"state":"progress","stageName":"StartUp","timeoutForNextStatus":300}
//! ```

use crate::status::error::{StatusParseError, StatusParseResult};
use crate::status::timestamp::canonical_iso8601;
use paws_protocol::status_models::{
    ProgressUpdate, ReportState, StatusEvent, StatusReport, StatusTag,
};

/// Decode one status line.
///
/// # Returns
///
/// - `StatusEvent::Progress` / `StatusEvent::Exception` for a tagged line
///   with a valid report
/// - `StatusEvent::Unrecognized` when the line has no status tag or the
///   text after the tag is not JSON
///
/// # Errors
///
/// Returns `StatusParseError` when the tag is recognized and the body is
/// JSON, but it does not fit the report schema or carries an unreadable
/// `timeStamp`.
///
/// # Example
///
/// ```
/// use paws_core::status::parse_status_line;
/// use paws_protocol::StatusEvent;
///
/// let event = parse_status_line(r#"_STATUS {"counter": 123}"#).unwrap();
/// assert!(matches!(event, StatusEvent::Progress(update) if update.counter == 123));
/// ```
pub fn parse_status_line(line: &str) -> StatusParseResult<StatusEvent> {
    let Some((tag, report)) = parse_tagged_report(line)? else {
        return Ok(StatusEvent::Unrecognized {
            line: line.trim_end_matches(['\r', '\n']).to_string(),
        });
    };

    let time_stamp = report
        .time_stamp
        .as_deref()
        .map(canonical_iso8601)
        .transpose()?;

    tracing::trace!(%tag, state = ?report.state, "decoded status report");

    Ok(match report.state {
        ReportState::Progress => StatusEvent::Progress(ProgressUpdate {
            counter: report.counter,
            counter_max: report.counter_max,
            ready: report.ready,
            stage_name: report.stage_name,
            stage_number: report.stage_number,
            stage_weights: report.stage_weights,
            time_stamp,
            timeout_for_next_status: report.timeout_for_next_status,
        }),
        ReportState::Exception => StatusEvent::Exception {
            message: report.message.unwrap_or_default(),
            time_stamp,
        },
    })
}

/// Split a line into its tag and raw report.
///
/// Returns `Ok(None)` for lines that are not `<TAG> <json>`.
pub fn parse_tagged_report(line: &str) -> StatusParseResult<Option<(StatusTag, StatusReport)>> {
    let text = line.trim();

    // The JSON may follow the tag without a separating space.
    let token_end = text
        .find(|c: char| c.is_whitespace() || c == '{')
        .unwrap_or(text.len());
    let (token, body) = text.split_at(token_end);

    let Some(tag) = StatusTag::from_token(token) else {
        return Ok(None);
    };

    let value: serde_json::Value = match serde_json::from_str(body.trim()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };

    let report = serde_json::from_value(value).map_err(|source| {
        StatusParseError::InvalidReport {
            tag: tag.to_string(),
            source,
        }
    })?;

    Ok(Some((tag, report)))
}
