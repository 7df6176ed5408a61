//! Timestamp handling for status reports.
//!
//! Every timestamp stored in a status record is UTC ISO-8601 with a
//! trailing `Z`. Children report either that form directly or, for some
//! front-end tooling, a console form such as
//! `Fri Sep 23 2017 15:38:22 GMT+0630`.

use crate::status::error::{StatusParseError, StatusParseResult};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};

/// Layout of a console timestamp once the weekday token is removed.
const CONSOLE_LAYOUT: &str = "%b %d %Y %H:%M:%S GMT%z";

/// Offset-less ISO-8601 layouts, interpreted as UTC.
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Current supervisor time as `Z`-suffixed ISO-8601 with milliseconds.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize a child-reported ISO-8601 timestamp to UTC with a `Z` suffix.
///
/// Fractional seconds are kept to millisecond precision when present and
/// dropped when zero. Timestamps without an offset are taken to be UTC.
///
/// # Example
///
/// ```
/// use paws_core::status::canonical_iso8601;
///
/// assert_eq!(
///     canonical_iso8601("2017-01-31T03:59:49.103+02:00").unwrap(),
///     "2017-01-31T01:59:49.103Z"
/// );
/// ```
pub fn canonical_iso8601(text: &str) -> StatusParseResult<String> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(to_utc_string(parsed.with_timezone(&Utc)));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Ok(to_utc_string(naive.and_utc()));
        }
    }

    Err(StatusParseError::InvalidTimestamp {
        text: text.to_string(),
        reason: "not an ISO-8601 date-time".to_string(),
    })
}

fn to_utc_string(time: DateTime<Utc>) -> String {
    let format = if time.nanosecond() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Millis
    };
    time.to_rfc3339_opts(format, true)
}

/// Convert a console timestamp to canonical UTC ISO-8601.
///
/// Accepts `<Day> <Mon> <DD> <YYYY> <hh:mm:ss> GMT<±hhmm>`, optionally
/// followed by a parenthesized zone name. The weekday is not checked
/// against the date; some emitters compute it in a different zone.
///
/// # Example
///
/// ```
/// use paws_core::status::console_timestamp_to_iso8601;
///
/// assert_eq!(
///     console_timestamp_to_iso8601("Fri Sep 23 2017 15:38:22 GMT+0630").unwrap(),
///     "2017-09-23T09:08:22Z"
/// );
/// ```
pub fn console_timestamp_to_iso8601(text: &str) -> StatusParseResult<String> {
    let invalid = |reason: &str| StatusParseError::InvalidTimestamp {
        text: text.to_string(),
        reason: reason.to_string(),
    };

    let mut body = text.trim();

    // "(Myanmar Time)" and similar trailers carry no extra information.
    if body.ends_with(')') {
        if let Some(open) = body.rfind(" (") {
            body = body[..open].trim_end();
        }
    }

    let (weekday, rest) = body
        .split_once(char::is_whitespace)
        .ok_or_else(|| invalid("missing weekday"))?;
    if weekday.len() != 3 || !weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid("weekday must be a three-letter day name"));
    }

    let parsed = DateTime::parse_from_str(rest.trim_start(), CONSOLE_LAYOUT)
        .map_err(|e| invalid(&e.to_string()))?;

    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true))
}
