//! Property tests for status line decoding and timestamp conversion.

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};
use paws_core::status::{console_timestamp_to_iso8601, parse_status_line};
use paws_protocol::status_models::{StatusEvent, StatusReport, StatusTag};
use proptest::prelude::*;

proptest! {
    #[test]
    fn untagged_lines_are_unrecognized(line in "[^\\n]*") {
        let first = line.trim().split(|c: char| c.is_whitespace() || c == '{').next().unwrap_or("");
        prop_assume!(StatusTag::from_token(first).is_none());

        let event = parse_status_line(&line);
        prop_assert!(matches!(event, Ok(StatusEvent::Unrecognized { .. })), "expected Unrecognized, got {:?}", event);
    }

    #[test]
    fn progress_reports_survive_reencoding(
        counter in any::<u64>(),
        counter_max in any::<u64>(),
        ready in any::<bool>(),
        stage_name in "[A-Za-z ]{0,12}",
        stage_number in 0u32..8,
        stage_weights in prop::collection::vec(0u32..1000, 0..5),
        timeout in prop::option::of(1u32..100_000),
        basecaller in any::<bool>(),
    ) {
        let report = StatusReport {
            counter,
            counter_max,
            ready,
            stage_name,
            stage_number,
            stage_weights: stage_weights.into_iter().map(f64::from).collect(),
            timeout_for_next_status: timeout.map(f64::from),
            ..StatusReport::default()
        };
        let tag = if basecaller { StatusTag::Basecaller } else { StatusTag::Generic };
        let line = report.to_line(&tag).unwrap();

        let event = parse_status_line(&line).unwrap();
        prop_assert_eq!(event.to_report(), Some(report));
    }

    #[test]
    fn console_timestamps_convert_exactly(
        secs in 0i64..4_102_444_800,
        offset_minutes in -840i32..=840,
    ) {
        let zone = FixedOffset::east_opt(offset_minutes * 60).unwrap();
        let local = zone.timestamp_opt(secs, 0).unwrap();
        let text = local.format("%a %b %d %Y %H:%M:%S GMT%z").to_string();

        let expected = DateTime::<Utc>::from_timestamp(secs, 0)
            .unwrap()
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        prop_assert_eq!(console_timestamp_to_iso8601(&text).unwrap(), expected);
    }
}

#[test]
fn console_timestamp_example() {
    assert_eq!(
        console_timestamp_to_iso8601("Fri Sep 23 2017 15:38:22 GMT+0630").unwrap(),
        "2017-09-23T09:08:22Z"
    );
}
