//! Status protocol decoding.
//!
//! This module provides:
//! - Line parsing from `<TAG> <json>` into [`StatusEvent`](paws_protocol::StatusEvent)
//! - Timestamp canonicalization to `Z`-suffixed ISO-8601
//! - Conversion of console-style timestamps (`Fri Sep 23 2017 15:38:22 GMT+0630`)

pub mod error;
pub mod parser;
pub mod timestamp;

pub use error::{StatusParseError, StatusParseResult};
pub use parser::parse_status_line;
pub use timestamp::{canonical_iso8601, console_timestamp_to_iso8601, now_iso8601};
