//! Error types for status line decoding.

use thiserror::Error;

/// Errors produced while decoding a status line.
///
/// A line without a status tag is not an error; it decodes as
/// `StatusEvent::Unrecognized`. These variants only cover lines that carry
/// a recognized tag but whose body cannot be accepted.
#[derive(Error, Debug)]
pub enum StatusParseError {
    /// The JSON body does not match the status report schema.
    #[error("Invalid {tag} report: {source}")]
    InvalidReport {
        tag: String,
        source: serde_json::Error,
    },

    /// A timestamp could not be interpreted.
    #[error("Invalid timestamp '{text}': {reason}")]
    InvalidTimestamp { text: String, reason: String },
}

/// Type alias for Result with StatusParseError.
pub type StatusParseResult<T> = Result<T, StatusParseError>;
