//! Error types for status record transitions.

use thiserror::Error;

/// Illegal lifecycle transitions on a [`StatusRecord`](super::StatusRecord).
///
/// Each of these indicates a supervision bug (two exit signals for one
/// process, or a record reused for a second process), never a condition a
/// child can cause.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// The record is already attached to a process.
    #[error("Status record is already armed")]
    AlreadyArmed,

    /// The record was finalized and can no longer change.
    #[error("Status record is already finalized")]
    AlreadyFinalized,

    /// The record was never armed, so there is nothing to finalize.
    #[error("Status record is not armed")]
    NotArmed,
}

/// Type alias for Result with RecordError.
pub type RecordResult<T> = Result<T, RecordError>;
