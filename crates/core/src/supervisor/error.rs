//! Error types for process supervision.

use crate::state::RecordError;
use paws_protocol::process_models::ProcessId;
use thiserror::Error;

/// Errors returned by supervisor operations.
///
/// Expected failure modes of a running child (stall, non-zero exit,
/// reported exception) are not errors; they are visible in the status
/// record once supervision ends.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The child process could not be created.
    #[error("Failed to spawn command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The status descriptor pipe could not be set up.
    #[error("Failed to create status channel: {0}")]
    StatusChannel(std::io::Error),

    /// The status record rejected the transition.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// No process with this id exists in the table.
    #[error("Process {0} not found")]
    UnknownProcess(ProcessId),

    /// The supervision task has already finished.
    #[error("Process has already finished")]
    AlreadyFinished,

    /// The supervision task ended without reporting an outcome.
    #[error("Supervision task aborted before reporting an outcome")]
    SupervisionAborted,
}

/// Type alias for Result with SupervisorError.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
