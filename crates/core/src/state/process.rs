//! The status record of one supervised process.
//!
//! A [`StatusRecord`] is created by the caller, handed to the supervisor
//! when the process starts, and read by anyone polling for status. All
//! fields live behind one lock so a status event is applied as a unit and
//! a snapshot never mixes two events.
//!
//! Lifecycle:
//!
//! ```text
//! Idle --arm--> Armed --finalize--> Finalized
//! ```

use crate::state::error::{RecordError, RecordResult};
use crate::status::now_iso8601;
use paws_protocol::process_models::{
    CompletionStatus, ExecutionStatus, ProcessStatus, ProgressMetrics, TIMEOUT_EXIT_CODE,
};
use paws_protocol::status_models::{ReportState, StatusEvent};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordPhase {
    Idle,
    /// Reserved by a supervisor that is still spawning the child.
    Claimed,
    Armed,
    Finalized,
}

#[derive(Debug)]
struct RecordInner {
    status: ProcessStatus,
    phase: RecordPhase,
}

/// Synchronized status of one supervised process.
///
/// Writes come only from the supervision task; any number of readers may
/// take snapshots concurrently.
#[derive(Debug)]
pub struct StatusRecord {
    inner: RwLock<RecordInner>,
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRecord {
    /// Create a zero-valued record in the `READY` state.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RecordInner {
                status: ProcessStatus::default(),
                phase: RecordPhase::Idle,
            }),
        }
    }

    /// Reserve the record for a supervisor that is about to spawn.
    ///
    /// Prevents two concurrent starts from sharing one record.
    pub(crate) async fn claim(&self) -> RecordResult<()> {
        let mut inner = self.inner.write().await;
        match inner.phase {
            RecordPhase::Idle => {
                inner.phase = RecordPhase::Claimed;
                Ok(())
            }
            RecordPhase::Claimed | RecordPhase::Armed => Err(RecordError::AlreadyArmed),
            RecordPhase::Finalized => Err(RecordError::AlreadyFinalized),
        }
    }

    /// Undo [`claim`](Self::claim) after a failed spawn.
    pub(crate) async fn release(&self) {
        let mut inner = self.inner.write().await;
        if inner.phase == RecordPhase::Claimed {
            inner.phase = RecordPhase::Idle;
        }
    }

    /// Attach the record to a running process.
    ///
    /// Sets `armed`, moves execution to `RUNNING` and records the pid.
    ///
    /// # Errors
    ///
    /// - `RecordError::AlreadyArmed` if another process owns the record
    /// - `RecordError::AlreadyFinalized` if the record has been finalized
    pub async fn arm(&self, pid: Option<u32>) -> RecordResult<()> {
        let mut inner = self.inner.write().await;
        match inner.phase {
            RecordPhase::Idle | RecordPhase::Claimed => {
                inner.phase = RecordPhase::Armed;
                inner.status.armed = true;
                inner.status.execution_status = ExecutionStatus::Running;
                inner.status.pid = pid;
                Ok(())
            }
            RecordPhase::Armed => Err(RecordError::AlreadyArmed),
            RecordPhase::Finalized => Err(RecordError::AlreadyFinalized),
        }
    }

    /// Merge a decoded status event into the record.
    ///
    /// Progress events replace the progress fields and clear any previous
    /// exception message. Exception events set `state` and `message` and
    /// leave progress alone. `Unrecognized` changes nothing.
    ///
    /// # Returns
    ///
    /// `true` if the record changed. Events that arrive before arming or
    /// after finalizing are dropped.
    pub async fn apply_event(&self, event: &StatusEvent) -> bool {
        if matches!(event, StatusEvent::Unrecognized { .. }) {
            return false;
        }

        let mut inner = self.inner.write().await;
        if inner.phase != RecordPhase::Armed {
            return false;
        }

        let status = &mut inner.status;
        match event {
            StatusEvent::Progress(update) => {
                status.state = ReportState::Progress;
                status.message = None;
                status.progress = ProgressMetrics::compute(
                    update.counter,
                    update.counter_max,
                    update.ready,
                    update.stage_name.clone(),
                    update.stage_number,
                    update.stage_weights.clone(),
                );
                if update.timeout_for_next_status.is_some() {
                    status.timeout_for_next_status = update.timeout_for_next_status;
                }
            }
            StatusEvent::Exception { message, .. } => {
                status.state = ReportState::Exception;
                status.message = Some(message.clone());
            }
            StatusEvent::Unrecognized { .. } => return false,
        }

        // Reports without a timestamp are stamped on arrival.
        status.time_stamp = Some(
            event
                .time_stamp()
                .map(str::to_string)
                .unwrap_or_else(now_iso8601),
        );
        true
    }

    /// Record the exit code and clear `armed`.
    ///
    /// Completion is `SUCCESS` for 0, `ABORTED` for [`TIMEOUT_EXIT_CODE`]
    /// and `FAILED` otherwise.
    ///
    /// # Errors
    ///
    /// Calling this twice returns `RecordError::AlreadyFinalized` and leaves
    /// the first result in place.
    pub async fn finalize(&self, exit_code: i32) -> RecordResult<()> {
        let completion = match exit_code {
            0 => CompletionStatus::Success,
            TIMEOUT_EXIT_CODE => CompletionStatus::Aborted,
            _ => CompletionStatus::Failed,
        };
        self.finalize_as(exit_code, completion).await
    }

    /// Like [`finalize`](Self::finalize) with an explicit completion status.
    pub async fn finalize_as(
        &self,
        exit_code: i32,
        completion: CompletionStatus,
    ) -> RecordResult<()> {
        let mut inner = self.inner.write().await;
        match inner.phase {
            RecordPhase::Armed => {
                inner.phase = RecordPhase::Finalized;
                inner.status.armed = false;
                inner.status.exit_code = Some(exit_code);
                inner.status.execution_status = ExecutionStatus::Complete;
                inner.status.completion_status = completion;
                Ok(())
            }
            RecordPhase::Finalized => Err(RecordError::AlreadyFinalized),
            RecordPhase::Idle | RecordPhase::Claimed => Err(RecordError::NotArmed),
        }
    }

    /// Consistent copy of every field.
    pub async fn snapshot(&self) -> ProcessStatus {
        self.inner.read().await.status.clone()
    }

    pub async fn is_armed(&self) -> bool {
        self.inner.read().await.status.armed
    }

    /// Exit code, or `None` until the record is finalized.
    pub async fn exit_code(&self) -> Option<i32> {
        self.inner.read().await.status.exit_code
    }

    pub async fn is_finalized(&self) -> bool {
        self.inner.read().await.phase == RecordPhase::Finalized
    }
}
