//! The supervision task.
//!
//! One task per child. It applies status events to the record and waits
//! for the first of three signals:
//! - the reader hit end of stream (child exited or closed the descriptor)
//! - the watchdog fired (child stalled)
//! - a caller asked to stop
//!
//! Whichever arrives first decides how the record is finalized. The task
//! is the only code path that finalizes, so it happens exactly once.

use crate::state::StatusRecord;
use crate::supervisor::launch::OutputCapture;
use crate::supervisor::reader::ReaderExit;
use crate::supervisor::watchdog::Watchdog;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use paws_protocol::process_models::{CompletionStatus, TIMEOUT_EXIT_CODE};
use paws_protocol::status_models::StatusEvent;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The child exited on its own.
    Exited,
    /// The heartbeat deadline passed and the child was killed.
    TimedOut,
    /// A caller requested the stop and the child was killed.
    Stopped,
}

/// Final result of one supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionOutcome {
    /// Exit code written to the record.
    pub exit_code: i32,
    pub reason: TerminationReason,
}

/// Supervisor-side lifecycle of one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionState {
    Starting,
    Running,
    /// Finalized with the child's own exit code.
    Completed,
    /// Finalized with [`TIMEOUT_EXIT_CODE`] after a forced kill.
    Killed,
}

/// Everything the supervision task owns.
pub(crate) struct Supervision {
    pub tool: String,
    pub child: Child,
    pub pid: Option<u32>,
    pub capture: OutputCapture,
    pub record: Arc<StatusRecord>,
    pub watchdog: Watchdog,
    pub reader: JoinHandle<ReaderExit>,
    pub events: mpsc::Receiver<StatusEvent>,
    pub stop: mpsc::Receiver<()>,
    pub done: watch::Sender<Option<SupervisionOutcome>>,
}

enum Wake {
    Event(StatusEvent),
    ReaderDone(ReaderExit),
    Expired,
    StopRequested,
}

impl Supervision {
    pub(crate) async fn run(self) {
        let Supervision {
            tool,
            mut child,
            pid,
            capture,
            record,
            mut watchdog,
            mut reader,
            mut events,
            mut stop,
            done,
        } = self;

        let outcome = loop {
            let wake = tokio::select! {
                biased;
                Some(event) = events.recv() => Wake::Event(event),
                exit = &mut reader => Wake::ReaderDone(
                    exit.unwrap_or_else(|e| ReaderExit::Failed(e.to_string())),
                ),
                _ = watchdog.expired() => Wake::Expired,
                Some(()) = stop.recv() => Wake::StopRequested,
            };

            match wake {
                Wake::Event(event) => {
                    record.apply_event(&event).await;
                }
                Wake::ReaderDone(exit) => {
                    if let ReaderExit::Failed(reason) = &exit {
                        tracing::warn!(tool = %tool, pid = ?pid, reason = %reason, "status channel failed; waiting for exit");
                    }
                    // Lines read before EOF are still queued.
                    while let Ok(event) = events.try_recv() {
                        record.apply_event(&event).await;
                    }
                    watchdog.cancel().await;

                    // A child may close the descriptor and keep running, so
                    // a stop request still has to be honored here.
                    let waited = tokio::select! {
                        biased;
                        waited = child.wait() => Some(waited),
                        Some(()) = stop.recv() => None,
                    };
                    break match waited {
                        Some(waited) => finalize_exited(&tool, pid, waited, &record).await,
                        None => {
                            tracing::info!(tool = %tool, pid = ?pid, "stop requested; killing child");
                            terminate(&tool, pid, &mut child, &record, &watchdog, None, TerminationReason::Stopped).await
                        }
                    };
                }
                Wake::Expired => {
                    tracing::warn!(tool = %tool, pid = ?pid, "no status before deadline; killing child");
                    break terminate(&tool, pid, &mut child, &record, &watchdog, Some(reader), TerminationReason::TimedOut).await;
                }
                Wake::StopRequested => {
                    tracing::info!(tool = %tool, pid = ?pid, "stop requested; killing child");
                    break terminate(&tool, pid, &mut child, &record, &watchdog, Some(reader), TerminationReason::Stopped).await;
                }
            }
        };

        capture.log_and_remove(&tool).await;
        drop(child);
        done.send_replace(Some(outcome));
    }
}

/// Finalize with the exit status of a child that exited on its own.
async fn finalize_exited(
    tool: &str,
    pid: Option<u32>,
    waited: std::io::Result<ExitStatus>,
    record: &StatusRecord,
) -> SupervisionOutcome {
    let (exit_code, completion) = match waited {
        Ok(status) => match (status.code(), status.signal()) {
            (Some(code), _) => (code, None),
            // Shell convention for death by signal.
            (None, Some(signal)) => (128 + signal, Some(CompletionStatus::Aborted)),
            (None, None) => (TIMEOUT_EXIT_CODE, Some(CompletionStatus::Aborted)),
        },
        Err(e) => {
            tracing::error!(tool, pid = ?pid, error = %e, "failed to wait for child");
            (TIMEOUT_EXIT_CODE, Some(CompletionStatus::Aborted))
        }
    };

    let finalized = match completion {
        Some(completion) => record.finalize_as(exit_code, completion).await,
        None => record.finalize(exit_code).await,
    };
    if let Err(e) = finalized {
        tracing::error!(tool, pid = ?pid, error = %e, "status record not finalized");
    }

    tracing::info!(tool, pid = ?pid, exit_code, "child completed");
    SupervisionOutcome {
        exit_code,
        reason: TerminationReason::Exited,
    }
}

/// Kill the child's process group, reap it and finalize with the sentinel.
async fn terminate(
    tool: &str,
    pid: Option<u32>,
    child: &mut Child,
    record: &StatusRecord,
    watchdog: &Watchdog,
    reader: Option<JoinHandle<ReaderExit>>,
    reason: TerminationReason,
) -> SupervisionOutcome {
    watchdog.cancel().await;

    if let Err(e) = kill_process_group(pid, child) {
        tracing::error!(tool, pid = ?pid, error = %e, "failed to kill child");
    }

    match child.wait().await {
        Ok(status) => tracing::debug!(tool, pid = ?pid, status = %status, "killed child reaped"),
        Err(e) => tracing::error!(tool, pid = ?pid, error = %e, "failed to reap killed child"),
    }

    // With the whole group gone the descriptor is closed and the reader
    // finishes; aborting covers a descriptor leaked to another process.
    if let Some(reader) = reader {
        reader.abort();
        let _ = reader.await;
    }

    if let Err(e) = record
        .finalize_as(TIMEOUT_EXIT_CODE, CompletionStatus::Aborted)
        .await
    {
        tracing::error!(tool, pid = ?pid, error = %e, "status record not finalized");
    }

    tracing::info!(tool, pid = ?pid, ?reason, "child killed");
    SupervisionOutcome {
        exit_code: TIMEOUT_EXIT_CODE,
        reason,
    }
}

/// SIGKILL the child's process group, falling back to the child alone.
fn kill_process_group(pid: Option<u32>, child: &mut Child) -> std::io::Result<()> {
    if let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => return Ok(()),
            Err(e) => tracing::debug!(pid, error = %e, "killpg failed; killing child directly"),
        }
    }
    child.start_kill()
}
