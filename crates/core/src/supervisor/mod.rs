//! Process supervision.
//!
//! This module provides:
//! - [`Supervisor`]: starts children and hands back [`ProcessHandle`]s
//! - [`StatusChannelReader`]: turns the status descriptor into events
//! - [`Watchdog`]: the heartbeat timer that kills stalled children
//! - [`HeartbeatPolicy`]: how long to wait for each next status line
//!
//! A supervised process runs three tasks: the reader, the watchdog timer
//! and the supervision task that owns the child and finalizes its record.

pub mod error;
pub mod launch;
pub mod policy;
pub mod reader;
pub mod task;
pub mod watchdog;

pub use error::{SupervisorError, SupervisorResult};
pub use launch::{spawn_child, OutputCapture, ProcessLaunch, SpawnedChild};
pub use policy::HeartbeatPolicy;
pub use reader::{ReaderExit, StatusChannelReader};
pub use task::{SupervisionOutcome, SupervisionState, TerminationReason};
pub use watchdog::{Watchdog, WatchdogHandle, WatchdogPhase};

use crate::state::StatusRecord;
use crate::supervisor::policy::seconds;
use crate::supervisor::task::Supervision;
use paws_protocol::config_models::SupervisorConfig;
use paws_protocol::process_models::ProcessId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Status lines buffered between the reader and the supervision task.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Starts supervised processes.
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn policy(&self) -> HeartbeatPolicy {
        HeartbeatPolicy::from_config(&self.config)
    }

    /// Start `launch` under supervision, writing status into `record`.
    ///
    /// The first status line is allowed `initial_stall_secs` on top of the
    /// default deadline.
    ///
    /// # Errors
    ///
    /// - `SupervisorError::Record` if `record` is in use or finalized
    /// - `SupervisorError::Spawn` / `StatusChannel` if the child cannot be
    ///   created; `record` is left untouched and no task is started
    pub async fn start(
        &self,
        launch: ProcessLaunch,
        record: Arc<StatusRecord>,
    ) -> SupervisorResult<ProcessHandle> {
        let stall = seconds(self.config.initial_stall_secs);
        self.start_controlled(launch, record, stall).await
    }

    /// Like [`start`](Self::start) with an explicit initial stall period.
    pub async fn start_controlled(
        &self,
        launch: ProcessLaunch,
        record: Arc<StatusRecord>,
        stall: Duration,
    ) -> SupervisorResult<ProcessHandle> {
        record.claim().await?;

        let spawned = match spawn_child(&launch, &self.config) {
            Ok(spawned) => spawned,
            Err(e) => {
                record.release().await;
                tracing::warn!(tool = launch.tool_label(), error = %e, "spawn failed");
                return Err(e);
            }
        };
        let SpawnedChild {
            child,
            pid,
            status_channel,
            capture,
        } = spawned;

        record.arm(pid).await?;

        let policy = self.policy();
        let initial_deadline = policy.initial_deadline(stall);
        let watchdog = Watchdog::start(initial_deadline);
        tracing::debug!(
            pid = ?pid,
            deadline_ms = initial_deadline.as_millis() as u64,
            "watchdog armed"
        );

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = StatusChannelReader::spawn(status_channel, policy, watchdog.handle(), events_tx);

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(None);
        let tool = launch.tool_label().to_string();

        let supervision = Supervision {
            tool: tool.clone(),
            child,
            pid,
            capture,
            record: Arc::clone(&record),
            watchdog,
            reader,
            events: events_rx,
            stop: stop_rx,
            done: done_tx,
        };
        tokio::spawn(supervision.run());

        Ok(ProcessHandle {
            id: ProcessId::new(),
            pid,
            tool,
            record,
            stop_tx,
            done: done_rx,
        })
    }
}

/// Caller-side handle to one supervised process.
///
/// Clones share the same process. Dropping every handle does not stop
/// supervision.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: ProcessId,
    pid: Option<u32>,
    tool: String,
    record: Arc<StatusRecord>,
    stop_tx: mpsc::Sender<()>,
    done: watch::Receiver<Option<SupervisionOutcome>>,
}

impl ProcessHandle {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// The status record this process writes to.
    pub fn record(&self) -> &Arc<StatusRecord> {
        &self.record
    }

    /// Outcome, if supervision has ended.
    pub fn outcome(&self) -> Option<SupervisionOutcome> {
        *self.done.borrow()
    }

    pub fn state(&self) -> SupervisionState {
        match self.outcome() {
            None => SupervisionState::Running,
            Some(SupervisionOutcome {
                reason: TerminationReason::Exited,
                ..
            }) => SupervisionState::Completed,
            Some(_) => SupervisionState::Killed,
        }
    }

    /// Wait until supervision has finalized the record.
    ///
    /// Dropping the returned future abandons the wait only; supervision
    /// carries on.
    pub async fn wait(&self) -> SupervisorResult<SupervisionOutcome> {
        let mut done = self.done.clone();
        let outcome = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SupervisorError::SupervisionAborted)?;
        (*outcome).ok_or(SupervisorError::SupervisionAborted)
    }

    /// Ask the supervisor to kill the process.
    ///
    /// Returns once the request is queued; use [`wait`](Self::wait) to
    /// observe the result. Repeated requests are merged.
    ///
    /// # Errors
    ///
    /// `SupervisorError::AlreadyFinished` if supervision has ended.
    pub fn stop(&self) -> SupervisorResult<()> {
        if self.outcome().is_some() {
            return Err(SupervisorError::AlreadyFinished);
        }
        match self.stop_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SupervisorError::AlreadyFinished),
        }
    }
}
