//! Process table for all supervised processes.
//!
//! The ProcessTable is the registry a control API works against. It starts
//! processes through a [`Supervisor`], keeps their handles by id, and
//! answers status, stop and wait requests.

use crate::state::StatusRecord;
use crate::supervisor::{
    ProcessHandle, ProcessLaunch, SupervisionOutcome, Supervisor, SupervisorError,
    SupervisorResult,
};
use paws_protocol::process_models::{ProcessId, ProcessStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Manages all supervised processes.
///
/// The ProcessTable provides a centralized interface for:
/// - Starting new supervised processes
/// - Stopping processes
/// - Waiting for completion
/// - Querying status snapshots
#[derive(Clone)]
pub struct ProcessTable {
    supervisor: Supervisor,

    /// Registry of known processes, finished or not, indexed by id.
    processes: Arc<Mutex<HashMap<ProcessId, ProcessHandle>>>,
}

impl ProcessTable {
    /// Create an empty table that starts processes with `supervisor`.
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a process with a fresh status record and register it.
    ///
    /// # Arguments
    ///
    /// * `launch` - Command line, environment and tool label
    ///
    /// # Returns
    ///
    /// A handle to the new process. Its [`ProcessHandle::id`] is the key
    /// it is registered under.
    ///
    /// # Errors
    ///
    /// Returns the spawn error; nothing is registered on failure.
    pub async fn start(&self, launch: ProcessLaunch) -> SupervisorResult<ProcessHandle> {
        let handle = self
            .supervisor
            .start(launch, Arc::new(StatusRecord::new()))
            .await?;
        Ok(self.register(handle).await)
    }

    /// Like [`start`](Self::start) with an explicit initial stall period.
    pub async fn start_controlled(
        &self,
        launch: ProcessLaunch,
        stall: Duration,
    ) -> SupervisorResult<ProcessHandle> {
        let handle = self
            .supervisor
            .start_controlled(launch, Arc::new(StatusRecord::new()), stall)
            .await?;
        Ok(self.register(handle).await)
    }

    async fn register(&self, handle: ProcessHandle) -> ProcessHandle {
        self.processes
            .lock()
            .await
            .insert(handle.id(), handle.clone());
        handle
    }

    /// Get a handle to a process.
    pub async fn get(&self, id: ProcessId) -> Option<ProcessHandle> {
        self.processes.lock().await.get(&id).cloned()
    }

    /// Get a consistent copy of a process's status record.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::UnknownProcess` if the id is not registered.
    pub async fn snapshot(&self, id: ProcessId) -> SupervisorResult<ProcessStatus> {
        let handle = self.require(id).await?;
        Ok(handle.record().snapshot().await)
    }

    /// Request a stop. See [`ProcessHandle::stop`].
    pub async fn stop(&self, id: ProcessId) -> SupervisorResult<()> {
        self.require(id).await?.stop()
    }

    /// Wait for a process to finish.
    ///
    /// The table lock is not held while waiting.
    pub async fn wait(&self, id: ProcessId) -> SupervisorResult<SupervisionOutcome> {
        let handle = self.require(id).await?;
        handle.wait().await
    }

    /// Ids of every registered process.
    pub async fn list(&self) -> Vec<ProcessId> {
        self.processes.lock().await.keys().copied().collect()
    }

    /// Drop finished processes from the table.
    ///
    /// # Returns
    ///
    /// The ids that were removed.
    pub async fn remove_finished(&self) -> Vec<ProcessId> {
        let mut processes = self.processes.lock().await;
        let finished: Vec<ProcessId> = processes
            .iter()
            .filter(|(_, handle)| handle.outcome().is_some())
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            processes.remove(id);
        }
        finished
    }

    /// Get the number of registered processes.
    pub async fn process_count(&self) -> usize {
        self.processes.lock().await.len()
    }

    async fn require(&self, id: ProcessId) -> SupervisorResult<ProcessHandle> {
        self.get(id)
            .await
            .ok_or(SupervisorError::UnknownProcess(id))
    }
}
