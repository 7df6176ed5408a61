//! Status channel reader.
//!
//! Reads the child's status descriptor line by line, decodes each line and
//! forwards the resulting events to the supervision task. Every line,
//! decodable or not, refreshes the watchdog. Only progress lines change
//! the deadline length.

use crate::status::parse_status_line;
use crate::supervisor::policy::HeartbeatPolicy;
use crate::supervisor::watchdog::WatchdogHandle;
use paws_protocol::status_models::StatusEvent;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How the reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The descriptor was closed, normally because the child exited.
    EndOfStream,

    /// Reading failed. Treated like end of stream by the supervisor.
    Failed(String),

    /// The event receiver went away before the stream ended.
    Detached,
}

/// Spawns the task that drains a status descriptor.
pub struct StatusChannelReader;

impl StatusChannelReader {
    /// Start reading `source` on a new task.
    ///
    /// # Arguments
    ///
    /// * `source` - Read end of the status descriptor
    /// * `policy` - Maps each event to the next heartbeat deadline
    /// * `watchdog` - Refreshed once per line
    /// * `events` - Receives one [`StatusEvent`] per line
    ///
    /// # Returns
    ///
    /// A handle that resolves when the stream ends.
    pub fn spawn<R>(
        source: R,
        policy: HeartbeatPolicy,
        watchdog: WatchdogHandle,
        events: mpsc::Sender<StatusEvent>,
    ) -> JoinHandle<ReaderExit>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(read_status_lines(source, policy, watchdog, events))
    }
}

async fn read_status_lines<R>(
    source: R,
    policy: HeartbeatPolicy,
    watchdog: WatchdogHandle,
    events: mpsc::Sender<StatusEvent>,
) -> ReaderExit
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        // `read_until` keeps partial data buffered until the newline
        // arrives, so a line split across writes is decoded once.
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return ReaderExit::EndOfStream,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "status channel read failed");
                return ReaderExit::Failed(e.to_string());
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        tracing::debug!(line, "status line");

        let event = match parse_status_line(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, line, "ignoring malformed status line");
                StatusEvent::Unrecognized {
                    line: line.to_string(),
                }
            }
        };

        let refreshed = match policy.deadline_after(&event) {
            Some(deadline) => {
                let refreshed = watchdog.refresh(deadline).await;
                if refreshed {
                    tracing::trace!(deadline_ms = deadline.as_millis() as u64, "watchdog refreshed");
                }
                refreshed
            }
            None => watchdog.heartbeat().await,
        };
        if !refreshed {
            tracing::debug!("status line arrived after the watchdog stopped");
        }

        if events.send(event).await.is_err() {
            return ReaderExit::Detached;
        }
    }
}
