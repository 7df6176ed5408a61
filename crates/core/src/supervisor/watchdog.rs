//! Heartbeat watchdog.
//!
//! A watchdog fires once unless it is refreshed before its deadline or
//! cancelled. Firing is latched: after it fires, `refresh`, `heartbeat`
//! and `cancel` report `false` and change nothing.
//!
//! The watchdog remembers the length of the last deadline it was given.
//! A `heartbeat` restarts the countdown with that same length.

use crate::supervisor::policy::MAX_DEADLINE;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Current state of a watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    /// Counting down to the current deadline.
    Armed,
    /// The deadline passed. Terminal.
    Fired,
    /// Stopped before the deadline. Terminal.
    Cancelled,
}

#[derive(Debug)]
struct Timer {
    phase: WatchdogPhase,
    deadline: Instant,
    period: Duration,
}

#[derive(Debug)]
struct Shared {
    timer: Mutex<Timer>,
    wake: Notify,
}

impl Shared {
    async fn refresh(&self, deadline: Option<Duration>) -> bool {
        let mut timer = self.timer.lock().await;
        if timer.phase != WatchdogPhase::Armed {
            return false;
        }

        let now = Instant::now();
        if now >= timer.deadline {
            // Already overdue; let the timer task fire.
            self.wake.notify_one();
            return false;
        }

        if let Some(deadline) = deadline {
            timer.period = deadline;
        }
        timer.deadline = deadline_from(now, timer.period);
        self.wake.notify_one();
        true
    }

    async fn cancel(&self) -> bool {
        let mut timer = self.timer.lock().await;
        if timer.phase != WatchdogPhase::Armed {
            return false;
        }
        timer.phase = WatchdogPhase::Cancelled;
        self.wake.notify_one();
        true
    }

    async fn phase(&self) -> WatchdogPhase {
        self.timer.lock().await.phase
    }
}

fn deadline_from(now: Instant, after: Duration) -> Instant {
    now + after.min(MAX_DEADLINE)
}

/// Owning side of a watchdog. Only the owner can wait for expiry.
///
/// Dropping the owner stops the timer task.
#[derive(Debug)]
pub struct Watchdog {
    shared: Arc<Shared>,
    fired: Option<oneshot::Receiver<()>>,
    has_fired: bool,
    task: JoinHandle<()>,
}

/// Cloneable refresh/cancel access to a [`Watchdog`].
#[derive(Debug, Clone)]
pub struct WatchdogHandle {
    shared: Arc<Shared>,
}

impl Watchdog {
    /// Start a watchdog that fires after `deadline` unless refreshed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(deadline: Duration) -> Self {
        let shared = Arc::new(Shared {
            timer: Mutex::new(Timer {
                phase: WatchdogPhase::Armed,
                deadline: deadline_from(Instant::now(), deadline),
                period: deadline,
            }),
            wake: Notify::new(),
        });
        let (fired_tx, fired_rx) = oneshot::channel();
        let task = tokio::spawn(run_timer(Arc::clone(&shared), fired_tx));

        Self {
            shared,
            fired: Some(fired_rx),
            has_fired: false,
            task,
        }
    }

    pub fn handle(&self) -> WatchdogHandle {
        WatchdogHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Replace the outstanding deadline with `deadline` from now.
    ///
    /// # Returns
    ///
    /// `false` if the watchdog already fired, was cancelled, or its
    /// deadline has passed.
    pub async fn refresh(&self, deadline: Duration) -> bool {
        self.shared.refresh(Some(deadline)).await
    }

    /// Restart the countdown with the current deadline length.
    ///
    /// Same latching rules as [`refresh`](Self::refresh).
    pub async fn heartbeat(&self) -> bool {
        self.shared.refresh(None).await
    }

    /// Stop the watchdog for good. Returns `false` if it already fired.
    pub async fn cancel(&self) -> bool {
        self.shared.cancel().await
    }

    pub async fn phase(&self) -> WatchdogPhase {
        self.shared.phase().await
    }

    /// Resolve once the watchdog fires.
    ///
    /// Returns immediately on every call after the first firing. Never
    /// resolves for a cancelled watchdog. Safe to use in `tokio::select!`.
    pub async fn expired(&mut self) {
        if self.has_fired {
            return;
        }
        if let Some(fired) = self.fired.as_mut() {
            let result = fired.await;
            self.fired = None;
            if result.is_ok() {
                self.has_fired = true;
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl WatchdogHandle {
    /// See [`Watchdog::refresh`].
    pub async fn refresh(&self, deadline: Duration) -> bool {
        self.shared.refresh(Some(deadline)).await
    }

    /// See [`Watchdog::heartbeat`].
    pub async fn heartbeat(&self) -> bool {
        self.shared.refresh(None).await
    }

    /// See [`Watchdog::cancel`].
    pub async fn cancel(&self) -> bool {
        self.shared.cancel().await
    }

    pub async fn phase(&self) -> WatchdogPhase {
        self.shared.phase().await
    }
}

async fn run_timer(shared: Arc<Shared>, fired: oneshot::Sender<()>) {
    loop {
        let deadline = {
            let mut timer = shared.timer.lock().await;
            if timer.phase != WatchdogPhase::Armed {
                return;
            }
            if Instant::now() >= timer.deadline {
                timer.phase = WatchdogPhase::Fired;
                tracing::debug!("watchdog fired");
                let _ = fired.send(());
                return;
            }
            timer.deadline
        };

        tokio::select! {
            _ = time::sleep_until(deadline) => {}
            _ = shared.wake.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_deadline() {
        let mut watchdog = Watchdog::start(Duration::from_secs(2));
        let started = Instant::now();

        watchdog.expired().await;

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(watchdog.phase().await, WatchdogPhase::Fired);
        // Latched: later calls resolve at once.
        watchdog.expired().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_postpones_expiry() {
        let mut watchdog = Watchdog::start(Duration::from_secs(2));
        let handle = watchdog.handle();

        for _ in 0..5 {
            time::sleep(Duration::from_millis(1500)).await;
            assert!(handle.refresh(Duration::from_secs(2)).await);
        }
        assert_eq!(watchdog.phase().await, WatchdogPhase::Armed);

        let started = Instant::now();
        watchdog.expired().await;
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_can_shorten_deadline() {
        let mut watchdog = Watchdog::start(Duration::from_secs(300));
        assert!(watchdog.refresh(Duration::from_millis(10)).await);

        let result = time::timeout(Duration::from_secs(1), watchdog.expired()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let mut watchdog = Watchdog::start(Duration::from_millis(100));
        assert!(watchdog.cancel().await);
        assert!(!watchdog.cancel().await);

        let result = time::timeout(Duration::from_secs(10), watchdog.expired()).await;
        assert!(result.is_err());
        assert_eq!(watchdog.phase().await, WatchdogPhase::Cancelled);
        assert!(!watchdog.refresh(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_fire_is_noop() {
        let mut watchdog = Watchdog::start(Duration::from_millis(5));
        let handle = watchdog.handle();
        watchdog.expired().await;

        assert!(!handle.refresh(Duration::from_secs(60)).await);
        assert!(!handle.cancel().await);
        assert_eq!(handle.phase().await, WatchdogPhase::Fired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_current_length() {
        let mut watchdog = Watchdog::start(Duration::from_secs(2));
        let handle = watchdog.handle();
        assert!(handle.refresh(Duration::from_secs(300)).await);

        time::sleep(Duration::from_secs(10)).await;
        assert!(handle.heartbeat().await);

        // Well past the 2s it started with, still inside the 300s period.
        let result = time::timeout(Duration::from_secs(250), watchdog.expired()).await;
        assert!(result.is_err());
        assert_eq!(handle.phase().await, WatchdogPhase::Armed);

        let started = Instant::now();
        watchdog.expired().await;
        assert!(started.elapsed() >= Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_when_overdue_but_not_yet_fired() {
        let mut watchdog = Watchdog::start(Duration::from_secs(60));
        let handle = watchdog.handle();

        // The deadline passes while the timer task has not run yet, so the
        // phase still reads `Armed`.
        watchdog.shared.timer.lock().await.deadline = Instant::now();
        assert_eq!(handle.phase().await, WatchdogPhase::Armed);

        assert!(!handle.refresh(Duration::from_secs(60)).await);
        assert!(!handle.heartbeat().await);

        let result = time::timeout(Duration::from_secs(1), watchdog.expired()).await;
        assert!(result.is_ok());
        assert_eq!(handle.phase().await, WatchdogPhase::Fired);
    }
}
