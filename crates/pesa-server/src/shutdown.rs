//! Relay shutdown: one cancellation token plus a registry of named tasks.
//!
//! Sessions, the hub loop and the listener all watch the root token. The
//! long-lived tasks are tracked by name so a drain can report which ones
//! stopped on their own and which had to be aborted.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default time allowed for tracked tasks to finish after cancellation.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of [`ShutdownCoordinator::graceful_shutdown`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that returned before the deadline.
    pub completed: Vec<&'static str>,
    /// Tasks that panicked or were cancelled elsewhere.
    pub failed: Vec<&'static str>,
    /// Tasks still running at the deadline, now aborted.
    pub aborted: Vec<&'static str>,
}

impl ShutdownReport {
    /// Every tracked task stopped on its own.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_empty()
    }
}

/// Owns the relay's root cancellation token and its long-lived tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the root cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Track `handle` under `name` so the next drain waits for it.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name, handle));
    }

    /// Number of tasks awaiting a drain.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel the root token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the root token has been cancelled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the root token, then wait until `timeout` for every tracked
    /// task. Stragglers are aborted. Tasks tracked after this call starts are
    /// left for a later drain.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> ShutdownReport {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(
            tasks = tasks.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining relay tasks"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        let mut report = ShutdownReport::default();
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.completed.push(name),
                Ok(Err(e)) => {
                    error!(task = name, error = %e, "task ended abnormally");
                    report.failed.push(name);
                }
                Err(_) => {
                    warn!(task = name, "task still running at shutdown deadline, aborting");
                    handle.abort();
                    report.aborted.push(name);
                }
            }
        }
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            aborted = report.aborted.len(),
            "relay tasks drained"
        );
        report
    }
}
