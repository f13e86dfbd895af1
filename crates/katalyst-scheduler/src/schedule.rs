//! Schedule configuration and the cancellation handle returned to callers
//! (spec §4.7).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::SchedulerError;

/// A unit of repeatable work. Returns `Err` to signal a failed execution;
/// the scheduler never inspects the error beyond logging and invoking
/// `on_error`.
pub type Task = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

pub type OnSuccess = Arc<dyn Fn(&str, u64, Duration) + Send + Sync>;
pub type OnError = Arc<dyn Fn(&str, &SchedulerError, u64) + Send + Sync>;

/// Per-schedule configuration shared by all three scheduling modes.
#[derive(Clone)]
pub struct ScheduleConfig {
    pub name: String,
    /// Wall-clock bound on a single execution. `None` means unbounded.
    pub max_execution_time: Option<Duration>,
    pub on_success: Option<OnSuccess>,
    pub on_error: Option<OnError>,
}

impl fmt::Debug for ScheduleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleConfig")
            .field("name", &self.name)
            .field("max_execution_time", &self.max_execution_time)
            .finish()
    }
}

impl ScheduleConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_execution_time: None,
            on_success: None,
            on_error: None,
        }
    }

    pub fn with_max_execution_time(mut self, timeout: Duration) -> Self {
        self.max_execution_time = Some(timeout);
        self
    }

    pub fn with_on_success(mut self, hook: OnSuccess) -> Self {
        self.on_success = Some(hook);
        self
    }

    pub fn with_on_error(mut self, hook: OnError) -> Self {
        self.on_error = Some(hook);
        self
    }
}

/// Handle to a running schedule. Cancellation stops the loop at its next
/// suspension point; a run already in flight is allowed to complete.
pub struct ScheduleHandle {
    name: String,
    cancel_tx: watch::Sender<bool>,
    join: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleHandle {
    pub(crate) fn new(name: String, cancel_tx: watch::Sender<bool>, join: JoinHandle<()>) -> Arc<Self> {
        Arc::new(Self {
            name,
            cancel_tx,
            join: parking_lot::Mutex::new(Some(join)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idempotent: cancelling an already-cancelled handle is a no-op.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Waits for the schedule's loop task to exit, which happens only after
    /// cancellation and completion of any in-flight run.
    pub async fn join(&self) {
        let handle = self.join.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

pub(crate) fn cancellation_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
