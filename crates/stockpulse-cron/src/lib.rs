//! stockpulse-cron: Trigger-driven periodic task dispatcher.
//!
//! External trigger sources fire on coarse interval channels ("1min",
//! "5min", ...). Each event passes through a per-channel de-duplication
//! gate, the registered tasks whose interval matches and has elapsed are
//! selected, and those tasks run one after another with every outcome
//! appended to the execution log.
//!
//! ```text
//! TriggerSource ──(TriggerEvent via mpsc)──> CronDispatcher
//!     TriggerGate ─> selector::select_due ─> executor::run_due_tasks ─> ExecutionLog
//! ```

pub mod builtin;
pub mod clock;
pub mod dispatcher;
pub mod executor;
pub mod gate;
pub mod registry;
pub mod selector;
pub mod source;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use dispatcher::{CronDispatcher, PassDisposition, PassReport, TriggerSubscription};
pub use executor::{ExecutionLog, TaskOutcome, TaskRun};
pub use source::TriggerSource;

/// Future returned by a unit of work.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Async, side-effecting action run when a task is due.
pub type UnitOfWork = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// A recurring task known to the dispatcher.
#[derive(Clone)]
pub struct CronTask {
    /// Stable identifier; registering the same id again replaces the task.
    pub id: String,
    /// Label used in logs and execution records.
    pub name: String,
    interval_minutes: u32,
    last_run: Option<i64>,
    work: UnitOfWork,
}

impl CronTask {
    /// Create a task that has never run. An interval of zero is raised to one minute.
    pub fn new<F, Fut>(
        id: impl Into<String>,
        name: impl Into<String>,
        interval_minutes: u32,
        work: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let work: UnitOfWork = Arc::new(move || -> TaskFuture { Box::pin(work()) });
        Self {
            id: id.into(),
            name: name.into(),
            interval_minutes: interval_minutes.max(1),
            last_run: None,
            work,
        }
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    /// Epoch millis of the last successful live run.
    pub fn last_run(&self) -> Option<i64> {
        self.last_run
    }

    /// Record a successful run. Never moves `last_run` backwards.
    pub(crate) fn mark_ran(&mut self, at_ms: i64) {
        self.last_run = Some(self.last_run.map_or(at_ms, |prev| prev.max(at_ms)));
    }

    pub(crate) fn work(&self) -> UnitOfWork {
        self.work.clone()
    }
}

impl fmt::Debug for CronTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interval_minutes", &self.interval_minutes)
            .field("last_run", &self.last_run)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_is_raised() {
        let task = CronTask::new("t", "T", 0, || async { Ok(()) });
        assert_eq!(task.interval_minutes(), 1);
        assert!(task.last_run().is_none());
    }

    #[test]
    fn test_mark_ran_is_monotonic() {
        let mut task = CronTask::new("t", "T", 5, || async { Ok(()) });
        task.mark_ran(10_000);
        task.mark_ran(5_000);
        assert_eq!(task.last_run(), Some(10_000));
        task.mark_ran(20_000);
        assert_eq!(task.last_run(), Some(20_000));
    }

    #[tokio::test]
    async fn test_unit_of_work_runs() {
        let task = CronTask::new("t", "T", 1, || async { anyhow::bail!("boom") });
        let err = (task.work())().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
