//! Sequential execution of due tasks.
//!
//! Tasks run one at a time in selection order so execution records land in a
//! deterministic order and units of work never race on the local database.
//! Neither task failures (errors or panics) nor log failures leave this module.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::FutureExt;
use tracing::{error, info, warn};

use stockpulse_storage::ExecutionLogStore;
use stockpulse_types::{AppState, ExecutionDetails, TriggerOrigin};

use crate::registry::TaskRegistry;
use crate::selector::DueTask;

/// Destination for execution outcomes.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn log_execution(
        &self,
        task_name: &str,
        trigger_source: TriggerOrigin,
        app_state: AppState,
        details: ExecutionDetails,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl ExecutionLog for ExecutionLogStore {
    async fn log_execution(
        &self,
        task_name: &str,
        trigger_source: TriggerOrigin,
        app_state: AppState,
        details: ExecutionDetails,
    ) -> anyhow::Result<()> {
        self.log_task_execution(task_name, trigger_source, app_state, details)
            .await?;
        Ok(())
    }
}

/// Result of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
}

/// One task execution within a pass.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task_id: String,
    pub task_name: String,
    pub outcome: TaskOutcome,
}

/// Facts about the trigger that drive a pass.
#[derive(Debug, Clone)]
pub struct PassContext {
    /// Interval label of the trigger, used in record notes.
    pub interval: String,
    /// Catch-up delivery of a trigger queued while the app was inactive.
    pub replay: bool,
    /// Time written to `last_run` on success (the trigger's `current_time`).
    pub run_time_ms: i64,
    /// Time quoted in success notes.
    pub logged_at: DateTime<Utc>,
    pub origin: TriggerOrigin,
}

impl PassContext {
    fn app_state(&self) -> AppState {
        if self.replay {
            AppState::Background
        } else {
            AppState::Active
        }
    }

    fn success_notes(&self) -> String {
        let how = if self.replay {
            "in background"
        } else {
            "successfully"
        };
        format!(
            "{} task executed {how} at {}",
            self.interval,
            self.logged_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }

    fn failure_notes(&self, message: &str) -> String {
        format!("{} task failed: {message}", self.interval)
    }
}

/// Run `due` in order, updating `registry` and appending to `log`.
pub async fn run_due_tasks(
    registry: &mut TaskRegistry,
    due: Vec<DueTask>,
    ctx: &PassContext,
    log: &dyn ExecutionLog,
) -> Vec<TaskRun> {
    let mut runs = Vec::with_capacity(due.len());

    for task in due {
        let result = AssertUnwindSafe(async { (task.work)().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "task panicked: {}",
                    panic_message(panic.as_ref())
                ))
            });

        let outcome = match result {
            Ok(()) => {
                if !ctx.replay {
                    if let Some(entry) = registry.get_mut(&task.id) {
                        entry.mark_ran(ctx.run_time_ms);
                    }
                }
                info!(task_id = %task.id, interval = %ctx.interval, replay = ctx.replay, "Cron task completed");
                TaskOutcome::Succeeded
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(task_id = %task.id, interval = %ctx.interval, "{} task failed: {}: {message}", ctx.interval, task.name);
                TaskOutcome::Failed(message)
            }
        };

        let notes = match &outcome {
            TaskOutcome::Succeeded => ctx.success_notes(),
            TaskOutcome::Failed(message) => ctx.failure_notes(message),
        };
        if let Err(e) = log
            .log_execution(
                &task.name,
                ctx.origin,
                ctx.app_state(),
                ExecutionDetails::with_notes(notes),
            )
            .await
        {
            warn!(task_id = %task.id, "Failed to log task execution: {e:#}");
        }

        runs.push(TaskRun {
            task_id: task.id,
            task_name: task.name,
            outcome,
        });
    }

    runs
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::testing::RecordingLog;
    use super::*;
    use crate::CronTask;
    use crate::selector::select_due;

    const T: i64 = 1_700_000_000_000;

    fn ctx(replay: bool) -> PassContext {
        PassContext {
            interval: "5min".into(),
            replay,
            run_time_ms: T,
            logged_at: DateTime::from_timestamp_millis(T).unwrap(),
            origin: TriggerOrigin::Java,
        }
    }

    fn counting(id: &str, counter: Arc<AtomicU32>) -> CronTask {
        CronTask::new(id, format!("Task {id}"), 5, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_success_updates_last_run_and_logs() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut registry = TaskRegistry::new();
        registry.register(counting("a", counter.clone()));
        let log = RecordingLog::default();

        let due = select_due(registry.list(), 5, T, false);
        let runs = run_due_tasks(&mut registry, due, &ctx(false), &log).await;

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, TaskOutcome::Succeeded);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get("a").unwrap().last_run(), Some(T));

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_name, "Task a");
        assert_eq!(entries[0].trigger_source, TriggerOrigin::Java);
        assert_eq!(entries[0].app_state, AppState::Active);
        assert_eq!(
            entries[0].notes,
            "5min task executed successfully at 2023-11-14T22:13:20.000Z"
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut registry = TaskRegistry::new();
        registry.register(CronTask::new("bad", "Bad Task", 5, || async {
            anyhow::bail!("disk full")
        }));
        registry.register(counting("good", counter.clone()));
        let log = RecordingLog::default();

        let due = select_due(registry.list(), 5, T, false);
        let runs = run_due_tasks(&mut registry, due, &ctx(false), &log).await;

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].outcome, TaskOutcome::Failed("disk full".into()));
        assert_eq!(runs[1].outcome, TaskOutcome::Succeeded);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.get("bad").unwrap().last_run().is_none());
        assert_eq!(registry.get("good").unwrap().last_run(), Some(T));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].task_name, "Bad Task");
        assert_eq!(entries[0].notes, "5min task failed: disk full");
        assert!(entries[1].notes.contains("executed successfully"));
    }

    #[tokio::test]
    async fn test_panicking_task_is_recorded_as_failure() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut registry = TaskRegistry::new();
        registry.register(CronTask::new("p", "Panicky", 5, || async {
            panic!("bad index")
        }));
        registry.register(CronTask::new("q", "Formatted", 5, || async {
            panic!("row {} missing", 7)
        }));
        registry.register(counting("ok", counter.clone()));
        let log = RecordingLog::default();

        let due = select_due(registry.list(), 5, T, false);
        let runs = run_due_tasks(&mut registry, due, &ctx(false), &log).await;

        assert_eq!(runs.len(), 3);
        assert_eq!(
            runs[0].outcome,
            TaskOutcome::Failed("task panicked: bad index".into())
        );
        assert_eq!(
            runs[1].outcome,
            TaskOutcome::Failed("task panicked: row 7 missing".into())
        );
        assert_eq!(runs[2].outcome, TaskOutcome::Succeeded);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.get("p").unwrap().last_run().is_none());

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].notes, "5min task failed: task panicked: bad index");
    }

    #[tokio::test]
    async fn test_replay_does_not_touch_last_run() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut registry = TaskRegistry::new();
        registry.register(counting("a", counter.clone()));
        let log = RecordingLog::default();

        let due = select_due(registry.list(), 5, T, true);
        run_due_tasks(&mut registry, due, &ctx(true), &log).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.get("a").unwrap().last_run().is_none());
        let entries = log.entries();
        assert_eq!(entries[0].app_state, AppState::Background);
        assert!(entries[0].notes.contains("executed in background"));
    }

    #[tokio::test]
    async fn test_log_failure_does_not_stop_pass() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut registry = TaskRegistry::new();
        registry.register(counting("a", counter.clone()));
        registry.register(counting("b", counter.clone()));
        let log = RecordingLog::failing();

        let due = select_due(registry.list(), 5, T, false);
        let runs = run_due_tasks(&mut registry, due, &ctx(false), &log).await;

        assert_eq!(runs.len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get("b").unwrap().last_run(), Some(T));
    }

    #[tokio::test]
    async fn test_store_backed_log() {
        let store = ExecutionLogStore::open_in_memory().unwrap();
        let mut registry = TaskRegistry::new();
        registry.register(CronTask::new("a", "Task a", 5, || async { Ok(()) }));

        let due = select_due(registry.list(), 5, T, false);
        run_due_tasks(&mut registry, due, &ctx(false), &store).await;

        let history = store.recent_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].task_name, "Task a");
        assert_eq!(history[0].trigger_source, TriggerOrigin::Java);
    }
}
