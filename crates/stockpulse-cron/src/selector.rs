//! Due-task selection for an accepted trigger.

use crate::{CronTask, UnitOfWork};

const MINUTE_MS: i64 = 60_000;

/// A task selected to run in the current pass.
#[derive(Clone)]
pub struct DueTask {
    pub id: String,
    pub name: String,
    pub(crate) work: UnitOfWork,
}

impl std::fmt::Debug for DueTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DueTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Whether enough time has passed since the task's last run at `now_ms`.
pub fn is_due(task: &CronTask, now_ms: i64) -> bool {
    match task.last_run() {
        None => true,
        Some(last) => {
            let elapsed = now_ms.saturating_sub(last);
            elapsed >= i64::from(task.interval_minutes()) * MINUTE_MS
        }
    }
}

/// Pick the tasks on the `interval_minutes` channel that should run now.
///
/// Replayed triggers mark every matching task due. Output keeps the order of
/// `tasks`.
pub fn select_due<'a>(
    tasks: impl Iterator<Item = &'a CronTask>,
    interval_minutes: u32,
    now_ms: i64,
    replay: bool,
) -> Vec<DueTask> {
    tasks
        .filter(|task| task.interval_minutes() == interval_minutes)
        .filter(|task| replay || is_due(task, now_ms))
        .map(|task| DueTask {
            id: task.id.clone(),
            name: task.name.clone(),
            work: task.work(),
        })
        .collect()
}
