//! Maintenance tasks registered at startup, one per interval channel.

use tracing::info;

use crate::CronTask;

/// The built-in task set.
pub fn default_tasks() -> Vec<CronTask> {
    vec![
        CronTask::new("heartbeat_sync", "1 Minute Task", 1, || async {
            info!(task_id = "heartbeat_sync", "App status check");
            Ok(())
        }),
        CronTask::new("local_backup", "5 Minute Task", 5, || async {
            info!(task_id = "local_backup", "Local user data backup");
            Ok(())
        }),
        CronTask::new("inventory_sync", "15 Minute Task", 15, || async {
            info!(task_id = "inventory_sync", "Inventory sync and validation");
            Ok(())
        }),
        CronTask::new("health_analytics", "30 Minute Task", 30, || async {
            info!(task_id = "health_analytics", "System health and usage metrics");
            Ok(())
        }),
        CronTask::new("database_maintenance", "60 Minute Task", 60, || async {
            info!(task_id = "database_maintenance", "Database maintenance and cleanup");
            Ok(())
        }),
    ]
}
