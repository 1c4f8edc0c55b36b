//! `stockpulse run`: wires the execution log, dispatcher and trigger source.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use stockpulse_config::{StockPulseConfig, TriggerMode};
use stockpulse_cron::{CronDispatcher, TriggerSource};
use stockpulse_storage::ExecutionLogStore;
use stockpulse_trigger::{IntervalFallbackSource, NativeBridgeSource};
use stockpulse_types::TriggerOrigin;

/// Open the execution log, creating its parent directory if needed.
pub fn open_store(config: &StockPulseConfig) -> anyhow::Result<ExecutionLogStore> {
    let db_path = config.ensure_db_path()?;
    Ok(ExecutionLogStore::open(&db_path)?)
}

/// Origin recorded for executions driven by `mode`.
fn trigger_origin(mode: TriggerMode) -> TriggerOrigin {
    match mode {
        TriggerMode::Native => TriggerOrigin::Java,
        TriggerMode::Interval => TriggerOrigin::Javascript,
    }
}

pub async fn run_dispatcher(config: StockPulseConfig) -> anyhow::Result<()> {
    let store = Arc::new(open_store(&config)?);
    let dispatcher = Arc::new(
        CronDispatcher::new(store)
            .with_dedup_window(Duration::from_secs(config.cron.dedup_window_secs))
            .with_origin(trigger_origin(config.trigger.mode)),
    );
    dispatcher
        .initialize(config.cron.register_builtin_tasks)
        .await;

    for status in dispatcher.task_status().await {
        info!(
            task_id = %status.id,
            name = %status.name,
            interval_minutes = status.interval_minutes,
            "Registered cron task"
        );
    }

    let mut subscription = match config.trigger.mode {
        TriggerMode::Native => {
            let bridge = Arc::new(NativeBridgeSource::new());
            let subscription = dispatcher.subscribe(bridge.clone()).await?;
            // Detached: a stdin that stays open must not keep the process alive.
            if let Err(e) = bridge.clone().spawn_reader(
                std::io::BufReader::new(std::io::stdin()),
                tokio::runtime::Handle::current(),
            ) {
                warn!("Failed to start trigger reader: {e}");
                bridge.stop().await?;
            }
            subscription
        }
        TriggerMode::Interval => {
            let source = Arc::new(IntervalFallbackSource::new(Duration::from_secs(
                config.trigger.tick_secs,
            )));
            dispatcher.subscribe(source).await?
        }
    };

    info!(mode = ?config.trigger.mode, "Dispatcher running");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for interrupt: {e}");
            }
            info!("Interrupt received, shutting down");
        }
        _ = subscription.finished() => {
            info!("Trigger source closed, shutting down");
        }
    }

    for status in dispatcher.task_status().await {
        match status.last_run {
            Some(last) => info!(task_id = %status.id, last_run = %last, "Task status"),
            None => info!(task_id = %status.id, "Task status: never run"),
        }
    }

    dispatcher.shutdown(Some(subscription)).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_follows_trigger_mode() {
        assert_eq!(trigger_origin(TriggerMode::Native), TriggerOrigin::Java);
        assert_eq!(
            trigger_origin(TriggerMode::Interval),
            TriggerOrigin::Javascript
        );
    }

    #[tokio::test]
    async fn test_open_store_creates_parent_dir() {
        let root = std::env::temp_dir().join(format!("stockpulse-cli-{}", std::process::id()));
        let mut config = StockPulseConfig::default();
        config.storage.db_path = Some(root.join("logs").join("stockpulse.db"));

        let store = open_store(&config).unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(root.join("logs").join("stockpulse.db").exists());

        drop(store);
        std::fs::remove_dir_all(&root).unwrap();
    }
}
