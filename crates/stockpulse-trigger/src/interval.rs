//! Timer-based fallback trigger source.
//!
//! Emits the same schedule as the native minute service: every tick a
//! "1min" trigger, plus "5min", "15min", "30min" and "60min" triggers on
//! ticks divisible by those counts.

use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use stockpulse_cron::TriggerSource;
use stockpulse_types::{IntervalClass, TriggerEvent};

/// Triggers due on the `minute_count`-th tick (1-based).
pub fn triggers_for_minute(minute_count: u64, now_ms: i64) -> Vec<TriggerEvent> {
    IntervalClass::ALL
        .into_iter()
        .filter_map(|class| {
            let period = u64::from(class.minutes());
            (minute_count > 0 && minute_count % period == 0)
                .then(|| TriggerEvent::live(class, minute_count / period, minute_count, now_ms))
        })
        .collect()
}

struct IntervalState {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// In-process ticker used when the platform has no native trigger service.
pub struct IntervalFallbackSource {
    tick: Duration,
    state: Mutex<IntervalState>,
}

impl IntervalFallbackSource {
    /// Create a source ticking every `tick` (one "minute" of the schedule).
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
            state: Mutex::new(IntervalState {
                cancel: None,
                handle: None,
            }),
        }
    }
}

#[async_trait::async_trait]
impl TriggerSource for IntervalFallbackSource {
    fn name(&self) -> &str {
        "interval"
    }

    async fn start(&self, sender: mpsc::Sender<TriggerEvent>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.handle.is_some() {
            anyhow::bail!("interval trigger source is already running");
        }

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let tick = self.tick;

        let handle = tokio::spawn(async move {
            run_ticker(tick, sender, cancel_child).await;
        });

        state.cancel = Some(cancel);
        state.handle = Some(handle);
        info!(tick_ms = tick.as_millis() as u64, "Interval trigger source started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;

        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }

        if let Some(handle) = state.handle.take() {
            let _ = handle.await;
        }

        Ok(())
    }
}

async fn run_ticker(tick: Duration, sender: mpsc::Sender<TriggerEvent>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut minute_count: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {},
        }

        minute_count += 1;
        let now_ms = chrono::Utc::now().timestamp_millis();
        debug!(minute_count, "Checking triggers");

        for event in triggers_for_minute(minute_count, now_ms) {
            if sender.send(event).await.is_err() {
                info!("Trigger channel closed, stopping interval source");
                return;
            }
        }
    }

    info!("Interval trigger source stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(minute: u64) -> Vec<String> {
        triggers_for_minute(minute, 0)
            .into_iter()
            .map(|e| e.interval)
            .collect()
    }

    #[test]
    fn test_schedule() {
        assert_eq!(labels(1), vec!["1min"]);
        assert_eq!(labels(5), vec!["1min", "5min"]);
        assert_eq!(labels(15), vec!["1min", "5min", "15min"]);
        assert_eq!(labels(30), vec!["1min", "5min", "15min", "30min"]);
        assert_eq!(labels(60), vec!["1min", "5min", "15min", "30min", "60min"]);
        assert_eq!(labels(7), vec!["1min"]);
        assert!(labels(0).is_empty());
    }

    #[test]
    fn test_counts() {
        let events = triggers_for_minute(30, 42);
        let thirty = events.iter().find(|e| e.interval == "30min").unwrap();
        assert_eq!(thirty.interval_count, 1);
        assert_eq!(thirty.total_minutes, 30);
        assert_eq!(thirty.current_time, 42);
        let five = events.iter().find(|e| e.interval == "5min").unwrap();
        assert_eq!(five.interval_count, 6);
    }

    #[tokio::test]
    async fn test_emits_and_stops() {
        let source = IntervalFallbackSource::new(Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(16);
        source.start(tx).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("ticker should fire")
            .unwrap();
        assert_eq!(first.interval, "1min");
        assert_eq!(first.total_minutes, 1);

        tokio::time::timeout(Duration::from_secs(2), source.stop())
            .await
            .expect("stop should complete promptly")
            .unwrap();

        // The ticker owned the only sender, so the channel drains and closes.
        while rx.recv().await.is_some() {}
    }
}
