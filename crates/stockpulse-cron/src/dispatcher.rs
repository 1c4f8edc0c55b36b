//! The dispatcher: owns the registry and gate, handles trigger events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stockpulse_types::{TaskStatus, TriggerEvent, TriggerOrigin};

use crate::builtin;
use crate::clock::{Clock, SystemClock};
use crate::executor::{self, ExecutionLog, PassContext, TaskRun};
use crate::gate::{GateDecision, TriggerGate};
use crate::registry::TaskRegistry;
use crate::selector;
use crate::source::TriggerSource;
use crate::CronTask;

const EVENT_BUFFER: usize = 64;

/// How a trigger was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassDisposition {
    /// Due tasks (possibly none) were evaluated and run.
    Completed,
    /// Duplicate inside the de-duplication window.
    Suppressed,
    /// The interval label is not a known channel.
    UnknownInterval,
    /// The dispatcher has been shut down.
    Stopped,
}

/// Summary of one trigger-handling pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub interval: String,
    pub replay: bool,
    pub disposition: PassDisposition,
    pub runs: Vec<TaskRun>,
}

impl PassReport {
    fn skipped(event: &TriggerEvent, disposition: PassDisposition) -> Self {
        Self {
            interval: event.interval.clone(),
            replay: event.is_replay(),
            disposition,
            runs: Vec::new(),
        }
    }
}

struct DispatchState {
    registry: TaskRegistry,
    gate: TriggerGate,
}

/// Trigger-driven periodic task dispatcher.
///
/// Construct one per application and hand it to whatever wires the trigger
/// source. Passes are serialized: the state lock is held from gate check to
/// the last log write, so units of work must not call back into the
/// dispatcher.
pub struct CronDispatcher {
    state: Mutex<DispatchState>,
    log: Arc<dyn ExecutionLog>,
    clock: Arc<dyn Clock>,
    origin: TriggerOrigin,
    accepting: AtomicBool,
    initialized: AtomicBool,
}

impl CronDispatcher {
    /// Create a dispatcher that records outcomes to `log`.
    pub fn new(log: Arc<dyn ExecutionLog>) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                registry: TaskRegistry::new(),
                gate: TriggerGate::default(),
            }),
            log,
            clock: Arc::new(SystemClock),
            origin: TriggerOrigin::Java,
            accepting: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    /// Use a custom process clock for the gate and log timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the duplicate-trigger window.
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.state.get_mut().gate = TriggerGate::new(window);
        self
    }

    /// Trigger origin recorded in execution records.
    pub fn with_origin(mut self, origin: TriggerOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Register the built-in tasks (when asked) and start accepting triggers.
    ///
    /// Repeated calls are no-ops until the next [`shutdown`](Self::shutdown).
    pub async fn initialize(&self, register_builtins: bool) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.accepting.store(true, Ordering::SeqCst);

        if register_builtins {
            let mut state = self.state.lock().await;
            for task in builtin::default_tasks() {
                state.registry.register(task);
            }
        }

        info!("Cron dispatcher initialized");
    }

    /// Add or replace a task.
    pub async fn register(&self, task: CronTask) {
        debug!(task_id = %task.id, interval = task.interval_minutes(), "Registering cron task");
        self.state.lock().await.registry.register(task);
    }

    /// Remove a task. Returns whether it existed.
    pub async fn unregister(&self, id: &str) -> bool {
        self.state.lock().await.registry.unregister(id)
    }

    /// Status of every registered task, in registration order.
    pub async fn task_status(&self) -> Vec<TaskStatus> {
        let state = self.state.lock().await;
        state
            .registry
            .list()
            .map(|task| {
                let last_run = task.last_run().and_then(DateTime::from_timestamp_millis);
                let next_run = task
                    .last_run()
                    .and_then(|last| {
                        last.checked_add(i64::from(task.interval_minutes()) * 60_000)
                    })
                    .and_then(DateTime::from_timestamp_millis);
                TaskStatus {
                    id: task.id.clone(),
                    name: task.name.clone(),
                    interval_minutes: task.interval_minutes(),
                    last_run,
                    next_run,
                }
            })
            .collect()
    }

    /// Handle one trigger event to completion. Never fails.
    pub async fn handle_trigger(&self, event: TriggerEvent) -> PassReport {
        if !self.accepting.load(Ordering::SeqCst) {
            debug!(interval = %event.interval, "Dispatcher stopped, ignoring trigger");
            return PassReport::skipped(&event, PassDisposition::Stopped);
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now_millis();

        let decision = state.gate.admit(&event, now);
        if let GateDecision::Suppress { since_last_ms } = decision {
            debug!(interval = %event.interval, since_last_ms, "Duplicate trigger suppressed");
            return PassReport::skipped(&event, PassDisposition::Suppressed);
        }
        let replay = decision == GateDecision::Replay;

        let Some(class) = event.interval_class() else {
            warn!("Unknown interval: {}", event.interval);
            return PassReport::skipped(&event, PassDisposition::UnknownInterval);
        };

        let due = selector::select_due(
            state.registry.list(),
            class.minutes(),
            event.current_time,
            replay,
        );
        debug!(
            interval = %event.interval,
            replay,
            due = due.len(),
            "Trigger accepted"
        );

        let logged_ms = if replay { event.current_time } else { now };
        let logged_at = DateTime::from_timestamp_millis(logged_ms).unwrap_or_else(Utc::now);

        let ctx = PassContext {
            interval: event.interval.clone(),
            replay,
            run_time_ms: event.current_time,
            logged_at,
            origin: self.origin,
        };
        let runs = executor::run_due_tasks(&mut state.registry, due, &ctx, self.log.as_ref()).await;

        PassReport {
            interval: event.interval,
            replay,
            disposition: PassDisposition::Completed,
            runs,
        }
    }

    /// Start `source` and spawn the loop that feeds its events through
    /// [`handle_trigger`](Self::handle_trigger) one at a time.
    pub async fn subscribe(
        self: &Arc<Self>,
        source: Arc<dyn TriggerSource>,
    ) -> anyhow::Result<TriggerSubscription> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        source.start(tx).await?;

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let dispatcher = self.clone();
        let source_name = source.name().to_string();

        let handle = tokio::spawn(async move {
            run_dispatch_loop(dispatcher, rx, cancel_child, source_name).await;
        });

        Ok(TriggerSubscription {
            source,
            cancel,
            handle: Some(handle),
        })
    }

    /// Stop accepting triggers, dispose `subscription` and clear the registry.
    ///
    /// An in-flight pass is allowed to finish.
    pub async fn shutdown(&self, subscription: Option<TriggerSubscription>) {
        self.accepting.store(false, Ordering::SeqCst);

        if let Some(subscription) = subscription {
            if let Err(e) = subscription.dispose().await {
                warn!("Failed to stop trigger source: {e:#}");
            }
        }

        self.state.lock().await.registry.clear();
        self.initialized.store(false, Ordering::SeqCst);
        info!("Cron dispatcher shut down");
    }
}

async fn run_dispatch_loop(
    dispatcher: Arc<CronDispatcher>,
    mut rx: mpsc::Receiver<TriggerEvent>,
    cancel: CancellationToken,
    source_name: String,
) {
    info!(source = %source_name, "Dispatch loop started");

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => {
                    info!(source = %source_name, "Trigger channel closed");
                    break;
                }
            },
        };

        let report = dispatcher.handle_trigger(event).await;
        if report.disposition == PassDisposition::Completed {
            debug!(
                interval = %report.interval,
                ran = report.runs.len(),
                "Trigger pass completed"
            );
        }
    }

    info!(source = %source_name, "Dispatch loop stopped");
}

/// Live connection between a trigger source and a dispatcher.
///
/// Dispose it explicitly; dropping it leaves the source running.
pub struct TriggerSubscription {
    source: Arc<dyn TriggerSource>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TriggerSubscription {
    /// Resolves once the dispatch loop exits (source closed or disposed).
    pub async fn finished(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            let _ = handle.await;
            self.handle = None;
        }
    }

    /// Stop the source, then end the dispatch loop after any in-flight pass.
    pub async fn dispose(mut self) -> anyhow::Result<()> {
        let stopped = self.source.stop().await;
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        stopped
    }
}
