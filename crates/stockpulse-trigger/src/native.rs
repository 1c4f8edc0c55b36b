//! Bridge for trigger payloads delivered by the host platform.

use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use stockpulse_cron::TriggerSource;
use stockpulse_types::TriggerEvent;

/// Accepts raw JSON trigger payloads and forwards them as [`TriggerEvent`]s.
///
/// The host calls [`deliver`](Self::deliver) for each platform event; nothing
/// is forwarded before [`start`](TriggerSource::start) or after
/// [`stop`](TriggerSource::stop).
#[derive(Default)]
pub struct NativeBridgeSource {
    sender: Mutex<Option<mpsc::Sender<TriggerEvent>>>,
}

impl NativeBridgeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and forward one payload. Returns whether it was forwarded.
    ///
    /// Malformed payloads are logged and dropped.
    pub async fn deliver(&self, payload: &str) -> bool {
        let event: TriggerEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to parse trigger data: {e}");
                return false;
            }
        };

        let Some(sender) = self.sender.lock().await.clone() else {
            debug!(interval = %event.interval, "Native bridge not started, dropping trigger");
            return false;
        };

        debug!(
            interval = %event.interval,
            replay = event.is_replay(),
            reported_at = ?event.timestamp.to_datetime(),
            "Native cron trigger received"
        );
        sender.send(event).await.is_ok()
    }

    /// Deliver one payload per non-empty line of `reader` on a dedicated thread,
    /// then stop the bridge once `reader` is exhausted.
    ///
    /// The thread does not belong to `runtime`, so a reader that never reaches
    /// EOF (an open stdin) does not hold up runtime shutdown. The join handle
    /// yields the number of payloads forwarded.
    pub fn spawn_reader<R>(
        self: Arc<Self>,
        reader: R,
        runtime: Handle,
    ) -> std::io::Result<JoinHandle<usize>>
    where
        R: BufRead + Send + 'static,
    {
        std::thread::Builder::new()
            .name("trigger-reader".into())
            .spawn(move || {
                let mut forwarded = 0;
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("Failed to read trigger input: {e}");
                            break;
                        }
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if runtime.block_on(self.deliver(line)) {
                        forwarded += 1;
                    }
                }

                info!(forwarded, "Trigger input exhausted");
                if let Err(e) = runtime.block_on(self.stop()) {
                    warn!("Failed to stop native bridge: {e:#}");
                }
                forwarded
            })
    }
}

#[async_trait::async_trait]
impl TriggerSource for NativeBridgeSource {
    fn name(&self) -> &str {
        "native"
    }

    async fn start(&self, sender: mpsc::Sender<TriggerEvent>) -> anyhow::Result<()> {
        let mut slot = self.sender.lock().await;
        if slot.is_some() {
            anyhow::bail!("native trigger bridge is already running");
        }
        *slot = Some(sender);
        info!("Native trigger bridge started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if self.sender.lock().await.take().is_some() {
            info!("Native trigger bridge stopped");
        }
        Ok(())
    }
}
