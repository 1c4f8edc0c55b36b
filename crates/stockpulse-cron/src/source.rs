//! Trigger source abstraction.
//!
//! A trigger source turns platform-specific periodic signals into
//! [`TriggerEvent`]s. The dispatcher depends only on this trait; each
//! platform gets its own adapter (see the `stockpulse-trigger` crate).

use tokio::sync::mpsc;

use stockpulse_types::TriggerEvent;

/// Producer of periodic trigger events.
///
/// Methods take `&self`; implementations keep their running state behind
/// interior mutability.
#[async_trait::async_trait]
pub trait TriggerSource: Send + Sync {
    /// Short identifier used in logs (e.g. "native", "interval").
    fn name(&self) -> &str;

    /// Begin delivering events into `sender`.
    async fn start(&self, sender: mpsc::Sender<TriggerEvent>) -> anyhow::Result<()>;

    /// Stop delivering events and release the sender.
    async fn stop(&self) -> anyhow::Result<()>;
}
