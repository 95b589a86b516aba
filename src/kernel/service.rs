//! Service lifecycle traits.

use async_trait::async_trait;
use tokio::sync::watch;

use super::App;

/// A named unit with a boot and close step.
///
/// `boot` runs once, in registration order, before any runner starts.
/// `close` runs in reverse registration order and should tolerate being
/// called after a failed boot.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    async fn boot(&self, app: &App) -> anyhow::Result<()>;

    async fn close(&self, app: &App) -> anyhow::Result<()>;
}

/// A long-running service.
#[async_trait]
pub trait Runner: Service {
    /// Runs until `shutdown` fires or an unrecoverable error occurs.
    async fn run(&self, app: &App, shutdown: Shutdown) -> anyhow::Result<()>;
}

/// Creates a linked shutdown trigger and listener.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Fires the shutdown signal for every cloned [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new listener tied to this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Listener half of a shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns true once shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until shutdown is requested. Returns immediately if it already
    /// was, or if the trigger was dropped.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}
