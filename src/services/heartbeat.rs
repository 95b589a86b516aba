//! A runner that periodically logs a message read from configuration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ConfigManager;
use crate::error::ConfigError;
use crate::kernel::{App, Runner, Service, Shutdown};

/// Config namespace read on every tick.
pub const NAMESPACE: &str = "heartbeat";

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MESSAGE: &str = "alive";

/// Settings from the `heartbeat` namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub message: String,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

impl HeartbeatSettings {
    /// Reads the current settings. A missing namespace or key falls back to
    /// the default; a zero interval is treated as unset.
    pub fn from_config(config: &ConfigManager) -> Result<Self, ConfigError> {
        let namespace = match config.get(NAMESPACE) {
            Ok(namespace) => namespace,
            Err(e) if e.is_not_found() => return Ok(Self::default()),
            Err(e) => return Err(e),
        };

        let interval = namespace
            .get_duration("interval")
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_INTERVAL);
        let message = namespace
            .get_string("message")
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        Ok(Self { interval, message })
    }
}

/// Logs `heartbeat.message` every `heartbeat.interval` until shutdown.
///
/// Settings are re-read on every tick, so a hot reload takes effect on the
/// next beat without restarting the service.
#[derive(Debug, Default)]
pub struct Heartbeat {
    beats: AtomicU64,
    reloads: Arc<AtomicU64>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of beats logged so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    /// Number of config reloads observed since boot.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Service for Heartbeat {
    fn name(&self) -> &str {
        NAMESPACE
    }

    async fn boot(&self, app: &App) -> anyhow::Result<()> {
        let settings = HeartbeatSettings::from_config(app.config())?;
        info!(interval = ?settings.interval, message = %settings.message, "Heartbeat configured");

        let reloads = Arc::clone(&self.reloads);
        app.config().on_reload(move |config| {
            let settings = HeartbeatSettings::from_config(config)?;
            reloads.fetch_add(1, Ordering::Relaxed);
            info!(interval = ?settings.interval, message = %settings.message, "Heartbeat settings reloaded");
            Ok(())
        });
        Ok(())
    }

    async fn close(&self, _app: &App) -> anyhow::Result<()> {
        info!(beats = self.beats(), "Heartbeat stopped");
        Ok(())
    }
}

#[async_trait]
impl Runner for Heartbeat {
    async fn run(&self, app: &App, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let log = app.logger().get(NAMESPACE)?;

        loop {
            let settings = match HeartbeatSettings::from_config(app.config()) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(error = %e, "Failed to read heartbeat settings, using defaults");
                    HeartbeatSettings::default()
                }
            };

            let beat = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
            log.info(&format!("{} (beat {beat})", settings.message));
            debug!(beat, interval = ?settings.interval, "Heartbeat");

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(settings.interval) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::shutdown_channel;
    use std::fs;
    use tempfile::TempDir;

    fn project(heartbeat: Option<&str>) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("conf")).unwrap();
        if let Some(body) = heartbeat {
            fs::write(dir.path().join("conf/heartbeat.yaml"), body).unwrap();
        }
        dir
    }

    #[test]
    fn test_settings_default_when_missing() {
        let dir = project(None);
        let config = ConfigManager::new(dir.path().join("conf")).unwrap();

        assert_eq!(
            HeartbeatSettings::from_config(&config).unwrap(),
            HeartbeatSettings::default()
        );
    }

    #[test]
    fn test_settings_read_from_namespace() {
        let dir = project(Some("heartbeat:\n  interval: 250ms\n  message: tick\n"));
        let config = ConfigManager::new(dir.path().join("conf")).unwrap();

        let settings = HeartbeatSettings::from_config(&config).unwrap();
        assert_eq!(settings.interval, Duration::from_millis(250));
        assert_eq!(settings.message, "tick");
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let dir = project(Some("heartbeat:\n  interval: 0\n"));
        let config = ConfigManager::new(dir.path().join("conf")).unwrap();

        let settings = HeartbeatSettings::from_config(&config).unwrap();
        assert_eq!(settings.interval, DEFAULT_INTERVAL);
        assert_eq!(settings.message, DEFAULT_MESSAGE);
    }

    #[tokio::test]
    async fn test_beats_until_shutdown_and_tracks_reloads() {
        let dir = project(Some("heartbeat:\n  interval: 10ms\n"));
        let heartbeat = Arc::new(Heartbeat::new());
        let app = App::builder().root(dir.path()).build().unwrap();

        heartbeat.boot(&app).await.unwrap();
        assert_eq!(app.config().reload_callback_count(), 1);

        let (trigger, shutdown) = shutdown_channel();
        let runner = Arc::clone(&heartbeat);
        let run = runner.run(&app, shutdown);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            trigger.fire();
        };
        let (result, ()) = tokio::join!(run, stop);
        result.unwrap();
        assert!(heartbeat.beats() >= 2);

        app.config().reload().unwrap();
        assert_eq!(heartbeat.reloads(), 1);
    }
}
