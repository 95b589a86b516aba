//! The application: service container plus config and logging.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{error, info, warn};

use super::container::Container;
use super::service::{shutdown_channel, Runner, Service, Shutdown};
use crate::config::ConfigManager;
use crate::error::KernelError;
use crate::logging::{LogConfig, LogManager, Logger};
use crate::project;

/// Framework name reported at startup.
pub const NAME: &str = "appkernel";

/// Framework version reported at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time allowed for services to close before shutdown gives up.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the framework's own logger.
const APP_LOGGER: &str = "app";

/// Configuration namespace decoded into [`LogConfig`].
const LOG_NAMESPACE: &str = "log";

/// A booted set of services sharing configuration and logging.
pub struct App {
    root: PathBuf,
    container: Container,
    config: Arc<ConfigManager>,
    logger: Arc<LogManager>,
    shutdown_timeout: Duration,
}

impl App {
    /// Starts building an application.
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    pub fn logger(&self) -> &Arc<LogManager> {
        &self.logger
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns a service by name as its concrete type.
    pub fn service<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, KernelError> {
        self.container.get_as(name)
    }

    /// Boots every service in registration order, stopping at the first
    /// failure.
    pub async fn boot(&self) -> Result<(), KernelError> {
        let log = self.app_log()?;
        let services = self.container.services();

        log.info(&format!(
            "framework boot start, services: {}",
            self.container.names().join(",")
        ));

        if services.is_empty() {
            log.warn("no services registered to boot");
            return Ok(());
        }

        for service in services {
            info!(service = service.name(), "Booting service");
            if let Err(e) = service.boot(self).await {
                let message = format!("{e:#}");
                log.error(&format!("service {} boot failed: {}", service.name(), message));
                error!(service = service.name(), error = %message, "Service boot failed");
                return Err(KernelError::BootFailed {
                    service: service.name().to_string(),
                    message,
                });
            }
        }

        log.info("framework boot complete");
        Ok(())
    }

    /// Runs every long-running service concurrently until all return.
    ///
    /// The first failure fires `shutdown` for the others and is returned
    /// once they have stopped.
    pub async fn run(&self, shutdown: Shutdown) -> Result<(), KernelError> {
        let log = self.app_log()?;
        let runners = self.container.runners();

        log.info("framework run start");
        if runners.is_empty() {
            log.warn("no runner services identified");
            return Ok(());
        }

        // A local trigger lets a failing runner stop its siblings without
        // touching the caller's signal.
        let (local_trigger, local) = shutdown_channel();
        let mut external = shutdown;
        let forward = async {
            external.wait().await;
            local_trigger.fire();
        };
        tokio::pin!(forward);

        let mut pending: FuturesUnordered<_> = runners
            .into_iter()
            .map(|(name, runner)| {
                let shutdown = local.clone();
                async move {
                    let result = run_one(runner.as_ref(), self, shutdown).await;
                    (name, result)
                }
            })
            .collect();

        let mut forwarded = false;
        let mut first_error = None;
        loop {
            let next = tokio::select! {
                next = pending.next() => next,
                _ = &mut forward, if !forwarded => {
                    forwarded = true;
                    continue;
                }
            };
            let Some((name, result)) = next else { break };

            if let Err(e) = result {
                let message = format!("{e:#}");
                log.error(&format!("service {name} run failed: {message}"));
                error!(service = %name, error = %message, "Service run failed");
                if first_error.is_none() {
                    local_trigger.fire();
                    first_error = Some(KernelError::RunFailed {
                        service: name,
                        message,
                    });
                }
            }
        }

        match first_error {
            Some(e) => {
                log.error(&format!("framework run interrupted by error: {e}"));
                Err(e)
            }
            None => {
                log.info("framework run complete");
                Ok(())
            }
        }
    }

    /// Closes every service in reverse registration order, then stops the
    /// config watcher and flushes loggers.
    ///
    /// Every service is closed even if an earlier one fails; the first
    /// failure is returned.
    pub async fn shutdown(&self) -> Result<(), KernelError> {
        let log = self.app_log()?;
        log.info("framework shutdown start");

        let mut first_error = None;
        for service in self.container.services().into_iter().rev() {
            info!(service = service.name(), "Closing service");
            if let Err(e) = service.close(self).await {
                let message = format!("{e:#}");
                log.error(&format!("service {} shutdown failed: {}", service.name(), message));
                warn!(service = service.name(), error = %message, "Service close failed");
                if first_error.is_none() {
                    first_error = Some(KernelError::CloseFailed {
                        service: service.name().to_string(),
                        message,
                    });
                }
            }
        }

        self.config.stop_watch();
        log.info("framework shutdown complete");
        drop(log);
        self.logger.close();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Boots, runs until the runners finish or `signal` resolves, then shuts
    /// down within the shutdown timeout.
    ///
    /// A run error takes precedence over a shutdown error.
    pub async fn serve_until<F>(&self, signal: F) -> Result<(), KernelError>
    where
        F: Future<Output = ()>,
    {
        info!(name = NAME, version = VERSION, root = ?self.root, "App starting");
        self.boot().await?;

        let (trigger, shutdown) = shutdown_channel();
        let run = self.run(shutdown);
        tokio::pin!(run);
        tokio::pin!(signal);

        let run_result = tokio::select! {
            result = &mut run => {
                match &result {
                    Ok(()) => info!("App run complete, initiating shutdown"),
                    Err(e) => error!(error = %e, "App exiting with error"),
                }
                result
            }
            _ = &mut signal => {
                info!("Shutdown requested, stopping runners");
                trigger.fire();
                match tokio::time::timeout(self.shutdown_timeout, &mut run).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(timeout = ?self.shutdown_timeout, "Runners did not stop in time");
                        Ok(())
                    }
                }
            }
        };

        info!(timeout = ?self.shutdown_timeout, "Initiating shutdown");
        let shutdown_result = match tokio::time::timeout(self.shutdown_timeout, self.shutdown()).await {
            Ok(result) => result,
            Err(_) => Err(KernelError::ShutdownTimeout {
                seconds: self.shutdown_timeout.as_secs_f64(),
            }),
        };

        match (run_result, shutdown_result) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => {
                error!(error = %e, "App shutdown failed");
                Err(e)
            }
            (Ok(()), Ok(())) => {
                info!("App exited successfully");
                Ok(())
            }
        }
    }

    /// Serves until the runners finish or Ctrl-C is received.
    pub async fn serve(&self) -> Result<(), KernelError> {
        self.serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    // Built eagerly by the builder; only rebuilt after `close`.
    fn app_log(&self) -> Result<Arc<Logger>, KernelError> {
        Ok(self.logger.get(APP_LOGGER)?)
    }
}

async fn run_one(runner: &dyn Runner, app: &App, shutdown: Shutdown) -> anyhow::Result<()> {
    info!(service = runner.name(), "Running service");
    runner.run(app, shutdown).await
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("root", &self.root)
            .field("container", &self.container)
            .field("config", &self.config)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

/// Builder for [`App`].
#[derive(Default)]
pub struct AppBuilder {
    root: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    shutdown_timeout: Option<Duration>,
    container: Container,
}

impl AppBuilder {
    /// Sets the project root. Defaults to the nearest ancestor of the
    /// working directory holding a `Cargo.toml`.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Overrides the config directory. Defaults to `<root>/conf`.
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Registers a service under its own name.
    pub fn service<S: Service + 'static>(self, service: S) -> Self {
        let name = service.name().to_string();
        self.named_service(name, service)
    }

    /// Registers a service under an explicit name.
    pub fn named_service<S: Service + 'static>(self, name: impl Into<String>, service: S) -> Self {
        self.container.bind(name, Arc::new(service));
        self
    }

    /// Registers a long-running service under its own name.
    pub fn runner<R: Runner + 'static>(self, runner: R) -> Self {
        let name = runner.name().to_string();
        self.container.bind_runner(name, Arc::new(runner));
        self
    }

    /// Loads configuration and sets up logging.
    ///
    /// Logs go to `<root>/runtime/logs` unless the `log` namespace says
    /// otherwise; a relative `log.dir` is resolved against the root.
    pub fn build(self) -> Result<App, KernelError> {
        let root = match self.root {
            Some(root) => root,
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                project::project_root(&cwd)
            }
        };
        let config_dir = self.config_dir.unwrap_or_else(|| root.join("conf"));

        let config = Arc::new(ConfigManager::new(&config_dir)?);

        let mut log_config = LogConfig::with_dir(root.join("runtime").join("logs"));
        match config.get(LOG_NAMESPACE) {
            Ok(namespace) => {
                log_config = namespace.unmarshal()?;
                if log_config.dir.is_relative() {
                    log_config.dir = root.join(&log_config.dir);
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        let logger = Arc::new(LogManager::new(log_config)?);

        let app_log = logger.get(APP_LOGGER)?;
        app_log.info("framework init");
        app_log.info(&format!("framework init has service names: {}", self.container.names().join(", ")));
        app_log.info(&format!("framework init has config dir: {}", config_dir.display()));
        app_log.info(&format!("framework init has log dir: {}", logger.config().dir.display()));
        app_log.info(&format!("framework init has config namespaces: {}", config.all_names().join(", ")));

        Ok(App {
            root,
            container: self.container,
            config,
            logger,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        })
    }
}

static CURRENT_APP: RwLock<Option<Arc<App>>> = RwLock::new(None);

/// Registers the process-wide application, replacing any previous one.
pub fn set_app(app: Arc<App>) {
    *CURRENT_APP.write().unwrap_or_else(|e| e.into_inner()) = Some(app);
}

/// Returns the process-wide application registered with [`set_app`].
pub fn app() -> Result<Arc<App>, KernelError> {
    CURRENT_APP
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
        .ok_or(KernelError::AppNotInitialized)
}
