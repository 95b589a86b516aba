//! A single named logger with its own subscriber and file.

use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{fmt, reload, Layer, Registry};

use super::config::{LogConfig, LogFormat};
use crate::error::LogError;

type Base = Layered<reload::Layer<LevelFilter, Registry>, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

/// A named logger writing to `<dir>/<name>.log`.
///
/// Events are emitted through the logger's own [`Dispatch`], so they never
/// reach the process-wide subscriber. Every event carries a `biz` field
/// holding the logger name.
pub struct Logger {
    name: String,
    dispatch: Dispatch,
    level: reload::Handle<LevelFilter, Registry>,
    // Flushes the background writer on drop.
    _guard: WorkerGuard,
}

impl Logger {
    /// Builds a logger from the shared config.
    pub(crate) fn build(config: &LogConfig, name: &str) -> Result<Self, LogError> {
        let level = config.level_filter()?;

        let mut builder = RollingFileAppender::builder()
            .rotation(config.rotation()?)
            .filename_prefix(name)
            .filename_suffix("log");
        if config.max_backups > 0 {
            builder = builder.max_log_files(config.max_backups);
        }
        let appender = builder
            .build(&config.dir)
            .map_err(|e| LogError::Appender {
                name: name.to_string(),
                dir: config.dir.clone(),
                message: e.to_string(),
            })?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let (filter, handle) = reload::Layer::new(level);

        let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
        layers.push(match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
            LogFormat::Console => fmt::layer()
                .with_writer(writer)
                .with_ansi(true)
                .boxed(),
            LogFormat::Text => fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        });
        if config.console {
            layers.push(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stdout)
                    .boxed(),
            );
        }

        let subscriber = Registry::default().with(filter).with(layers);

        Ok(Self {
            name: name.to_string(),
            dispatch: Dispatch::new(subscriber),
            level: handle,
            _guard: guard,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `f` with this logger as the current subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn error(&self, message: &str) {
        self.in_scope(|| tracing::error!(biz = %self.name, "{}", message));
    }

    pub fn warn(&self, message: &str) {
        self.in_scope(|| tracing::warn!(biz = %self.name, "{}", message));
    }

    pub fn info(&self, message: &str) {
        self.in_scope(|| tracing::info!(biz = %self.name, "{}", message));
    }

    pub fn debug(&self, message: &str) {
        self.in_scope(|| tracing::debug!(biz = %self.name, "{}", message));
    }

    /// Returns the current level.
    pub fn level(&self) -> Result<LevelFilter, LogError> {
        self.level
            .with_current(|level| *level)
            .map_err(|e| LogError::LevelUpdate {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }

    /// Changes the level. Takes effect for the next event.
    pub fn set_level(&self, level: LevelFilter) -> Result<(), LogError> {
        self.level
            .modify(|current| *current = level)
            .map_err(|e| LogError::LevelUpdate {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level().ok())
            .finish()
    }
}
