//! Named loggers sharing one configuration.

pub mod config;
pub mod logger;

use std::sync::{Arc, Mutex, OnceLock};

use tracing::level_filters::LevelFilter;

use crate::error::LogError;
use crate::memo::MemoCache;

pub use config::{LogConfig, LogFormat};
pub use logger::Logger;

/// Creates loggers on first use and caches them by name.
pub struct LogManager {
    config: LogConfig,
    loggers: MemoCache<String, Logger>,
}

impl LogManager {
    /// Validates the config and creates an empty manager. The log directory
    /// is created when the first logger is built.
    pub fn new(config: LogConfig) -> Result<Self, LogError> {
        config.validate()?;
        Ok(Self {
            config,
            loggers: MemoCache::new(),
        })
    }

    /// Like [`LogManager::new`], but panics on an invalid config.
    pub fn must_new(config: LogConfig) -> Self {
        match Self::new(config) {
            Ok(manager) => manager,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns the shared config.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Returns the logger for `name`, building it on first access.
    pub fn get(&self, name: &str) -> Result<Arc<Logger>, LogError> {
        if name.is_empty() {
            return Err(LogError::EmptyName);
        }

        self.loggers.get_or_try_init(name, || {
            tracing::debug!(logger = name, dir = ?self.config.dir, "Creating logger");
            Logger::build(&self.config, name)
        })
    }

    /// Like [`LogManager::get`], but panics on failure.
    pub fn must_get(&self, name: &str) -> Arc<Logger> {
        match self.get(name) {
            Ok(logger) => logger,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns the names of the loggers created so far, sorted.
    pub fn list(&self) -> Vec<String> {
        self.loggers.keys()
    }

    /// Drops one logger. Its writer flushes once every outstanding handle
    /// is gone. Returns whether the logger existed.
    pub fn remove(&self, name: &str) -> bool {
        self.loggers.remove(name).is_some()
    }

    /// Drops every logger. Later calls to [`LogManager::get`] build fresh
    /// instances.
    pub fn close(&self) {
        let closed = self.loggers.clear();
        tracing::debug!(count = closed.len(), "Closed loggers");
    }

    /// Changes the level of an existing logger.
    pub fn set_level(&self, name: &str, level: &str) -> Result<(), LogError> {
        if name.is_empty() {
            return Err(LogError::EmptyName);
        }
        let level = config::parse_level(level)?;
        self.existing(name)?.set_level(level)
    }

    /// Returns the level of an existing logger.
    pub fn level(&self, name: &str) -> Result<LevelFilter, LogError> {
        if name.is_empty() {
            return Err(LogError::EmptyName);
        }
        self.existing(name)?.level()
    }

    fn existing(&self, name: &str) -> Result<Arc<Logger>, LogError> {
        self.loggers.get(name).ok_or_else(|| LogError::NotFound {
            name: name.to_string(),
        })
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager")
            .field("config", &self.config)
            .field("loggers", &self.list())
            .finish()
    }
}

static DEFAULT_MANAGER: OnceLock<Arc<LogManager>> = OnceLock::new();
static DEFAULT_INIT: Mutex<()> = Mutex::new(());

/// Initializes the process-wide default log manager. Only the first
/// successful call takes effect.
pub fn init(config: LogConfig) -> Result<Arc<LogManager>, LogError> {
    let _guard = DEFAULT_INIT.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(manager) = DEFAULT_MANAGER.get() {
        return Ok(Arc::clone(manager));
    }

    let manager = Arc::new(LogManager::new(config)?);
    Ok(Arc::clone(DEFAULT_MANAGER.get_or_init(|| manager)))
}

/// Returns the default log manager, or `NotInitialized` before [`init`].
pub fn try_default() -> Result<Arc<LogManager>, LogError> {
    DEFAULT_MANAGER
        .get()
        .cloned()
        .ok_or(LogError::NotInitialized)
}
