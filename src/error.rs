//! Error types for the application kernel.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading, lookup, and watching errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config directory '{path}': {source}")]
    DirectoryRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read config file '{path}': {message}")]
    FileRead { path: PathBuf, message: String },

    #[error("Duplicate config key '{key}' in '{path}' (already declared in '{first}')")]
    DuplicateKey {
        key: String,
        path: PathBuf,
        first: PathBuf,
    },

    #[error("Config namespace '{name}' not found")]
    NotFound { name: String },

    #[error("Failed to watch config directory '{path}': {source}")]
    WatcherSetup {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("Failed to decode config at '{path}': {source}")]
    Decode {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Default config manager has not been initialized")]
    NotInitialized,
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_directory_read(&self) -> bool {
        matches!(self, Self::DirectoryRead { .. })
    }

    pub fn is_file_read(&self) -> bool {
        matches!(self, Self::FileRead { .. })
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

/// Logging manager errors.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Logger name cannot be empty")]
    EmptyName,

    #[error("Log directory cannot be empty")]
    EmptyDir,

    #[error("Invalid log level '{level}'")]
    InvalidLevel { level: String },

    #[error("Unsupported log format '{format}' (supported: json, console, text)")]
    InvalidFormat { format: String },

    #[error("Unsupported log rotation '{rotation}' (supported: never, minutely, hourly, daily)")]
    InvalidRotation { rotation: String },

    #[error("Logger '{name}' not found")]
    NotFound { name: String },

    #[error("Failed to open log file for '{name}' in '{dir}': {message}")]
    Appender {
        name: String,
        dir: PathBuf,
        message: String,
    },

    #[error("Failed to update level of logger '{name}': {message}")]
    LevelUpdate { name: String, message: String },

    #[error("Default log manager has not been initialized")]
    NotInitialized,
}

/// Service container and lifecycle errors.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Service '{name}' not found")]
    ServiceNotFound { name: String },

    #[error("Service '{name}' is not of type {expected}")]
    ServiceType { name: String, expected: &'static str },

    #[error("Service '{service}' failed to boot: {message}")]
    BootFailed { service: String, message: String },

    #[error("Service '{service}' failed while running: {message}")]
    RunFailed { service: String, message: String },

    #[error("Service '{service}' failed to close: {message}")]
    CloseFailed { service: String, message: String },

    #[error("Shutdown did not finish within {seconds:.1} seconds")]
    ShutdownTimeout { seconds: f64 },

    #[error("Application has not been registered")]
    AppNotInitialized,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Log(#[from] LogError),
}
