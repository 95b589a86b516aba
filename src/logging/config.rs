//! Logging configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;

use crate::error::LogError;

/// Settings shared by every logger of a [`super::LogManager`].
///
/// Read from the `log` config namespace when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory holding one `<name>.log` file per logger.
    pub dir: PathBuf,
    /// Initial level: trace, debug, info, warn, error, off.
    pub level: String,
    /// Output format: json, console, text (or standard).
    pub format: LogFormat,
    /// File rotation period: never, minutely, hourly, daily.
    pub rotation: String,
    /// Rotated files to keep. Zero keeps everything.
    pub max_backups: usize,
    /// Mirror every event to stdout.
    pub console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("runtime/logs"),
            level: "info".to_string(),
            format: LogFormat::Json,
            rotation: "never".to_string(),
            max_backups: 0,
            console: false,
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Console,
    #[serde(alias = "standard")]
    Text,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "json" => Ok(Self::Json),
            "console" => Ok(Self::Console),
            "text" | "standard" => Ok(Self::Text),
            other => Err(LogError::InvalidFormat {
                format: other.to_string(),
            }),
        }
    }
}

impl LogConfig {
    /// Creates a config writing to `dir` with every other field defaulted.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Checks every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.dir.as_os_str().is_empty() {
            return Err(LogError::EmptyDir);
        }
        self.level_filter()?;
        self.rotation()?;
        Ok(())
    }

    /// Parses the configured level. An empty level means info.
    pub fn level_filter(&self) -> Result<LevelFilter, LogError> {
        parse_level(&self.level)
    }

    /// Parses the configured rotation. An empty rotation means never.
    pub fn rotation(&self) -> Result<Rotation, LogError> {
        match self.rotation.to_ascii_lowercase().as_str() {
            "" | "never" => Ok(Rotation::NEVER),
            "minutely" => Ok(Rotation::MINUTELY),
            "hourly" => Ok(Rotation::HOURLY),
            "daily" => Ok(Rotation::DAILY),
            _ => Err(LogError::InvalidRotation {
                rotation: self.rotation.clone(),
            }),
        }
    }
}

/// Parses a level name, treating an empty string as info.
pub fn parse_level(level: &str) -> Result<LevelFilter, LogError> {
    if level.is_empty() {
        return Ok(LevelFilter::INFO);
    }
    LevelFilter::from_str(level).map_err(|_| LogError::InvalidLevel {
        level: level.to_string(),
    })
}
