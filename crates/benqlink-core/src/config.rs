//! Engine configuration
//!
//! Stored as JSON alongside whatever host application owns the projector
//! link. Missing fields fall back to the defaults of the BenQ RS-232/LAN
//! protocol.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TIMEOUT_MS, UNAVAILABLE_MARKER};

/// Errors loading or validating an [`EngineConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Protocol engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long to wait for a response before discarding all pending work
    pub response_timeout_ms: u64,

    /// Maximum number of unresolved commands
    pub queue_capacity: usize,

    /// Message the projector sends for a value it cannot report right now
    pub unavailable_marker: String,

    /// Period of the optional status poller (disabled when absent)
    pub status_poll_interval_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            unavailable_marker: UNAVAILABLE_MARKER.to_string(),
            status_poll_interval_ms: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that the values can drive an engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.unavailable_marker.is_empty() {
            return Err(ConfigError::Invalid(
                "unavailable_marker must not be empty".to_string(),
            ));
        }
        if self.status_poll_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "status_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Watchdog period
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Status poll period, if polling is enabled
    pub fn status_poll_interval(&self) -> Option<Duration> {
        self.status_poll_interval_ms.map(Duration::from_millis)
    }
}
