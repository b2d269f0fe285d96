//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on malformed values. Everything has
//! a default, so an empty environment yields a usable configuration.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::sync::mpsc;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_INPUT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub telemetry: TelemetrySettings,
}

/// Settings for a single dispatch queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Ceiling on concurrently running jobs. Must be positive.
    pub max_concurrency: usize,
    /// Capacity of the channel producers write keys into.
    pub input_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            input_buffer: DEFAULT_INPUT_BUFFER,
        }
    }
}

impl QueueConfig {
    /// Check the settings the queue itself reads. `input_buffer` belongs to
    /// the producer channel and is checked by [`QueueConfig::input_channel`].
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Build the channel producers feed keys into, sized by `input_buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `input_buffer` is zero.
    pub fn input_channel<K>(&self) -> Result<(mpsc::Sender<K>, mpsc::Receiver<K>)> {
        validate_input_buffer(self.input_buffer)?;
        Ok(mpsc::channel(self.input_buffer))
    }
}

fn validate_input_buffer(input_buffer: usize) -> Result<()> {
    // tokio's bounded channel has no zero-capacity form.
    if input_buffer == 0 {
        return Err(Error::Config("input_buffer must be at least 1".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub endpoint: Option<String>,
    pub log_level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            queue: QueueConfig {
                max_concurrency: parsed_var("DISPATCHQ_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?,
                input_buffer: parsed_var("DISPATCHQ_INPUT_BUFFER", DEFAULT_INPUT_BUFFER)?,
            },
            telemetry: TelemetrySettings {
                endpoint: std::env::var("OTEL_ENDPOINT").ok(),
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document with optional `[queue]` and `[telemetry]` tables.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Fail fast on anything the queue or its input channel would reject.
    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        validate_input_buffer(self.queue.input_buffer)
    }
}

fn parsed_var(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is not a valid count: {e}"))),
        Err(_) => Ok(default),
    }
}
