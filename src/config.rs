//! Connection configuration.
//!
//! All tuning knobs for one session live in [`ConnectionConfig`]: the device
//! path and baud rate, credentials, the transport payload size, and the
//! poll/timeout intervals. Values come from defaults, an optional TOML file,
//! and `SERIAL_SHELL_*` environment overrides, in that order.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "SERIAL_SHELL";

/// Configuration for one serial shell session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial device path.
    pub port: String,
    /// Baud rate (bits per second).
    pub baud_rate: u32,
    /// User name for the remote login prompt.
    pub remote_user: String,
    /// Password for the remote password prompt (empty when none).
    pub password: String,
    /// Maximum payload written to the device in one chunk.
    pub payload_size: usize,
    /// Poll interval for the worker loops, in milliseconds.
    pub poll_interval_ms: u64,
    /// Quiet window after which a pending read is declared dead, in
    /// milliseconds. Counted from the last received data.
    pub response_timeout_ms: u64,
    /// How many shell-detection probes to send before giving up.
    pub detect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 115_200,
            remote_user: "root".to_string(),
            password: String::new(),
            payload_size: 512,
            poll_interval_ms: 50,
            response_timeout_ms: 5_000,
            detect_attempts: 3,
        }
    }
}

impl ConnectionConfig {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Response timeout as a `Duration`.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides (no file required).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `SERIAL_SHELL_*` environment variables on top of the current
    /// values. Unparseable numeric values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}_PORT")) {
            self.port = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}_BAUD_RATE")) {
            if let Ok(n) = v.parse() {
                self.baud_rate = n;
            }
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}_REMOTE_USER")) {
            self.remote_user = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}_PASSWORD")) {
            self.password = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}_PAYLOAD_SIZE")) {
            if let Ok(n) = v.parse() {
                self.payload_size = n;
            }
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}
