//! Monitor configuration
//!
//! Layered: built-in defaults, then `telemetry.toml` (or the file given on
//! the command line), then `TELEMETRY_*` environment variables.

use crate::live_view::DEFAULT_ANIM_INTERVAL_MS;
use config::{Config, ConfigError, Environment, File};
use receiver::ReceiverConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `TELEMETRY_PORT=6000`
pub const ENV_PREFIX: &str = "TELEMETRY";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "telemetry";

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// UDP bind address
    pub host: String,
    /// UDP bind port
    pub port: u16,

    /// Points kept for the live view
    pub max_points: usize,
    /// Live view refresh period (ms)
    pub anim_interval_ms: u64,

    /// Directory for CSV logs
    pub logs_dir: String,
    /// Samples between log flushes
    pub flush_every: u64,

    /// Receive timeout; bounds shutdown latency (ms)
    pub recv_timeout_ms: u64,
    /// How long shutdown waits for the receive thread (ms)
    pub join_timeout_ms: u64,

    /// tracing level filter
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let receiver = ReceiverConfig::default();
        Self {
            host: receiver.host,
            port: receiver.port,
            max_points: ring_buffer::DEFAULT_CAPACITY,
            anim_interval_ms: DEFAULT_ANIM_INTERVAL_MS,
            logs_dir: "logs".to_string(),
            flush_every: telemetry_log::DEFAULT_FLUSH_EVERY,
            recv_timeout_ms: receiver.recv_timeout.as_millis() as u64,
            join_timeout_ms: receiver.join_timeout.as_millis() as u64,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load the layered configuration. An explicit `path` must exist; the
    /// default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_points == 0 {
            return Err(ConfigError::Message("max_points must be > 0".to_string()));
        }
        if self.anim_interval_ms == 0 {
            return Err(ConfigError::Message("anim_interval_ms must be > 0".to_string()));
        }
        if self.recv_timeout_ms == 0 {
            return Err(ConfigError::Message("recv_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            host: self.host.clone(),
            port: self.port,
            recv_timeout: Duration::from_millis(self.recv_timeout_ms),
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            ..Default::default()
        }
    }

    pub fn anim_interval(&self) -> Duration {
        Duration::from_millis(self.anim_interval_ms)
    }
}
