//! Configuration loading and typed config structures for observation sync.
//!
//! The configuration lives in `telemetry-config.yaml`. Every field has a
//! default, so an empty document (or a missing file, via
//! [`SyncConfig::load_or_default`]) yields the stock timings: a sweep once
//! per second, a 90 second expiry window and a 500 ms client cleanup
//! window.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its accepted range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Which value was rejected and why.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level observation sync configuration.
///
/// Mirrors the structure of `telemetry-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncConfig {
    /// Authoritative-side sweep and validation settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Requesting-side timing settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Demo engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Like [`SyncConfig::from_file`], but a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Same as [`SyncConfig::from_file`] for any failure other than
    /// "not found".
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the managers cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tick_interval == 0 {
            return Err(invalid("server.tick_interval must be at least 1"));
        }
        if self.server.max_age_ticks == 0 {
            return Err(invalid("server.max_age_ticks must be at least 1"));
        }
        if !self.server.interaction_range.is_finite() || self.server.interaction_range <= 0.0 {
            return Err(invalid("server.interaction_range must be a positive number"));
        }
        if self.client.tick_duration_ms == 0 {
            return Err(invalid("client.tick_duration_ms must be at least 1"));
        }
        if self.engine.subscribe_interval == 0 {
            return Err(invalid("engine.subscribe_interval must be at least 1"));
        }
        Ok(())
    }

    /// How often a live subscription renews itself: two thirds of the
    /// server expiry window, converted to wall-clock time.
    pub fn keepalive_period(&self) -> Duration {
        let ticks = self.server.max_age_ticks.saturating_mul(2) / 3;
        Duration::from_millis(ticks.saturating_mul(self.client.tick_duration_ms))
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Authoritative-side configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Run the sweep once every this many ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: u32,

    /// Ticks a registration survives without renewal.
    #[serde(default = "default_max_age_ticks")]
    pub max_age_ticks: u64,

    /// Horizontal distance (per axis) beyond which requests are refused.
    #[serde(default = "default_interaction_range")]
    pub interaction_range: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            max_age_ticks: default_max_age_ticks(),
            interaction_range: default_interaction_range(),
        }
    }
}

/// Requesting-side configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// How long an unobserved subscription lingers before closing itself.
    #[serde(default = "default_subscription_timeout_ms")]
    pub subscription_timeout_ms: u64,

    /// Real-time length of one server tick, used to convert tick windows.
    #[serde(default = "default_tick_duration_ms")]
    pub tick_duration_ms: u64,
}

impl ClientConfig {
    /// The cleanup window as a [`Duration`].
    pub const fn subscription_timeout(&self) -> Duration {
        Duration::from_millis(self.subscription_timeout_ms)
    }

    /// One tick as a [`Duration`].
    pub const fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_duration_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            subscription_timeout_ms: default_subscription_timeout_ms(),
            tick_duration_ms: default_tick_duration_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Settings for the demo engine binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Ticks to simulate before shutting down.
    #[serde(default = "default_run_ticks")]
    pub run_ticks: u64,

    /// Update interval requested by the demo subscription.
    #[serde(default = "default_subscribe_interval")]
    pub subscribe_interval: u32,

    /// Number of random gauges placed in the demo world.
    #[serde(default = "default_gauge_count")]
    pub gauge_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_ticks: default_run_ticks(),
            subscribe_interval: default_subscribe_interval(),
            gauge_count: default_gauge_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_interval() -> u32 {
    20
}

const fn default_max_age_ticks() -> u64 {
    20 * 90
}

const fn default_interaction_range() -> f64 {
    40.0
}

const fn default_subscription_timeout_ms() -> u64 {
    500
}

const fn default_tick_duration_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_run_ticks() -> u64 {
    200
}

const fn default_subscribe_interval() -> u32 {
    20
}

const fn default_gauge_count() -> u32 {
    3
}
