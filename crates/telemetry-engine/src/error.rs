//! Error types for the demo engine binary.

use telemetry_protocol::ProtocolError;
use telemetry_sync::{ConfigError, SyncError};

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A sync manager refused an operation.
    #[error("sync error: {source}")]
    Sync {
        /// The underlying sync error.
        #[from]
        source: SyncError,
    },

    /// A configured value could not be turned into a wire value.
    #[error("protocol error: {source}")]
    Protocol {
        /// The underlying protocol error.
        #[from]
        source: ProtocolError,
    },

    /// Logging could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },

    /// The demo world has nothing to observe.
    #[error("demo world has no gauges")]
    NoGauges,
}
