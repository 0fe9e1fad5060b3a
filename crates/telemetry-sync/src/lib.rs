//! Observation subscription sync.
//!
//! A requesting client asks the authoritative server for snapshots of the
//! observation sources at a location, either once or on a repeating tick
//! interval. The server keeps one registration per (client, location),
//! sweeps them on its tick loop and broadcasts one observation per location
//! to every client that is due. The client coalesces concurrent requests
//! per location, renews its subscriptions with keepalives and closes the
//! ones nobody watches any more.
//!
//! # Modules
//!
//! - [`client`] -- Pending-request table, subscriptions and their streams.
//! - [`config`] -- YAML configuration with defaults.
//! - [`error`] -- [`SyncError`], [`ObserveError`] and teardown aggregation.
//! - [`server`] -- Registration table, tick sweep and world seams.

pub mod client;
pub mod config;
pub mod error;
pub mod server;

#[cfg(test)]
mod testing;

pub use client::deferred::Deferred;
pub use client::manager::{PendingRequest, SyncManagerClient};
pub use client::stream::SubscriptionStream;
pub use client::subscription::Subscription;
pub use config::{ClientConfig, ConfigError, EngineConfig, LoggingConfig, ServerConfig, SyncConfig};
pub use error::{ErrorAccumulator, ObserveError, SyncError};
pub use server::limits::{InteractionLimits, Rejection, RequestChecks};
pub use server::manager::{SweepReport, SyncManagerServer};
pub use server::recorder::{MemoryObservationRecorder, ObservationRecorder};
pub use server::registration::{Registration, UpdateInterval};
pub use server::registry::ServerSessions;
pub use server::world::{ClientView, ObservationContainer, WorldView};
