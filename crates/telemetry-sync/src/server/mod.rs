//! Authoritative side: registrations, the tick sweep, and the world seams.
//!
//! # Submodules
//!
//! - [`limits`] -- Distance, partition and container checks.
//! - [`manager`] -- [`SyncManagerServer`]: registration table and sweep.
//! - [`recorder`] -- [`ObservationRecorder`] and the in-memory recorder.
//! - [`registration`] -- One client's interest in one location.
//! - [`registry`] -- [`ServerSessions`]: one manager per running world.
//! - [`world`] -- [`WorldView`] and [`ObservationContainer`].
//!
//! [`SyncManagerServer`]: manager::SyncManagerServer
//! [`ObservationRecorder`]: recorder::ObservationRecorder
//! [`ServerSessions`]: registry::ServerSessions
//! [`WorldView`]: world::WorldView
//! [`ObservationContainer`]: world::ObservationContainer

pub mod limits;
pub mod manager;
pub mod recorder;
pub mod registration;
pub mod registry;
pub mod world;
