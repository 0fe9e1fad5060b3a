//! Shared type definitions for the observation telemetry subsystem.
//!
//! This crate is the single source of truth for the values that cross the
//! client/server boundary: where an observation lives ([`Location`]), who
//! asked for it ([`ClientId`]), and what was measured
//! ([`ObservationSnapshot`]).
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for clients and world sessions
//! - [`location`] -- Partition identifiers, block coordinates, locations
//! - [`observation`] -- Attribute tuples, observation points, snapshots

pub mod ids;
pub mod location;
pub mod observation;

// Re-export all public types at crate root for convenience.
pub use ids::{ClientId, WorldId};
pub use location::{BlockPos, Location, PartitionId, Position};
pub use observation::{
    Attribute, AttributeValue, ObservationPoint, ObservationSnapshot, RecordedObservations,
    SharedSnapshot, SourceKey,
};
