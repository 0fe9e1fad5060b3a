//! The world as the server manager sees it.
//!
//! The hosting engine implements [`WorldView`] over its own state. The
//! manager only reads through it: which tick it is, where a client stands,
//! whether a location is loaded, and which container sits there.

use std::sync::Arc;

use telemetry_types::{ClientId, Location, PartitionId, Position};

use crate::error::ObserveError;
use crate::server::recorder::ObservationRecorder;

/// Where a connected client currently is.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientView {
    /// The partition the client is in.
    pub partition: PartitionId,
    /// The client's position inside that partition.
    pub position: Position,
}

/// Something at a location that can be observed.
pub trait ObservationContainer: Send + Sync {
    /// Record the current state of every source into `recorder`.
    ///
    /// `force` asks sources that normally skip unchanged values to record
    /// them anyway.
    ///
    /// # Errors
    ///
    /// Returns [`ObserveError`] if the container cannot be read.
    fn observe(
        &self,
        recorder: &mut dyn ObservationRecorder,
        force: bool,
    ) -> Result<(), ObserveError>;
}

/// Read-only view of one running world.
pub trait WorldView: Send + Sync {
    /// The world's current tick.
    fn current_tick(&self) -> u64;

    /// Where `client` is, or `None` if it has left the world.
    fn client(&self, client: ClientId) -> Option<ClientView>;

    /// Whether `location` is loaded and addressable.
    fn is_loaded(&self, location: &Location) -> bool;

    /// The container at `location`, if one is there.
    fn container(&self, location: &Location) -> Option<Arc<dyn ObservationContainer>>;
}
