//! Interaction limits: whether a client may observe a location.
//!
//! A request is refused when the client has left the world, stands in a
//! different partition, is too far away along either horizontal axis, or
//! when the location is unloaded or hosts no observation container. Each
//! check can be switched off with [`RequestChecks`] so that subscription
//! starts can be accepted before the container exists.

use std::fmt;

use telemetry_types::{BlockPos, ClientId, Location, PartitionId, Position};
use tracing::trace;

use crate::server::world::WorldView;

/// Which checks to apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::struct_excessive_bools)]
pub struct RequestChecks {
    /// Client and location must share a partition.
    pub partition: bool,
    /// Client must be within range of the location.
    pub distance: bool,
    /// Location must be loaded.
    pub loaded: bool,
    /// Location must host an observation container. Implies `loaded`.
    pub container: bool,
}

impl RequestChecks {
    /// Every check. Used for one-shot requests, keepalives and the sweep.
    pub const ALL: Self = Self {
        partition: true,
        distance: true,
        loaded: true,
        container: true,
    };

    /// Everything but the container check. Used for subscription starts,
    /// so a client may subscribe just before the container is placed.
    pub const RELAXED: Self = Self {
        container: false,
        ..Self::ALL
    };
}

impl Default for RequestChecks {
    fn default() -> Self {
        Self::ALL
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The client is no longer in the world.
    ClientRemoved,
    /// The client is in another partition.
    PartitionMismatch {
        /// Partition the client is in.
        client: PartitionId,
    },
    /// The client is too far away.
    OutOfRange {
        /// Absolute distance along x to the block centre.
        dx: f64,
        /// Absolute distance along z to the block centre.
        dz: f64,
    },
    /// The location is not loaded.
    Unloaded,
    /// The location hosts no observation container.
    NoContainer,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientRemoved => f.write_str("client has been removed"),
            Self::PartitionMismatch { client } => {
                write!(f, "partition mismatch, client is in {client}")
            }
            Self::OutOfRange { dx, dz } => {
                write!(f, "client is {dx},{dz} (x,z) blocks away")
            }
            Self::Unloaded => f.write_str("position is unloaded"),
            Self::NoContainer => f.write_str("position holds no observation container"),
        }
    }
}

/// Distance and validity rules for observation requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionLimits {
    range: f64,
}

impl InteractionLimits {
    /// Default per-axis interaction range.
    pub const DEFAULT_RANGE: f64 = 40.0;

    /// Create limits with the given per-axis range.
    pub const fn new(range: f64) -> Self {
        Self { range }
    }

    /// The per-axis interaction range.
    pub const fn range(&self) -> f64 {
        self.range
    }

    /// Whether `position` is strictly within range of the centre of `pos`
    /// along both horizontal axes.
    pub fn within_range(&self, position: Position, pos: BlockPos) -> bool {
        self.horizontal_offset(position, pos).is_none()
    }

    fn horizontal_offset(&self, position: Position, pos: BlockPos) -> Option<Rejection> {
        let center = pos.center();
        let dx = (center.x - position.x).abs();
        let dz = (center.z - position.z).abs();
        if dx >= self.range || dz >= self.range {
            return Some(Rejection::OutOfRange { dx, dz });
        }
        None
    }

    /// Whether `location` is loaded and hosts a container. The sweep drops
    /// every registration at a location that fails this.
    pub fn is_interactable(&self, world: &dyn WorldView, location: &Location) -> bool {
        world.is_loaded(location) && world.container(location).is_some()
    }

    /// Run the selected checks for `client` against `location`.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] encountered.
    pub fn check(
        &self,
        world: &dyn WorldView,
        client: ClientId,
        location: &Location,
        checks: RequestChecks,
    ) -> Result<(), Rejection> {
        let Some(view) = world.client(client) else {
            return Err(Rejection::ClientRemoved);
        };
        if checks.partition && view.partition != location.partition {
            return Err(Rejection::PartitionMismatch {
                client: view.partition,
            });
        }
        let offset = if checks.distance {
            self.horizontal_offset(view.position, location.pos)
        } else {
            None
        };
        if let Some(rejection) = offset {
            return Err(rejection);
        }
        if (checks.loaded || checks.container) && !world.is_loaded(location) {
            return Err(Rejection::Unloaded);
        }
        if checks.container && world.container(location).is_none() {
            return Err(Rejection::NoContainer);
        }
        Ok(())
    }

    /// Like [`InteractionLimits::check`], logging the reason for a refusal
    /// at trace level.
    pub fn can_interact(
        &self,
        world: &dyn WorldView,
        client: ClientId,
        location: &Location,
        checks: RequestChecks,
    ) -> bool {
        match self.check(world, client, location, checks) {
            Ok(()) => true,
            Err(reason) => {
                trace!(client = %client, location = %location, %reason, "client cannot interact");
                false
            }
        }
    }
}

impl Default for InteractionLimits {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RANGE)
    }
}
