//! Locations: the key every request, registration and response is
//! matched on.
//!
//! A [`Location`] pairs a [`PartitionId`] (an independent world or
//! dimension) with an integer [`BlockPos`]. Two locations in different
//! partitions never compare equal, even when their coordinates match.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of an independent world partition (e.g. a dimension).
///
/// Cloning is cheap: the name is reference counted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(Arc<str>);

impl PartitionId {
    /// Create a partition identifier from its name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Return the partition name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Integer block coordinate inside a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    /// East-west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North-south axis.
    pub z: i32,
}

impl BlockPos {
    /// Create a block coordinate.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Centre of the block in continuous coordinates.
    pub fn center(self) -> Position {
        Position {
            x: f64::from(self.x) + 0.5,
            y: f64::from(self.y) + 0.5,
            z: f64::from(self.z) + 0.5,
        }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Continuous position of a client inside its partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// East-west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North-south axis.
    pub z: f64,
}

impl Position {
    /// Create a position.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A block coordinate qualified by its partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// The partition the block lives in.
    pub partition: PartitionId,
    /// The block coordinate.
    pub pos: BlockPos,
}

impl Location {
    /// Create a location.
    pub const fn new(partition: PartitionId, pos: BlockPos) -> Self {
        Self { partition, pos }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.pos)
    }
}
