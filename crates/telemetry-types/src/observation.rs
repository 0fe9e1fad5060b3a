//! Recorded observations: the immutable payload carried by every response.
//!
//! An [`ObservationSnapshot`] maps each observation source ([`SourceKey`])
//! to the [`RecordedObservations`] it produced. Each recorded observation
//! maps an ordered attribute tuple to an [`ObservationPoint`] holding an
//! integer value, a floating value, or both.
//!
//! Snapshots are shared between every waiter on a location, so they are
//! handed out as [`SharedSnapshot`] (`Arc<ObservationSnapshot>`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Snapshot shared by every consumer of one response.
pub type SharedSnapshot = Arc<ObservationSnapshot>;

/// Value of a single attribute in an attribute tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeValue {
    /// Free-form text (item names, fluid ids, sign lines).
    Text(String),
    /// Integer attribute (slot index, channel number).
    Long(i64),
    /// Boolean attribute.
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Long(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// A named attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attribute {
    /// Attribute key, e.g. `item` or `side`.
    pub key: String,
    /// Attribute value.
    pub value: AttributeValue,
}

impl Attribute {
    /// Create an attribute.
    pub fn new(key: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A single measured value. At least one of the two representations is
/// always present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationPoint {
    long: Option<i64>,
    double: Option<f64>,
}

impl ObservationPoint {
    /// Point carrying only an integer value.
    pub const fn long(value: i64) -> Self {
        Self {
            long: Some(value),
            double: None,
        }
    }

    /// Point carrying only a floating value.
    pub const fn double(value: f64) -> Self {
        Self {
            long: None,
            double: Some(value),
        }
    }

    /// Point carrying both representations of the same measurement.
    pub const fn both(double: f64, long: i64) -> Self {
        Self {
            long: Some(long),
            double: Some(double),
        }
    }

    /// Build a point from optional parts. Returns `None` when neither value
    /// is present.
    pub const fn from_parts(long: Option<i64>, double: Option<f64>) -> Option<Self> {
        if long.is_none() && double.is_none() {
            return None;
        }
        Some(Self { long, double })
    }

    /// Integer value, if recorded.
    pub const fn long_value(&self) -> Option<i64> {
        self.long
    }

    /// Floating value, if recorded.
    pub const fn double_value(&self) -> Option<f64> {
        self.double
    }
}

/// Every point one observation source produced during a single observe
/// pass, keyed by attribute tuple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedObservations {
    /// Points keyed by their ordered attribute tuple.
    pub points: BTreeMap<Vec<Attribute>, ObservationPoint>,
}

impl RecordedObservations {
    /// Number of recorded points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point was recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Opaque identity of an observation source within one container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey {
    /// Registered source name, e.g. `redstone.power`.
    pub name: String,
    /// Slot of the source inside its container.
    pub slot: u8,
}

impl SourceKey {
    /// Create a source key.
    pub fn new(name: impl Into<String>, slot: u8) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.slot)
    }
}

/// Immutable result of observing one location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSnapshot {
    /// Recorded observations per source.
    pub sources: BTreeMap<SourceKey, RecordedObservations>,
}

impl ObservationSnapshot {
    /// Total number of points across all sources.
    pub fn point_count(&self) -> usize {
        self.sources.values().map(RecordedObservations::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_requires_a_value() {
        assert!(ObservationPoint::from_parts(None, None).is_none());
        let point = ObservationPoint::from_parts(Some(3), None);
        assert_eq!(point.and_then(|p| p.long_value()), Some(3));
        assert_eq!(point.and_then(|p| p.double_value()), None);
    }

    #[test]
    fn point_count_sums_sources() {
        let mut first = RecordedObservations::default();
        first.points.insert(Vec::new(), ObservationPoint::long(1));
        first.points.insert(
            vec![Attribute::new("side", AttributeValue::Text("north".to_owned()))],
            ObservationPoint::long(2),
        );
        let mut second = RecordedObservations::default();
        second.points.insert(Vec::new(), ObservationPoint::double(0.5));

        let mut snapshot = ObservationSnapshot::default();
        snapshot.sources.insert(SourceKey::new("a", 0), first);
        snapshot.sources.insert(SourceKey::new("b", 1), second);
        assert_eq!(snapshot.point_count(), 3);
    }
}
