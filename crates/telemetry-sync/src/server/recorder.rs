//! Observation recorders: the sink an [`ObservationContainer`] writes into.
//!
//! [`ObservationContainer`]: crate::server::world::ObservationContainer

use telemetry_types::{Attribute, ObservationPoint, ObservationSnapshot, RecordedObservations, SourceKey};

/// Receives the points produced while observing a container.
///
/// A later point with the same source and attribute tuple replaces the
/// earlier one.
pub trait ObservationRecorder {
    /// Announce a source before it records, so that a source with no points
    /// still shows up in the result.
    fn on_new_source(&mut self, source: &SourceKey);

    /// Record an integer measurement.
    fn record_long(&mut self, source: &SourceKey, attributes: Vec<Attribute>, value: i64);

    /// Record a floating measurement.
    fn record_double(&mut self, source: &SourceKey, attributes: Vec<Attribute>, value: f64);

    /// Record a measurement available in both representations.
    fn record_preferred(
        &mut self,
        source: &SourceKey,
        attributes: Vec<Attribute>,
        double: f64,
        long: i64,
    );

    /// Whether floating values are kept as such. Sources may fall back to
    /// integers when this is `false`.
    fn supports_floating(&self) -> bool {
        true
    }
}

/// Recorder that collects everything into an [`ObservationSnapshot`].
#[derive(Debug, Default)]
pub struct MemoryObservationRecorder {
    snapshot: ObservationSnapshot,
}

impl MemoryObservationRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything recorded so far.
    pub fn clear(&mut self) {
        self.snapshot.sources.clear();
    }

    /// What has been recorded so far.
    pub const fn recorded(&self) -> &ObservationSnapshot {
        &self.snapshot
    }

    /// Finish recording.
    pub fn into_snapshot(self) -> ObservationSnapshot {
        self.snapshot
    }

    fn source_mut(&mut self, source: &SourceKey) -> &mut RecordedObservations {
        self.snapshot.sources.entry(source.clone()).or_default()
    }

    fn insert(&mut self, source: &SourceKey, attributes: Vec<Attribute>, point: ObservationPoint) {
        self.source_mut(source).points.insert(attributes, point);
    }
}

impl ObservationRecorder for MemoryObservationRecorder {
    fn on_new_source(&mut self, source: &SourceKey) {
        self.source_mut(source);
    }

    fn record_long(&mut self, source: &SourceKey, attributes: Vec<Attribute>, value: i64) {
        self.insert(source, attributes, ObservationPoint::long(value));
    }

    fn record_double(&mut self, source: &SourceKey, attributes: Vec<Attribute>, value: f64) {
        self.insert(source, attributes, ObservationPoint::double(value));
    }

    fn record_preferred(
        &mut self,
        source: &SourceKey,
        attributes: Vec<Attribute>,
        double: f64,
        long: i64,
    ) {
        self.insert(source, attributes, ObservationPoint::both(double, long));
    }
}
