//! In-memory demo world.
//!
//! A row of random-walk gauges along the x axis of the overworld, and the
//! connected clients standing wherever the engine puts them. Every gauge
//! location is loaded for the whole run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use telemetry_sync::{ClientView, ObservationContainer, ObservationRecorder, ObserveError, WorldView};
use telemetry_types::{
    Attribute, AttributeValue, BlockPos, ClientId, Location, PartitionId, Position, SourceKey,
};
use tracing::debug;

/// Blocks between neighbouring gauges.
const GAUGE_SPACING: i32 = 4;

/// Height the gauges sit at.
const GAUGE_Y: i32 = 64;

/// A gauge whose reading drifts randomly every time it is observed.
#[derive(Debug)]
pub struct RandomGauge {
    name: String,
    reading: Mutex<f64>,
}

impl RandomGauge {
    /// Create a gauge starting at a random reading.
    pub fn new(name: impl Into<String>) -> Self {
        let start = rand::rng().random_range(0.0..100.0);
        Self {
            name: name.into(),
            reading: Mutex::new(start),
        }
    }

    fn step(&self) -> f64 {
        let mut reading = self.reading.lock().unwrap_or_else(PoisonError::into_inner);
        let drift: f64 = rand::rng().random_range(-2.5..2.5);
        *reading = (*reading + drift).clamp(0.0, 100.0);
        *reading
    }
}

impl ObservationContainer for RandomGauge {
    fn observe(
        &self,
        recorder: &mut dyn ObservationRecorder,
        force: bool,
    ) -> Result<(), ObserveError> {
        let reading = self.step();
        let level = SourceKey::new(self.name.clone(), 0);
        recorder.on_new_source(&level);
        let attributes = vec![Attribute::new("unit", AttributeValue::Text("percent".to_owned()))];
        #[allow(clippy::cast_possible_truncation)]
        let rounded = reading.round() as i64;
        if recorder.supports_floating() {
            recorder.record_preferred(&level, attributes, reading, rounded);
        } else {
            recorder.record_long(&level, attributes, rounded);
        }
        if force {
            let forced = SourceKey::new(self.name.clone(), 1);
            recorder.on_new_source(&forced);
            recorder.record_long(&forced, Vec::new(), 1);
        }
        Ok(())
    }
}

/// The demo world.
#[derive(Default)]
pub struct DemoWorld {
    tick: AtomicU64,
    clients: Mutex<HashMap<ClientId, ClientView>>,
    gauges: HashMap<Location, Arc<RandomGauge>>,
}

impl std::fmt::Debug for DemoWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoWorld")
            .field("tick", &self.current_tick())
            .field("gauges", &self.gauges.len())
            .finish_non_exhaustive()
    }
}

impl DemoWorld {
    /// Build a world with `gauge_count` gauges in the given partition.
    pub fn new(partition: &PartitionId, gauge_count: u32) -> Self {
        let gauges = (0..gauge_count)
            .filter_map(|index| {
                let x = i32::try_from(index).ok()?.checked_mul(GAUGE_SPACING)?;
                let location = Location::new(partition.clone(), BlockPos::new(x, GAUGE_Y, 0));
                let gauge = Arc::new(RandomGauge::new(format!("gauge-{index}")));
                Some((location, gauge))
            })
            .collect();
        Self {
            tick: AtomicU64::new(0),
            clients: Mutex::new(HashMap::new()),
            gauges,
        }
    }

    /// Every gauge location, ordered along the row.
    pub fn gauge_locations(&self) -> Vec<Location> {
        let mut locations: Vec<Location> = self.gauges.keys().cloned().collect();
        locations.sort_by_key(|location| location.pos);
        locations
    }

    /// Put `client` at `position` in `partition`.
    pub fn place_client(&self, client: ClientId, partition: &PartitionId, position: Position) {
        debug!(client = %client, partition = %partition.as_str(), "client placed");
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).insert(
            client,
            ClientView {
                partition: partition.clone(),
                position,
            },
        );
    }

    /// Advance one tick and return the new tick.
    pub fn advance(&self) -> u64 {
        self.tick
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }
}

impl WorldView for DemoWorld {
    fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    fn client(&self, client: ClientId) -> Option<ClientView> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client)
            .cloned()
    }

    fn is_loaded(&self, location: &Location) -> bool {
        self.gauges.contains_key(location)
    }

    fn container(&self, location: &Location) -> Option<Arc<dyn ObservationContainer>> {
        self.gauges
            .get(location)
            .map(|gauge| Arc::clone(gauge) as Arc<dyn ObservationContainer>)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use telemetry_sync::MemoryObservationRecorder;

    use super::*;

    #[test]
    fn gauges_are_spaced_along_x() {
        let world = DemoWorld::new(&PartitionId::from("overworld"), 3);
        let xs: Vec<i32> = world.gauge_locations().iter().map(|l| l.pos.x).collect();
        assert_eq!(xs, vec![0, 4, 8]);
        assert!(world.is_loaded(&world.gauge_locations()[2]));
        assert!(world.container(&world.gauge_locations()[0]).is_some());
    }

    #[test]
    fn gauge_reading_stays_in_range() {
        let gauge = RandomGauge::new("g");
        let mut recorder = MemoryObservationRecorder::new();
        for _ in 0..200 {
            gauge.observe(&mut recorder, false).unwrap();
        }
        let snapshot = recorder.into_snapshot();
        let recorded = &snapshot.sources[&SourceKey::new("g", 0)];
        let point = recorded.points.values().next().unwrap();
        let value = point.double_value().unwrap();
        assert!((0.0..=100.0).contains(&value));
        assert!(!snapshot.sources.contains_key(&SourceKey::new("g", 1)));
    }

    #[test]
    fn forced_observation_adds_marker_source() {
        let gauge = RandomGauge::new("g");
        let mut recorder = MemoryObservationRecorder::new();
        gauge.observe(&mut recorder, true).unwrap();
        assert_eq!(recorder.into_snapshot().sources.len(), 2);
    }

    #[test]
    fn clients_can_be_placed() {
        let world = DemoWorld::new(&PartitionId::from("overworld"), 1);
        let client = ClientId::new();
        assert!(world.client(client).is_none());
        world.place_client(client, &PartitionId::from("overworld"), Position::new(0.5, 65.0, 0.5));
        assert!(world.client(client).is_some());
        assert_eq!(world.advance(), 1);
        assert_eq!(world.current_tick(), 1);
    }
}
