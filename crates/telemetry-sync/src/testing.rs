//! In-memory world used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use telemetry_types::{
    BlockPos, ClientId, Location, ObservationPoint, PartitionId, Position, SharedSnapshot,
    SourceKey,
};

use crate::error::ObserveError;
use crate::server::recorder::{MemoryObservationRecorder, ObservationRecorder};
use crate::server::world::{ClientView, ObservationContainer, WorldView};

pub(crate) fn overworld(x: i32, y: i32, z: i32) -> Location {
    Location::new(PartitionId::from("overworld"), BlockPos::new(x, y, z))
}

/// Snapshot with a single `counter` reading of `value`.
pub(crate) fn counter_snapshot(value: i64) -> SharedSnapshot {
    let mut recorder = MemoryObservationRecorder::new();
    let source = SourceKey::new("counter", 0);
    recorder.on_new_source(&source);
    recorder.record_long(&source, Vec::new(), value);
    Arc::new(recorder.into_snapshot())
}

/// The `counter` reading of a snapshot, if present.
pub(crate) fn counter_value(snapshot: &SharedSnapshot) -> Option<i64> {
    snapshot
        .sources
        .get(&SourceKey::new("counter", 0))
        .and_then(|recorded| recorded.points.get(&Vec::new()))
        .and_then(ObservationPoint::long_value)
}

/// Container with one `counter` source that records how often it was
/// observed.
#[derive(Debug, Default)]
pub(crate) struct CountingContainer {
    observed: AtomicU64,
    fail: bool,
}

impl CountingContainer {
    pub(crate) fn failing() -> Self {
        Self {
            observed: AtomicU64::new(0),
            fail: true,
        }
    }

    pub(crate) fn observed(&self) -> u64 {
        self.observed.load(Ordering::SeqCst)
    }
}

impl ObservationContainer for CountingContainer {
    fn observe(
        &self,
        recorder: &mut dyn ObservationRecorder,
        _force: bool,
    ) -> Result<(), ObserveError> {
        if self.fail {
            return Err(ObserveError::Unavailable {
                reason: "broken".to_owned(),
            });
        }
        let count = self.observed.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let source = SourceKey::new("counter", 0);
        recorder.on_new_source(&source);
        recorder.record_long(&source, Vec::new(), i64::try_from(count).unwrap_or(i64::MAX));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct TestWorld {
    tick: AtomicU64,
    clients: Mutex<HashMap<ClientId, ClientView>>,
    loaded: Mutex<HashSet<Location>>,
    containers: Mutex<HashMap<Location, Arc<dyn ObservationContainer>>>,
}

impl TestWorld {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_tick(&self, tick: u64) {
        self.tick.store(tick, Ordering::SeqCst);
    }

    pub(crate) fn place_client(&self, client: ClientId, partition: &str, position: Position) {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).insert(
            client,
            ClientView {
                partition: PartitionId::from(partition),
                position,
            },
        );
    }

    /// Place `client` on top of `location`.
    pub(crate) fn place_client_at(&self, client: ClientId, location: &Location) {
        self.place_client(client, location.partition.as_str(), location.pos.center());
    }

    pub(crate) fn remove_client(&self, client: ClientId) {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).remove(&client);
    }

    pub(crate) fn load(&self, location: &Location) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.clone());
    }

    pub(crate) fn unload(&self, location: &Location) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(location);
    }

    /// Load `location` and put a [`CountingContainer`] there.
    pub(crate) fn place_container(&self, location: &Location) -> Arc<CountingContainer> {
        let container = Arc::new(CountingContainer::default());
        self.put_container(location, container.clone());
        container
    }

    pub(crate) fn put_container(&self, location: &Location, container: Arc<dyn ObservationContainer>) {
        self.load(location);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.clone(), container);
    }

    pub(crate) fn remove_container(&self, location: &Location) {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(location);
    }
}

impl WorldView for TestWorld {
    fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    fn client(&self, client: ClientId) -> Option<ClientView> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client)
            .cloned()
    }

    fn is_loaded(&self, location: &Location) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(location)
    }

    fn container(&self, location: &Location) -> Option<Arc<dyn ObservationContainer>> {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
    }
}
