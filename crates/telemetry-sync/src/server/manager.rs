//! Server-side registration table and tick sweep.
//!
//! Registrations are stored per partition, per block, per client. Request
//! handlers arrive from network threads and take the table's *read* lock;
//! they only ever touch one (partition, block) entry at a time through the
//! concurrent maps' entry API, so any number of them can run side by side.
//! The sweep takes the *write* lock for its whole pass, so no handler ever
//! observes a half-swept table.
//!
//! The sweep runs once every `tick_interval` calls to [`SyncManagerServer::tick`].
//! For each registration it:
//!
//! 1. drops it if the location no longer hosts a container, or the client
//!    may no longer interact with it;
//! 2. marks the client due if the tick passed `next_update_tick`;
//! 3. drops it if the tick passed `expiry_tick` (a due, expired one-shot
//!    registration still fires first).
//!
//! All due clients of one location share a single observation and a single
//! broadcast. Locations and partitions left without registrations are
//! pruned. A failure at one location is logged and counted, and the sweep
//! moves on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use telemetry_protocol::{C2SRequest, RequestKind, ResponseSink, S2CResponse, TickInterval};
use telemetry_types::{BlockPos, ClientId, Location, PartitionId};
use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::error::SyncError;
use crate::server::limits::{InteractionLimits, RequestChecks};
use crate::server::recorder::MemoryObservationRecorder;
use crate::server::registration::Registration;
use crate::server::world::WorldView;

type ClientRegistrations = HashMap<ClientId, Registration>;
type BlockTable = DashMap<BlockPos, ClientRegistrations>;
type PartitionTable = DashMap<PartitionId, BlockTable>;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// The tick the sweep ran at.
    pub tick: u64,
    /// Locations visited.
    pub locations: usize,
    /// Registrations dropped (invalid, expired, or fired one-shots).
    pub removed: usize,
    /// Observations taken and broadcast.
    pub broadcasts: usize,
    /// Clients that were sent a response.
    pub notified: usize,
    /// Locations whose observation or broadcast failed.
    pub failures: usize,
}

/// Authoritative-side manager for one running world.
pub struct SyncManagerServer {
    world: Arc<dyn WorldView>,
    sink: Arc<dyn ResponseSink>,
    limits: InteractionLimits,
    max_age_ticks: u64,
    tick_interval: AtomicU32,
    cooldown_remaining: AtomicU32,
    table: RwLock<PartitionTable>,
}

impl std::fmt::Debug for SyncManagerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManagerServer")
            .field("limits", &self.limits)
            .field("max_age_ticks", &self.max_age_ticks)
            .field("tick_interval", &self.tick_interval())
            .field("registrations", &self.registration_count())
            .finish_non_exhaustive()
    }
}

impl SyncManagerServer {
    /// Create a manager for `world` that sends responses through `sink`.
    pub fn new(world: Arc<dyn WorldView>, sink: Arc<dyn ResponseSink>, config: &ServerConfig) -> Self {
        Self {
            world,
            sink,
            limits: InteractionLimits::new(config.interaction_range),
            max_age_ticks: config.max_age_ticks,
            tick_interval: AtomicU32::new(config.tick_interval.max(1)),
            cooldown_remaining: AtomicU32::new(0),
            table: RwLock::new(DashMap::new()),
        }
    }

    /// The interaction limits requests are checked against.
    pub const fn limits(&self) -> &InteractionLimits {
        &self.limits
    }

    /// Ticks between two sweeps.
    pub fn tick_interval(&self) -> u32 {
        self.tick_interval.load(Ordering::Acquire)
    }

    /// Change the ticks between two sweeps. The remaining cooldown is
    /// clamped to the new interval, so shortening it takes effect at once.
    pub fn set_tick_interval(&self, interval: u32) {
        let interval = interval.max(1);
        self.tick_interval.store(interval, Ordering::Release);
        let _ = self
            .cooldown_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                Some(remaining.min(interval))
            });
    }

    /// Make the next call to [`SyncManagerServer::tick`] sweep.
    pub fn clear_cooldown(&self) {
        self.cooldown_remaining.store(0, Ordering::Release);
    }

    fn read_table(&self) -> std::sync::RwLockReadGuard<'_, PartitionTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `transform` to the registration of `client` at `location`.
    /// Returning `None` removes it; an emptied block entry is dropped.
    fn update_registration(
        &self,
        client: ClientId,
        location: &Location,
        transform: impl FnOnce(Option<Registration>) -> Option<Registration>,
    ) {
        let table = self.read_table();
        let blocks = table.entry(location.partition.clone()).or_default();
        match blocks.entry(location.pos) {
            Entry::Occupied(mut occupied) => {
                let clients = occupied.get_mut();
                let current = clients.remove(&client);
                if let Some(updated) = transform(current) {
                    clients.insert(client, updated);
                }
                if clients.is_empty() {
                    occupied.remove();
                }
            }
            Entry::Vacant(vacant) => {
                if let Some(created) = transform(None) {
                    vacant.insert(HashMap::from([(client, created)]));
                }
            }
        }
    }

    fn remove_registration(&self, client: ClientId, location: &Location) -> bool {
        let table = self.read_table();
        let Some(blocks) = table.get(&location.partition) else {
            return false;
        };
        let Entry::Occupied(mut occupied) = blocks.entry(location.pos) else {
            return false;
        };
        let removed = occupied.get_mut().remove(&client).is_some();
        if occupied.get().is_empty() {
            occupied.remove();
        }
        removed
    }

    /// Drop any registration of `client` at `location`. Idempotent.
    /// Returns whether a registration was removed.
    pub fn handle_stop(&self, client: ClientId, location: &Location) -> bool {
        trace!(client = %client, location = %location, "received stop");
        self.remove_registration(client, location)
    }

    /// Register a one-shot observation, fired on the next sweep. A refused
    /// request acts as a stop. Returns whether the request was accepted.
    pub fn handle_single(&self, client: ClientId, location: &Location) -> bool {
        if !self.limits.can_interact(&*self.world, client, location, RequestChecks::ALL) {
            self.remove_registration(client, location);
            return false;
        }
        trace!(client = %client, location = %location, "received single");
        let now = self.world.current_tick();
        self.update_registration(client, location, |existing| {
            Some(existing.map_or_else(
                || Registration::single(client, now),
                |mut registration| {
                    registration.fire_next_sweep(now);
                    registration
                },
            ))
        });
        true
    }

    /// Begin or restart a subscription. The container does not have to
    /// exist yet. A refused request acts as a stop.
    pub fn handle_start(&self, client: ClientId, location: &Location, interval: TickInterval) -> bool {
        if !self.limits.can_interact(&*self.world, client, location, RequestChecks::RELAXED) {
            self.remove_registration(client, location);
            return false;
        }
        trace!(client = %client, location = %location, interval = interval.get(), "received start");
        self.upsert_subscription(client, location, interval);
        true
    }

    /// Renew a subscription, creating it if the server forgot it. A refused
    /// request acts as a stop.
    pub fn handle_keepalive(&self, client: ClientId, location: &Location, interval: TickInterval) -> bool {
        if !self.limits.can_interact(&*self.world, client, location, RequestChecks::ALL) {
            self.remove_registration(client, location);
            return false;
        }
        trace!(client = %client, location = %location, interval = interval.get(), "received keepalive");
        self.upsert_subscription(client, location, interval);
        true
    }

    fn upsert_subscription(&self, client: ClientId, location: &Location, interval: TickInterval) {
        let now = self.world.current_tick();
        let max_age = self.max_age_ticks;
        self.update_registration(client, location, |existing| {
            Some(existing.map_or_else(
                || Registration::subscription(client, interval, now, max_age),
                |mut registration| {
                    registration.renew(interval, now, max_age);
                    registration
                },
            ))
        });
    }

    /// Dispatch a decoded request from `client`. Returns whether the
    /// registration exists afterwards.
    pub fn handle_request(&self, client: ClientId, request: &C2SRequest) -> bool {
        let location = &request.location;
        match request.kind {
            RequestKind::Stop => {
                self.handle_stop(client, location);
                false
            }
            RequestKind::Single => self.handle_single(client, location),
            RequestKind::KeepaliveStart(interval) => self.handle_start(client, location, interval),
            RequestKind::Keepalive(interval) => self.handle_keepalive(client, location, interval),
        }
    }

    /// Drive the manager from the world's tick loop. Sweeps once every
    /// `tick_interval` calls and returns the report, or `None` while
    /// cooling down.
    pub fn tick(&self, current_tick: u64) -> Option<SweepReport> {
        let interval = self.tick_interval();
        let previous = self
            .cooldown_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                Some(remaining.checked_sub(1).unwrap_or_else(|| interval.saturating_sub(1)))
            })
            .unwrap_or_else(std::convert::identity);
        if previous != 0 {
            return None;
        }
        Some(self.sweep(current_tick))
    }

    /// [`SyncManagerServer::tick`] at the world's own current tick.
    pub fn tick_world(&self) -> Option<SweepReport> {
        self.tick(self.world.current_tick())
    }

    fn sweep(&self, current_tick: u64) -> SweepReport {
        let table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut report = SweepReport {
            tick: current_tick,
            ..SweepReport::default()
        };
        table.retain(|partition, blocks| {
            blocks.retain(|pos, clients| {
                let location = Location::new(partition.clone(), *pos);
                report.locations = report.locations.saturating_add(1);
                self.sweep_location(current_tick, &location, clients, &mut report);
                !clients.is_empty()
            });
            !blocks.is_empty()
        });
        debug!(
            tick = current_tick,
            locations = report.locations,
            removed = report.removed,
            broadcasts = report.broadcasts,
            failures = report.failures,
            "observation sweep complete"
        );
        report
    }

    fn sweep_location(
        &self,
        current_tick: u64,
        location: &Location,
        clients: &mut ClientRegistrations,
        report: &mut SweepReport,
    ) {
        if clients.is_empty() {
            return;
        }
        if !self.limits.is_interactable(&*self.world, location) {
            trace!(
                count = clients.len(),
                location = %location,
                "removing registrations because the location is no longer valid"
            );
            report.removed = report.removed.saturating_add(clients.len());
            clients.clear();
            return;
        }

        let mut due = Vec::new();
        clients.retain(|client, registration| {
            if !self
                .limits
                .can_interact(&*self.world, *client, location, RequestChecks::ALL)
            {
                trace!(client = %client, location = %location, "removing registration that is no longer valid");
                report.removed = report.removed.saturating_add(1);
                return false;
            }
            if registration.poll_due(current_tick) {
                trace!(client = %client, location = %location, "scheduling client for payload");
                due.push(*client);
            }
            if registration.is_expired(current_tick) {
                trace!(client = %client, location = %location, interval = %registration.interval, "removing expired registration");
                report.removed = report.removed.saturating_add(1);
                return false;
            }
            true
        });

        if due.is_empty() {
            return;
        }
        match self.broadcast(current_tick, location, &due) {
            Ok(true) => {
                report.broadcasts = report.broadcasts.saturating_add(1);
                report.notified = report.notified.saturating_add(due.len());
            }
            Ok(false) => {}
            Err(err) => {
                report.failures = report.failures.saturating_add(1);
                warn!(location = %location, clients = due.len(), error = %err, "failed to send observations");
            }
        }
    }

    /// Observe `location` once and send the result to every client in
    /// `clients`. Returns `false` when there was nothing to observe.
    fn broadcast(
        &self,
        current_tick: u64,
        location: &Location,
        clients: &[ClientId],
    ) -> Result<bool, SyncError> {
        let Some(container) = self.world.container(location) else {
            return Ok(false);
        };
        let mut recorder = MemoryObservationRecorder::new();
        container.observe(&mut recorder, true)?;
        let snapshot = recorder.into_snapshot();
        trace!(
            points = snapshot.point_count(),
            location = %location,
            clients = clients.len(),
            "sending observation points"
        );
        let response = S2CResponse::new(
            location.clone(),
            Arc::new(snapshot),
            i64::try_from(current_tick).ok(),
        );
        self.sink.send_to_clients(clients, &response)?;
        Ok(true)
    }

    /// Drop every registration. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let count = count_registrations(&table);
        table.clear();
        count
    }

    /// Number of live registrations across all partitions.
    pub fn registration_count(&self) -> usize {
        count_registrations(&self.read_table())
    }

    /// Number of locations with at least one registration.
    pub fn location_count(&self) -> usize {
        self.read_table().iter().map(|blocks| blocks.len()).sum()
    }

    /// Number of partitions with at least one registration.
    pub fn partition_count(&self) -> usize {
        self.read_table().len()
    }

    /// A copy of the registration of `client` at `location`, if any.
    pub fn registration(&self, client: ClientId, location: &Location) -> Option<Registration> {
        let table = self.read_table();
        let blocks = table.get(&location.partition)?;
        let clients = blocks.get(&location.pos)?;
        clients.get(&client).cloned()
    }
}

fn count_registrations(table: &PartitionTable) -> usize {
    table
        .iter()
        .map(|blocks| blocks.iter().map(|clients| clients.len()).sum::<usize>())
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use telemetry_protocol::TransportError;
    use telemetry_types::Position;

    use super::*;
    use crate::server::registration::UpdateInterval;
    use crate::testing::{CountingContainer, TestWorld, overworld};

    #[derive(Debug, Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(Vec<ClientId>, S2CResponse)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn batches(&self) -> Vec<(Vec<ClientId>, S2CResponse)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ResponseSink for RecordingSink {
        fn send_to_clients(
            &self,
            clients: &[ClientId],
            response: &S2CResponse,
        ) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.sent.lock().unwrap().push((clients.to_vec(), response.clone()));
            Ok(())
        }
    }

    struct Fixture {
        world: Arc<TestWorld>,
        sink: Arc<RecordingSink>,
        manager: SyncManagerServer,
    }

    fn fixture_with(config: &ServerConfig, sink: RecordingSink) -> Fixture {
        let world = Arc::new(TestWorld::new());
        let sink = Arc::new(sink);
        let manager = SyncManagerServer::new(world.clone(), sink.clone(), config);
        Fixture { world, sink, manager }
    }

    fn fixture() -> Fixture {
        fixture_with(&ServerConfig::default(), RecordingSink::default())
    }

    fn every(ticks: u32) -> TickInterval {
        TickInterval::new(ticks).unwrap()
    }

    /// Sweep on every call to `tick`.
    fn sweep_at(f: &Fixture, tick: u64) -> SweepReport {
        f.world.set_tick(tick);
        f.manager.clear_cooldown();
        f.manager.tick(tick).unwrap()
    }

    #[test]
    fn stop_is_idempotent() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        assert!(!f.manager.handle_stop(client, &location));

        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        assert!(f.manager.handle_start(client, &location, every(20)));
        assert!(f.manager.handle_stop(client, &location));
        assert!(!f.manager.handle_stop(client, &location));
        assert_eq!(f.manager.registration_count(), 0);
        assert_eq!(f.manager.location_count(), 0);
    }

    #[test]
    fn single_fires_once_and_is_pruned() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(3, 64, 3);
        let container = f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        f.world.set_tick(100);

        assert!(f.manager.handle_single(client, &location));
        let report = sweep_at(&f, 100);

        assert_eq!(report.broadcasts, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(container.observed(), 1);
        assert_eq!(f.manager.registration_count(), 0);
        assert_eq!(f.manager.partition_count(), 0);

        let batches = f.sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, vec![client]);
        assert_eq!(batches[0].1.server_tick, Some(100));
        assert_eq!(batches[0].1.location, location);

        assert_eq!(sweep_at(&f, 101).broadcasts, 0);
    }

    #[test]
    fn refused_single_removes_existing_registration() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        assert!(f.manager.handle_start(client, &location, every(20)));

        f.world.place_client(client, "overworld", Position::new(500.0, 64.0, 0.0));
        assert!(!f.manager.handle_single(client, &location));
        assert_eq!(f.manager.registration(client, &location), None);
    }

    #[test]
    fn start_accepts_missing_container_but_keepalive_does_not() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.load(&location);
        f.world.place_client_at(client, &location);

        assert!(f.manager.handle_start(client, &location, every(20)));
        assert!(!f.manager.handle_keepalive(client, &location, every(20)));
        assert_eq!(f.manager.registration_count(), 0);
    }

    #[test]
    fn subscription_fires_strictly_after_each_interval() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        f.world.set_tick(100);
        assert!(f.manager.handle_start(client, &location, every(20)));

        let fired: Vec<u64> = (100..=170)
            .filter(|tick| sweep_at(&f, *tick).broadcasts == 1)
            .collect();
        assert_eq!(fired, vec![121, 142, 163]);
    }

    #[test]
    fn cooldown_throttles_sweeps() {
        let config = ServerConfig {
            tick_interval: 5,
            ..ServerConfig::default()
        };
        let f = fixture_with(&config, RecordingSink::default());
        let swept: Vec<u64> = (0..12).filter(|tick| f.manager.tick(*tick).is_some()).collect();
        assert_eq!(swept, vec![0, 5, 10]);
    }

    #[test]
    fn shortening_interval_clamps_cooldown() {
        let config = ServerConfig {
            tick_interval: 100,
            ..ServerConfig::default()
        };
        let f = fixture_with(&config, RecordingSink::default());
        assert!(f.manager.tick(0).is_some());
        f.manager.set_tick_interval(2);
        assert!(f.manager.tick(1).is_none());
        assert!(f.manager.tick(2).is_none());
        assert!(f.manager.tick(3).is_some());
        assert!(f.manager.tick(4).is_none());
        assert!(f.manager.tick(5).is_some());
    }

    #[test]
    fn unrenewed_subscription_expires() {
        let config = ServerConfig {
            max_age_ticks: 100,
            ..ServerConfig::default()
        };
        let f = fixture_with(&config, RecordingSink::default());
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        f.world.set_tick(0);
        assert!(f.manager.handle_start(client, &location, every(1000)));

        sweep_at(&f, 100);
        assert_eq!(f.manager.registration_count(), 1);
        let report = sweep_at(&f, 101);
        assert_eq!(report.removed, 1);
        assert_eq!(f.manager.registration_count(), 0);
    }

    #[test]
    fn keepalive_extends_expiry_and_updates_interval() {
        let config = ServerConfig {
            max_age_ticks: 100,
            ..ServerConfig::default()
        };
        let f = fixture_with(&config, RecordingSink::default());
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        f.world.set_tick(0);
        f.manager.handle_start(client, &location, every(1000));

        f.world.set_tick(90);
        assert!(f.manager.handle_keepalive(client, &location, every(10)));
        let registration = f.manager.registration(client, &location).unwrap();
        assert_eq!(registration.expiry_tick, 190);
        assert_eq!(registration.next_update_tick, 100);
        assert_eq!(registration.interval, UpdateInterval::Every(every(10)));

        sweep_at(&f, 150);
        assert_eq!(f.manager.registration_count(), 1);
    }

    #[test]
    fn due_clients_share_one_observation() {
        let f = fixture();
        let location = overworld(0, 64, 0);
        let container = f.world.place_container(&location);
        let clients: Vec<ClientId> = (0..3).map(|_| ClientId::new()).collect();
        f.world.set_tick(10);
        for client in &clients {
            f.world.place_client_at(*client, &location);
            assert!(f.manager.handle_single(*client, &location));
        }

        let report = sweep_at(&f, 10);
        assert_eq!(report.broadcasts, 1);
        assert_eq!(report.notified, 3);
        assert_eq!(container.observed(), 1);
        let mut sent = f.sink.batches()[0].0.clone();
        sent.sort();
        let mut expected = clients;
        expected.sort();
        assert_eq!(sent, expected);
    }

    #[test]
    fn client_walking_away_is_dropped_by_sweep() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        assert!(f.manager.handle_start(client, &location, every(20)));

        f.world.place_client(client, "overworld", Position::new(40.5, 64.0, 0.5));
        let report = sweep_at(&f, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(f.manager.registration_count(), 0);
    }

    #[test]
    fn removed_container_drops_every_registration() {
        let f = fixture();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        for _ in 0..2 {
            let client = ClientId::new();
            f.world.place_client_at(client, &location);
            f.manager.handle_start(client, &location, every(20));
        }
        f.world.remove_container(&location);
        let report = sweep_at(&f, 1);
        assert_eq!(report.removed, 2);
        assert_eq!(f.manager.location_count(), 0);
    }

    #[test]
    fn failure_at_one_location_does_not_stop_the_sweep() {
        let f = fixture();
        let client = ClientId::new();
        let broken = overworld(0, 64, 0);
        let healthy = overworld(1, 64, 1);
        f.world.put_container(&broken, Arc::new(CountingContainer::failing()));
        let container = f.world.place_container(&healthy);
        f.world.place_client_at(client, &broken);
        f.manager.handle_single(client, &broken);
        f.manager.handle_single(client, &healthy);

        let report = sweep_at(&f, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(report.broadcasts, 1);
        assert_eq!(container.observed(), 1);
    }

    #[test]
    fn transport_failure_is_counted() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let f = fixture_with(&ServerConfig::default(), sink);
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        f.manager.handle_single(client, &location);
        assert_eq!(sweep_at(&f, 1).failures, 1);
        assert_eq!(f.manager.registration_count(), 0);
    }

    #[test]
    fn single_on_subscription_fires_without_resetting_interval() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);
        f.world.set_tick(0);
        f.manager.handle_start(client, &location, every(1000));

        f.world.set_tick(5);
        f.manager.handle_single(client, &location);
        assert_eq!(sweep_at(&f, 5).broadcasts, 1);
        let registration = f.manager.registration(client, &location).unwrap();
        assert_eq!(registration.interval, UpdateInterval::Every(every(1000)));
        assert_eq!(registration.next_update_tick, 1005);
    }

    #[test]
    fn handle_request_dispatches_by_kind() {
        let f = fixture();
        let client = ClientId::new();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        f.world.place_client_at(client, &location);

        let start = C2SRequest::new(location.clone(), RequestKind::KeepaliveStart(every(20)));
        assert!(f.manager.handle_request(client, &start));
        assert_eq!(f.manager.registration_count(), 1);
        let stop = C2SRequest::new(location, RequestKind::Stop);
        assert!(!f.manager.handle_request(client, &stop));
        assert_eq!(f.manager.registration_count(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let f = fixture();
        let location = overworld(0, 64, 0);
        f.world.place_container(&location);
        let client = ClientId::new();
        f.world.place_client_at(client, &location);
        f.manager.handle_start(client, &location, every(20));
        assert_eq!(f.manager.clear(), 1);
        assert_eq!(f.manager.registration_count(), 0);
    }
}
