//! End-to-end tests: one client and one world session, every message
//! passing through the wire codec.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use telemetry_protocol::{
    C2SRequest, ChannelRequestSink, ChannelResponseSink, RequestKind, S2CResponse, TickInterval,
};
use telemetry_sync::{
    ClientView, ObservationContainer, ObservationRecorder, ObserveError, ServerConfig,
    ServerSessions, SweepReport, SyncConfig, SyncManagerClient, SyncManagerServer, WorldView,
};
use telemetry_types::{
    BlockPos, ClientId, Location, PartitionId, SharedSnapshot, SourceKey, WorldId,
};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Default)]
struct Gauge(AtomicI64);

impl Gauge {
    fn set(&self, value: i64) {
        self.0.store(value, Ordering::SeqCst);
    }
}

impl ObservationContainer for Gauge {
    fn observe(
        &self,
        recorder: &mut dyn ObservationRecorder,
        _force: bool,
    ) -> Result<(), ObserveError> {
        let source = SourceKey::new("gauge", 0);
        recorder.on_new_source(&source);
        recorder.record_long(&source, Vec::new(), self.0.load(Ordering::SeqCst));
        Ok(())
    }
}

/// A world with one client standing on one gauge.
struct World {
    tick: AtomicU64,
    client: ClientId,
    location: Location,
    gauge: Arc<Gauge>,
}

impl WorldView for World {
    fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    fn client(&self, client: ClientId) -> Option<ClientView> {
        (client == self.client).then(|| ClientView {
            partition: self.location.partition.clone(),
            position: self.location.pos.center(),
        })
    }

    fn is_loaded(&self, location: &Location) -> bool {
        *location == self.location
    }

    fn container(&self, location: &Location) -> Option<Arc<dyn ObservationContainer>> {
        (*location == self.location).then(|| Arc::clone(&self.gauge) as Arc<dyn ObservationContainer>)
    }
}

struct Harness {
    world: Arc<World>,
    _sessions: ServerSessions,
    server: Arc<SyncManagerServer>,
    client: Arc<SyncManagerClient>,
    requests: UnboundedReceiver<C2SRequest>,
    responses: UnboundedReceiver<S2CResponse>,
}

impl Harness {
    fn new() -> Self {
        let client_id = ClientId::new();
        let world = Arc::new(World {
            tick: AtomicU64::new(0),
            client: client_id,
            location: Location::new(PartitionId::from("overworld"), BlockPos::new(10, 64, -3)),
            gauge: Arc::new(Gauge::default()),
        });

        let sessions = ServerSessions::new(ServerConfig::default());
        let response_sink = Arc::new(ChannelResponseSink::new());
        let responses = response_sink.connect(client_id);
        let server = sessions
            .start(WorldId::new(), Arc::clone(&world) as Arc<dyn WorldView>, response_sink)
            .unwrap();
        server.set_tick_interval(1);

        let (request_sink, requests) = ChannelRequestSink::new();
        let client = SyncManagerClient::new(Arc::new(request_sink), &SyncConfig::default()).unwrap();

        Self {
            world,
            _sessions: sessions,
            server,
            client: Arc::new(client),
            requests,
            responses,
        }
    }

    fn location(&self) -> Location {
        self.world.location.clone()
    }

    /// Deliver every queued request to the server. Returns their kinds.
    fn pump_requests(&mut self) -> Vec<RequestKind> {
        let mut kinds = Vec::new();
        while let Ok(request) = self.requests.try_recv() {
            let decoded = C2SRequest::decode_exact(request.to_bytes().unwrap()).unwrap();
            assert_eq!(decoded, request);
            self.server.handle_request(self.world.client, &decoded);
            kinds.push(decoded.kind);
        }
        kinds
    }

    /// Deliver every queued response to the client. Returns how many.
    fn pump_responses(&mut self) -> usize {
        let mut delivered = 0_usize;
        while let Ok(response) = self.responses.try_recv() {
            let decoded = S2CResponse::decode_exact(response.to_bytes().unwrap()).unwrap();
            self.client.accept_response(&decoded).unwrap();
            delivered += 1;
        }
        delivered
    }

    fn advance(&self) -> Option<SweepReport> {
        let tick = self.world.tick.fetch_add(1, Ordering::SeqCst) + 1;
        self.server.tick(tick)
    }
}

fn gauge_value(snapshot: &SharedSnapshot) -> Option<i64> {
    snapshot
        .sources
        .get(&SourceKey::new("gauge", 0))
        .and_then(|recorded| recorded.points.get(&Vec::new()))
        .and_then(|point| point.long_value())
}

#[tokio::test]
async fn single_request_round_trip() {
    let mut harness = Harness::new();
    harness.world.gauge.set(42);

    let waiter = {
        let client = Arc::clone(&harness.client);
        let location = harness.location();
        tokio::spawn(async move { client.request_single(location).await })
    };
    let mut sent = Vec::new();
    while sent.is_empty() {
        tokio::task::yield_now().await;
        sent = harness.pump_requests();
    }
    assert_eq!(sent, vec![RequestKind::Single]);
    assert_eq!(harness.server.registration_count(), 1);

    let report = harness.advance().unwrap();
    assert_eq!(report.broadcasts, 1);
    assert_eq!(harness.pump_responses(), 1);

    let snapshot = waiter.await.unwrap().unwrap();
    assert_eq!(gauge_value(&snapshot), Some(42));
    assert_eq!(harness.server.registration_count(), 0);
    assert_eq!(harness.client.pending_count(), 0);
}

#[tokio::test]
async fn subscription_streams_until_unsubscribed() {
    let mut harness = Harness::new();
    let location = harness.location();
    let mut stream = harness
        .client
        .request_subscription(location.clone(), TickInterval::new(3).unwrap())
        .unwrap();
    assert_eq!(
        harness.pump_requests(),
        vec![RequestKind::KeepaliveStart(TickInterval::new(3).unwrap())]
    );

    let mut received = Vec::new();
    for value in 1..=12 {
        harness.world.gauge.set(value);
        harness.advance();
        if harness.pump_responses() > 0 {
            received.push(gauge_value(&stream.next().await.unwrap()).unwrap());
        }
    }
    // Registered at tick 0: due after tick 3, then every 4th tick.
    assert_eq!(received, vec![4, 8, 12]);

    assert!(harness.client.unsubscribe(&location).unwrap());
    assert_eq!(harness.pump_requests(), vec![RequestKind::Stop]);
    assert_eq!(harness.server.registration_count(), 0);
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn abandoned_subscription_stops_the_server_registration() {
    let mut harness = Harness::new();
    let location = harness.location();
    let mut stream = harness
        .client
        .request_subscription(location.clone(), TickInterval::new(1).unwrap())
        .unwrap();
    harness.pump_requests();
    harness.advance();
    harness.advance();
    assert_eq!(harness.pump_responses(), 1);
    assert!(stream.next().await.is_some());
    drop(stream);

    tokio::time::sleep(Duration::from_millis(501)).await;
    assert_eq!(harness.pump_requests(), vec![RequestKind::Stop]);
    assert_eq!(harness.server.registration_count(), 0);
    assert_eq!(harness.client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn keepalive_outlives_the_server_expiry_window() {
    let mut harness = Harness::new();
    let location = harness.location();
    let _stream = harness
        .client
        .request_subscription(location.clone(), TickInterval::new(20).unwrap())
        .unwrap();
    harness.pump_requests();

    // Three keepalive periods, with the world ticking 20 times a second.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(60_001)).await;
        harness.world.tick.fetch_add(1200, Ordering::SeqCst);
        assert_eq!(
            harness.pump_requests(),
            vec![RequestKind::Keepalive(TickInterval::new(20).unwrap())]
        );
    }
    harness.advance();
    assert!(harness.server.registration(harness.world.client, &location).is_some());
}
