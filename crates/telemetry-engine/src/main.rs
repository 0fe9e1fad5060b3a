//! Demo engine for the observation subscription sync.
//!
//! Wires one world session and one client connection together over a
//! loopback that runs every message through the wire codec, then
//! exercises both request shapes against a row of random gauges.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `telemetry-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the demo world and place the client next to the first gauge
//! 4. Start the world session and connect the client over the loopback
//! 5. Run the tick loop for `engine.run_ticks` ticks
//! 6. Take one single observation, then subscribe to the last gauge
//! 7. Close the client, stop the session, and join every task

mod error;
mod loopback;
mod world;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use telemetry_protocol::TickInterval;
use telemetry_sync::{LoggingConfig, ServerSessions, SyncConfig, SyncManagerClient, WorldView};
use telemetry_types::{ClientId, Location, PartitionId, SharedSnapshot, WorldId};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::loopback::{WireRequestSink, WireResponseSink, spawn_client_pump, spawn_server_pump};
use crate::world::DemoWorld;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "telemetry-config.yaml";

/// How many sweeps a single request may take before the demo gives up.
const SINGLE_REQUEST_SWEEPS: u32 = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SyncConfig::load_or_default(Path::new(CONFIG_PATH))
        .with_context(|| format!("failed to load {CONFIG_PATH}"))?;
    init_logging(&config.logging)?;

    info!(
        tick_interval = config.server.tick_interval,
        max_age_ticks = config.server.max_age_ticks,
        interaction_range = config.server.interaction_range,
        keepalive_ms = u64::try_from(config.keepalive_period().as_millis()).unwrap_or(u64::MAX),
        "Configuration loaded"
    );

    run(&config).await.context("demo run failed")?;
    info!("telemetry-engine shutdown complete");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured
/// level.
fn init_logging(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| EngineError::Logging {
        message: err.to_string(),
    })
}

#[allow(clippy::too_many_lines)]
async fn run(config: &SyncConfig) -> Result<(), EngineError> {
    // 3. World and client placement.
    let partition = PartitionId::from("overworld");
    let world = Arc::new(DemoWorld::new(&partition, config.engine.gauge_count));
    let locations = world.gauge_locations();
    let first = locations.first().cloned().ok_or(EngineError::NoGauges)?;
    let watched = locations.last().cloned().unwrap_or_else(|| first.clone());
    let client_id = ClientId::new();
    world.place_client(client_id, &partition, first.pos.center());
    info!(gauges = locations.len(), client = %client_id, "Demo world created");

    // 4. Session and loopback connection.
    let sessions = Arc::new(ServerSessions::new(config.server.clone()));
    let world_id = WorldId::new();
    let response_sink = Arc::new(WireResponseSink::new());
    let response_frames = response_sink.connect(client_id);
    let server = sessions.start(
        world_id,
        Arc::clone(&world) as Arc<dyn WorldView>,
        response_sink,
    )?;

    let (request_sink, request_frames) = WireRequestSink::new();
    let client = Arc::new(SyncManagerClient::new(Arc::new(request_sink), config)?);

    let token = CancellationToken::new();
    let server_pump = spawn_server_pump(request_frames, client_id, server, token.clone());
    let client_pump = spawn_client_pump(response_frames, Arc::clone(&client), token.clone());

    // 5. Tick loop.
    let mut ticker = spawn_tick_loop(
        Arc::clone(&world),
        Arc::clone(&sessions),
        config.client.tick_duration(),
        config.engine.run_ticks,
        token.clone(),
    );

    // 6a. One single observation.
    let patience = config
        .client
        .tick_duration()
        .checked_mul(config.server.tick_interval.saturating_mul(SINGLE_REQUEST_SWEEPS))
        .unwrap_or(Duration::from_secs(5));
    match tokio::time::timeout(patience, client.request_single(first.clone())).await {
        Ok(Ok(snapshot)) => log_snapshot("Single observation received", &first, &snapshot),
        Ok(Err(err)) => warn!(location = %first, error = %err, "single observation failed"),
        Err(_elapsed) => warn!(location = %first, "single observation timed out"),
    }

    // 6b. A subscription until the tick loop runs out.
    let interval = TickInterval::new(config.engine.subscribe_interval)?;
    let mut stream = client.request_subscription(watched.clone(), interval)?;
    info!(location = %watched, interval = %interval, "Subscribed");
    let mut updates = 0_u64;
    let ticks = loop {
        tokio::select! {
            biased;
            joined = &mut ticker => break joined.unwrap_or(0),
            next = stream.next() => match next {
                Some(snapshot) => {
                    updates = updates.saturating_add(1);
                    log_snapshot("Subscription update", &watched, &snapshot);
                }
                None => {
                    warn!(location = %watched, "subscription ended early");
                    token.cancel();
                    break (&mut ticker).await.unwrap_or(0);
                }
            },
        }
    };
    info!(ticks, updates, "Tick loop finished");
    drop(stream);

    // 7. Shutdown.
    let closed = client.close();
    let stopped = sessions.stop(world_id);
    token.cancel();
    for (name, task) in [("server pump", server_pump), ("client pump", client_pump)] {
        if let Err(err) = task.await {
            warn!(task = name, error = %err, "task did not finish cleanly");
        }
    }
    closed?;
    stopped?;
    Ok(())
}

/// Advance the world and forward each tick to every session, `run_ticks`
/// times or until cancelled. Returns the number of ticks run.
fn spawn_tick_loop(
    world: Arc<DemoWorld>,
    sessions: Arc<ServerSessions>,
    tick_duration: Duration,
    run_ticks: u64,
    token: CancellationToken,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ran = 0_u64;
        while ran < run_ticks {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            let tick = world.advance();
            for (world_id, report) in sessions.tick_all() {
                debug!(
                    world = %world_id,
                    tick,
                    locations = report.locations,
                    broadcasts = report.broadcasts,
                    removed = report.removed,
                    failures = report.failures,
                    "Sweep"
                );
            }
            ran = ran.saturating_add(1);
        }
        ran
    })
}

fn log_snapshot(message: &str, location: &Location, snapshot: &SharedSnapshot) {
    for (source, recorded) in &snapshot.sources {
        for (attributes, point) in &recorded.points {
            info!(
                location = %location,
                source = %source,
                attributes = attributes.len(),
                long = ?point.long_value(),
                double = ?point.double_value(),
                "{message}"
            );
        }
    }
}
