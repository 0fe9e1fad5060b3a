//! Running world sessions, one [`SyncManagerServer`] each.
//!
//! The hosting engine owns a [`ServerSessions`] and calls
//! [`ServerSessions::start`] when a world comes up and
//! [`ServerSessions::stop`] when it goes down.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use telemetry_protocol::ResponseSink;
use telemetry_types::WorldId;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::SyncError;
use crate::server::manager::{SweepReport, SyncManagerServer};
use crate::server::world::WorldView;

/// Registry of running world sessions.
#[derive(Debug)]
pub struct ServerSessions {
    config: ServerConfig,
    sessions: DashMap<WorldId, Arc<SyncManagerServer>>,
}

impl ServerSessions {
    /// Create an empty registry. Every session started from it uses
    /// `config`.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Start a session for `world_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] if the world already has one.
    pub fn start(
        &self,
        world_id: WorldId,
        world: Arc<dyn WorldView>,
        sink: Arc<dyn ResponseSink>,
    ) -> Result<Arc<SyncManagerServer>, SyncError> {
        match self.sessions.entry(world_id) {
            Entry::Occupied(_) => Err(SyncError::AlreadyRunning(world_id)),
            Entry::Vacant(vacant) => {
                let manager = Arc::new(SyncManagerServer::new(world, sink, &self.config));
                vacant.insert(Arc::clone(&manager));
                info!(world = %world_id, "observation sync session started");
                Ok(manager)
            }
        }
    }

    /// Stop the session for `world_id`, dropping all of its registrations.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] if no session is running.
    pub fn stop(&self, world_id: WorldId) -> Result<Arc<SyncManagerServer>, SyncError> {
        let (_, manager) = self
            .sessions
            .remove(&world_id)
            .ok_or(SyncError::NotRunning(world_id))?;
        let dropped = manager.clear();
        info!(world = %world_id, dropped, "observation sync session stopped");
        Ok(manager)
    }

    /// The session for `world_id`, if running.
    pub fn get(&self, world_id: WorldId) -> Option<Arc<SyncManagerServer>> {
        self.sessions.get(&world_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Forward one tick to every running session, each at its own world's
    /// current tick. Returns the reports of the sessions that swept.
    pub fn tick_all(&self) -> Vec<(WorldId, SweepReport)> {
        // Collected first so no shard lock is held while sweeping.
        let managers: Vec<(WorldId, Arc<SyncManagerServer>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        let reports: Vec<(WorldId, SweepReport)> = managers
            .into_iter()
            .filter_map(|(world_id, manager)| manager.tick_world().map(|report| (world_id, report)))
            .collect();
        debug!(sessions = self.sessions.len(), swept = reports.len(), "ticked world sessions");
        reports
    }

    /// Number of running sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is running.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use telemetry_protocol::ChannelResponseSink;

    use super::*;
    use crate::testing::TestWorld;

    fn sessions() -> ServerSessions {
        ServerSessions::new(ServerConfig::default())
    }

    fn start(sessions: &ServerSessions, id: WorldId) -> Result<Arc<SyncManagerServer>, SyncError> {
        sessions.start(id, Arc::new(TestWorld::new()), Arc::new(ChannelResponseSink::new()))
    }

    #[test]
    fn start_twice_is_rejected() {
        let sessions = sessions();
        let id = WorldId::new();
        start(&sessions, id).unwrap();
        assert!(matches!(start(&sessions, id), Err(SyncError::AlreadyRunning(w)) if w == id));
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn stop_without_start_is_rejected() {
        let sessions = sessions();
        let id = WorldId::new();
        assert!(matches!(sessions.stop(id), Err(SyncError::NotRunning(_))));
        start(&sessions, id).unwrap();
        sessions.stop(id).unwrap();
        assert!(sessions.get(id).is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn tick_all_reaches_every_session() {
        let sessions = sessions();
        let first = WorldId::new();
        let second = WorldId::new();
        start(&sessions, first).unwrap();
        start(&sessions, second).unwrap();

        let reports = sessions.tick_all();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|(_, report)| report.tick == 0));

        // Both sessions are now cooling down.
        assert!(sessions.tick_all().is_empty());
    }
}
