//! Single-writer event loop that owns every game table

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{ActivationMode, GameConfig};
use crate::ws::protocol::ServerMsg;

use super::registry::{ConnectionRegistry, Outbound};
use super::respawn::RespawnScheduler;
use super::spawn::SpawnCycle;
use super::world::{PlayerPhase, PlayerRecord, WorldState};
use super::{ServerEvent, SessionId};

/// Depth of the shared event queue
const EVENT_QUEUE_DEPTH: usize = 1024;

/// Counters published by the event loop for the health endpoint
#[derive(Debug, Default)]
pub struct ServerStats {
    sessions: AtomicUsize,
    alive_players: AtomicUsize,
}

impl ServerStats {
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn alive_players(&self) -> usize {
        self.alive_players.load(Ordering::Relaxed)
    }
}

/// Cloneable entry point used by socket tasks
#[derive(Clone)]
pub struct GameHandle {
    events: mpsc::Sender<ServerEvent>,
    stats: Arc<ServerStats>,
    outbound_buffer: usize,
}

impl GameHandle {
    /// Register a socket and wait for its session id
    pub async fn connect(&self, outbound: Outbound) -> Option<SessionId> {
        let (reply, reply_rx) = oneshot::channel();
        self.events
            .send(ServerEvent::Connect { outbound, reply })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Forward a text frame. Returns false once the event loop is gone.
    pub async fn inbound(&self, id: SessionId, text: String) -> bool {
        self.events
            .send(ServerEvent::Inbound { id, text })
            .await
            .is_ok()
    }

    pub async fn disconnect(&self, id: SessionId) {
        if self
            .events
            .send(ServerEvent::Disconnect { id })
            .await
            .is_err()
        {
            warn!(session_id = id, "Event loop gone, disconnect not delivered");
        }
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Queue depth to use for a new connection's outbound channel
    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }
}

/// The authoritative game server
pub struct GameServer {
    pub(super) config: GameConfig,
    pub(super) registry: ConnectionRegistry,
    pub(super) world: WorldState,
    pub(super) spawns: SpawnCycle,
    pub(super) respawns: RespawnScheduler,
    events: mpsc::Receiver<ServerEvent>,
    stats: Arc<ServerStats>,
}

impl GameServer {
    /// Create the server and the handle that feeds it
    pub fn new(config: GameConfig) -> (Self, GameHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let stats = Arc::new(ServerStats::default());

        let handle = GameHandle {
            events: events_tx.clone(),
            stats: stats.clone(),
            outbound_buffer: config.outbound_buffer,
        };

        let server = Self {
            spawns: SpawnCycle::carriers(config.carrier_distance, config.carrier_altitude),
            respawns: RespawnScheduler::new(config.respawn_delay, events_tx),
            registry: ConnectionRegistry::new(),
            world: WorldState::new(),
            events: events_rx,
            stats,
            config,
        };

        (server, handle)
    }

    /// Process events for the life of the process. The respawn scheduler holds
    /// its own sender, so the queue never closes while the server exists.
    pub async fn run(mut self) {
        info!(
            activation = ?self.config.activation,
            respawn_delay_ms = self.config.respawn_delay.as_millis() as u64,
            "Game server started"
        );

        while let Some(event) = self.events.recv().await {
            self.handle_event(event);
        }
    }

    /// Apply one event to completion, including every resulting send
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connect { outbound, reply } => {
                let id = self.connect(outbound);
                if reply.send(id).is_err() {
                    // Socket task vanished before learning its id
                    self.disconnect(id);
                }
            }
            ServerEvent::Inbound { id, text } => self.handle_inbound(id, &text),
            ServerEvent::Disconnect { id } => self.disconnect(id),
            ServerEvent::RespawnDue { id, ticket } => self.respawn(id, ticket),
        }
        self.publish_stats();
    }

    /// Accept a connection: assign an id, create its record, greet it
    pub fn connect(&mut self, outbound: Outbound) -> SessionId {
        let id = self.registry.register(outbound);
        let record = self.world.create(id, self.config.default_plane);

        self.registry.send(id, &ServerMsg::YourId { id });

        match self.config.activation {
            ActivationMode::Gated => {
                info!(
                    session_id = id,
                    total = self.registry.len(),
                    "Client connected, awaiting plane selection"
                );
            }
            ActivationMode::Immediate => {
                let spawn = self.spawns.next();
                record.spawn_at(&spawn, self.config.max_health);
                let player = record.clone();

                info!(
                    session_id = id,
                    x = spawn.x,
                    z = spawn.z,
                    total = self.registry.len(),
                    "Client connected and spawned"
                );

                self.registry.send(
                    id,
                    &ServerMsg::GameState {
                        state: self.world.snapshot(),
                    },
                );
                self.registry
                    .broadcast(&ServerMsg::PlayerJoined { player }, Some(id));
            }
        }

        id
    }

    /// Tear a session down: registry, record and timer go in one step
    pub fn disconnect(&mut self, id: SessionId) {
        if !self.registry.unregister(id) {
            debug!(session_id = id, "Disconnect for unknown session");
            return;
        }

        self.world.delete(id);
        if self.respawns.cancel(id) {
            debug!(session_id = id, "Cancelled respawn timer");
        }

        info!(
            session_id = id,
            remaining = self.registry.len(),
            "Client disconnected"
        );

        self.registry.broadcast(&ServerMsg::PlayerLeft { id }, None);
    }

    /// Revive a dead player at the next carrier
    fn respawn(&mut self, id: SessionId, ticket: u64) {
        if !self.respawns.take_due(id, ticket) {
            debug!(session_id = id, ticket, "Stale respawn timer ignored");
            return;
        }

        let Some(record) = self.world.get_mut(id) else {
            debug!(session_id = id, "Respawn skipped, player disconnected");
            return;
        };
        if record.phase != PlayerPhase::Dead {
            debug!(session_id = id, "Respawn skipped, player not dead");
            return;
        }

        let spawn = self.spawns.next();
        record.spawn_at(&spawn, self.config.max_health);
        let player = record.clone();

        info!(session_id = id, x = spawn.x, z = spawn.z, "Player respawned");

        self.registry
            .broadcast(&ServerMsg::PlayerUpdate { player }, None);
    }

    fn publish_stats(&self) {
        self.stats
            .sessions
            .store(self.registry.len(), Ordering::Relaxed);
        self.stats
            .alive_players
            .store(self.world.alive_count(), Ordering::Relaxed);
    }

    /// Snapshot for a client entering play, filtered in gated mode
    pub(super) fn snapshot_for(&self, id: SessionId) -> BTreeMap<SessionId, PlayerRecord> {
        match self.config.activation {
            ActivationMode::Gated => self.world.snapshot_for(id),
            ActivationMode::Immediate => self.world.snapshot(),
        }
    }
}
