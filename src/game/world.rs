//! World state store - the authoritative record for every session

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::util::time::unix_millis;
use crate::ws::protocol::{PlaneType, StateUpdate};

use super::spawn::SpawnPoint;
use super::SessionId;

/// Where a player is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    /// Connected, waiting for `select_plane`
    Pending,
    /// Flying
    Alive,
    /// Shot down, waiting for respawn
    Dead,
}

/// Authoritative player state, serialized as-is on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRecord {
    pub id: SessionId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(rename = "rotY")]
    pub rot_y: f64,
    #[serde(rename = "rotZ")]
    pub rot_z: f64,
    pub health: i32,
    pub kills: u32,
    #[serde(rename = "isAlive")]
    pub is_alive: bool,
    #[serde(rename = "planeType")]
    pub plane_type: PlaneType,
    pub last_update: u64,

    #[serde(skip)]
    pub phase: PlayerPhase,
}

impl PlayerRecord {
    /// A record parked at the origin until the client picks an aircraft
    pub fn pending(id: SessionId, plane_type: PlaneType) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            rot_y: 0.0,
            rot_z: 0.0,
            health: 0,
            kills: 0,
            is_alive: false,
            plane_type,
            last_update: unix_millis(),
            phase: PlayerPhase::Pending,
        }
    }

    /// Place at a spawn point with full health
    pub fn spawn_at(&mut self, spawn: &SpawnPoint, max_health: i32) {
        self.x = spawn.x;
        self.y = spawn.y;
        self.z = spawn.z;
        self.rot_y = spawn.facing;
        self.rot_z = 0.0;
        self.health = max_health;
        self.is_alive = true;
        self.phase = PlayerPhase::Alive;
        self.last_update = unix_millis();
    }

    /// Overwrite the fields present in a client pose update
    pub fn apply_update(&mut self, update: &StateUpdate) {
        self.x = update.x.unwrap_or(self.x);
        self.y = update.y.unwrap_or(self.y);
        self.z = update.z.unwrap_or(self.z);
        self.rot_y = update.rot_y.unwrap_or(self.rot_y);
        self.rot_z = update.rot_z.unwrap_or(self.rot_z);
        self.last_update = unix_millis();
    }

    /// Subtract damage, clamped at zero. Returns true if this killed the player.
    pub fn take_damage(&mut self, damage: i32) -> bool {
        self.health = self.health.saturating_sub(damage).max(0);
        if self.health == 0 {
            self.kill();
            true
        } else {
            false
        }
    }

    /// Mark as dead with zero health
    pub fn kill(&mut self) {
        self.health = 0;
        self.is_alive = false;
        self.phase = PlayerPhase::Dead;
        self.last_update = unix_millis();
    }

    pub fn is_pending(&self) -> bool {
        self.phase == PlayerPhase::Pending
    }
}

/// Mapping from session id to player record
#[derive(Debug, Default)]
pub struct WorldState {
    players: HashMap<SessionId, PlayerRecord>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending record for a new session and return it
    pub fn create(&mut self, id: SessionId, plane_type: PlaneType) -> &mut PlayerRecord {
        self.players
            .entry(id)
            .or_insert_with(|| PlayerRecord::pending(id, plane_type))
    }

    pub fn get(&self, id: SessionId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut PlayerRecord> {
        self.players.get_mut(&id)
    }

    pub fn delete(&mut self, id: SessionId) -> Option<PlayerRecord> {
        self.players.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Count players currently flying
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive).count()
    }

    /// Every record, keyed by id
    pub fn snapshot(&self) -> BTreeMap<SessionId, PlayerRecord> {
        self.players
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }

    /// Alive records plus the requester's own, whatever its state
    pub fn snapshot_for(&self, requester: SessionId) -> BTreeMap<SessionId, PlayerRecord> {
        self.players
            .iter()
            .filter(|(id, record)| record.is_alive || **id == requester)
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }
}
