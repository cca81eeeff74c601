//! Inbound message dispatch for the game server

use tracing::{debug, info, trace, warn};

use crate::ws::protocol::{parse_client_msg, ClientMsg, PlaneType, ServerMsg, StateUpdate};

use super::server::GameServer;
use super::SessionId;

impl GameServer {
    /// Parse and apply one text frame from a session
    pub(super) fn handle_inbound(&mut self, id: SessionId, text: &str) {
        let msg = match parse_client_msg(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session_id = id, error = %e, "Dropped malformed message");
                return;
            }
        };

        if self.world.get(id).is_none() {
            debug!(session_id = id, "Message from unknown or disconnected session");
            return;
        }

        match msg {
            ClientMsg::SelectPlane { plane_type } => self.select_plane(id, plane_type),
            ClientMsg::UpdateState { state } => self.update_state(id, state),
            ClientMsg::HitPlayer { target_id, damage } => self.hit_player(id, target_id, damage),
            ClientMsg::IDied { killer_id } => self.i_died(id, killer_id),
            ClientMsg::FireBullet => {
                trace!(session_id = id, "Bullet fired");
            }
            ClientMsg::Unknown => {
                debug!(session_id = id, "Ignoring unknown message type");
            }
        }
    }

    /// Leave Pending with the chosen aircraft and spawn
    fn select_plane(&mut self, id: SessionId, requested: Option<String>) {
        let allowed = requested
            .as_deref()
            .and_then(PlaneType::from_wire)
            .filter(|plane| self.config.allowed_planes.contains(plane));

        let Some(record) = self.world.get_mut(id) else {
            return;
        };
        if !record.is_pending() {
            debug!(session_id = id, "Plane already selected, ignoring");
            return;
        }

        let plane = match allowed {
            Some(plane) => plane,
            None => {
                warn!(
                    session_id = id,
                    requested = ?requested,
                    fallback = self.config.default_plane.as_str(),
                    "Invalid plane type, using default"
                );
                self.config.default_plane
            }
        };

        let spawn = self.spawns.next();
        record.plane_type = plane;
        record.spawn_at(&spawn, self.config.max_health);
        let player = record.clone();

        info!(
            session_id = id,
            plane = plane.as_str(),
            x = spawn.x,
            z = spawn.z,
            "Player selected plane and spawned"
        );

        self.registry.send(
            id,
            &ServerMsg::GameState {
                state: self.snapshot_for(id),
            },
        );
        self.registry
            .broadcast(&ServerMsg::PlayerJoined { player }, Some(id));
    }

    /// Relay a client pose to everyone else
    fn update_state(&mut self, id: SessionId, update: Option<StateUpdate>) {
        let Some(update) = update else {
            debug!(session_id = id, "update_state without state");
            return;
        };
        let Some(record) = self.world.get_mut(id) else {
            return;
        };
        if !record.is_alive {
            trace!(session_id = id, "Ignoring pose from inactive player");
            return;
        }

        record.apply_update(&update);
        let player = record.clone();

        self.registry
            .broadcast(&ServerMsg::PlayerUpdate { player }, Some(id));
    }

    /// Apply client-reported damage, crediting a kill when it is lethal
    fn hit_player(&mut self, shooter_id: SessionId, target_id: SessionId, raw: Option<f64>) {
        if target_id == shooter_id {
            debug!(session_id = shooter_id, "Ignoring self hit");
            return;
        }
        let Some(damage) = raw.and_then(damage_points) else {
            debug!(session_id = shooter_id, damage = ?raw, "Ignoring invalid damage");
            return;
        };
        if !self.world.get(shooter_id).is_some_and(|p| p.is_alive) {
            debug!(session_id = shooter_id, "Ignoring hit from inactive player");
            return;
        }

        let Some(target) = self.world.get_mut(target_id) else {
            debug!(session_id = shooter_id, target_id, "Hit on unknown player");
            return;
        };
        if !target.is_alive {
            debug!(session_id = shooter_id, target_id, "Hit on inactive player");
            return;
        }

        let killed = target.take_damage(damage);
        let victim = target.clone();

        info!(
            session_id = shooter_id,
            target_id,
            damage,
            health = victim.health,
            "Player hit"
        );

        let killer = if killed {
            self.respawns.schedule(target_id);
            self.world.get_mut(shooter_id).map(|shooter| {
                shooter.kills += 1;
                shooter.clone()
            })
        } else {
            None
        };

        self.registry
            .broadcast(&ServerMsg::PlayerUpdate { player: victim }, None);

        if let Some(killer) = killer {
            let killer_kills = killer.kills;
            info!(
                session_id = shooter_id,
                target_id,
                kills = killer_kills,
                "Player killed"
            );

            self.registry
                .broadcast(&ServerMsg::PlayerUpdate { player: killer }, None);
            self.registry.broadcast(
                &ServerMsg::PlayerKilled {
                    victim_id: target_id,
                    killer_id: shooter_id,
                    killer_kills,
                },
                None,
            );
        }
    }

    /// The sender died on its own (crash, ground, water)
    fn i_died(&mut self, id: SessionId, killer_id: Option<SessionId>) {
        let Some(record) = self.world.get_mut(id) else {
            return;
        };
        if !record.is_alive {
            debug!(session_id = id, "Death report from inactive player");
            return;
        }

        record.kill();
        let player = record.clone();

        info!(session_id = id, killer_id = ?killer_id, "Player reported own death");

        self.registry
            .broadcast(&ServerMsg::PlayerUpdate { player }, None);
        self.respawns.schedule(id);
    }
}

/// Whole health points for a reported damage value, rounded up and saturated.
/// `None` for zero, negative or non-finite damage.
fn damage_points(raw: f64) -> Option<i32> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    Some(raw.ceil().min(f64::from(i32::MAX)) as i32)
}
