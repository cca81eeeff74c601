//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::game::world::PlayerRecord;
use crate::game::SessionId;

/// Aircraft a player can fly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaneType {
    /// Generic jet
    #[default]
    Generic,
    /// SPAD biplane
    Spad,
    /// Fokker triplane
    RedBaron,
}

impl PlaneType {
    /// Wire identifier of this aircraft
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Spad => "spad",
            Self::RedBaron => "red_baron",
        }
    }

    /// Look up an aircraft by its wire identifier
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "generic" => Some(Self::Generic),
            "spad" => Some(Self::Spad),
            "red_baron" => Some(Self::RedBaron),
            _ => None,
        }
    }
}

/// Partial pose from `update_state`; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub rot_y: Option<f64>,
    pub rot_z: Option<f64>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Pick an aircraft and leave the Pending state
    SelectPlane {
        /// Anything that is not a string becomes `None` and falls back to the default
        #[serde(rename = "planeType", default, deserialize_with = "lenient")]
        plane_type: Option<String>,
    },

    /// Client-authoritative pose
    UpdateState {
        #[serde(default)]
        state: Option<StateUpdate>,
    },

    /// Sender claims a hit on another player
    HitPlayer {
        #[serde(rename = "targetId")]
        target_id: SessionId,
        /// Any JSON number; non-numbers become `None` and the hit is rejected
        #[serde(default, deserialize_with = "lenient")]
        damage: Option<f64>,
    },

    /// Sender crashed or otherwise died on its own
    IDied {
        /// Informational only, so a malformed value never blocks the death
        #[serde(rename = "killerId", default, deserialize_with = "lenient")]
        killer_id: Option<SessionId>,
    },

    /// Cosmetic, projectiles are simulated client-side
    FireBullet,

    /// Any other `type` value
    #[serde(other)]
    Unknown,
}

/// Accept any JSON for an optional field, keeping it only when it has the expected shape
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Session identifier, sent once on connect
    YourId { id: SessionId },

    /// Full world snapshot keyed by session id
    GameState {
        state: BTreeMap<SessionId, PlayerRecord>,
    },

    /// A player entered the world
    PlayerJoined { player: PlayerRecord },

    /// A player's record changed
    PlayerUpdate { player: PlayerRecord },

    /// Kill notification
    PlayerKilled {
        #[serde(rename = "victimId")]
        victim_id: SessionId,
        #[serde(rename = "killerId")]
        killer_id: SessionId,
        #[serde(rename = "killerKills")]
        killer_kills: u32,
    },

    /// A session disconnected
    PlayerLeft { id: SessionId },
}

/// Why an inbound frame was dropped
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Message has no string `type` field")]
    MissingType,

    #[error("Invalid payload for `{kind}`: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one inbound text frame
pub fn parse_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::MissingType),
    };

    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_known_message() {
        assert_eq!(
            parse_client_msg(r#"{"type":"select_plane","planeType":"spad"}"#).unwrap(),
            ClientMsg::SelectPlane {
                plane_type: Some("spad".to_string())
            }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"update_state","state":{"x":1.5,"rotY":0.25}}"#).unwrap(),
            ClientMsg::UpdateState {
                state: Some(StateUpdate {
                    x: Some(1.5),
                    rot_y: Some(0.25),
                    ..StateUpdate::default()
                })
            }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"hit_player","targetId":2,"damage":25}"#).unwrap(),
            ClientMsg::HitPlayer {
                target_id: 2,
                damage: Some(25.0)
            }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"i_died"}"#).unwrap(),
            ClientMsg::IDied { killer_id: None }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"fire_bullet","origin":[0,1,2]}"#).unwrap(),
            ClientMsg::FireBullet
        );
    }

    #[test]
    fn hit_without_damage_has_none() {
        assert_eq!(
            parse_client_msg(r#"{"type":"hit_player","targetId":7}"#).unwrap(),
            ClientMsg::HitPlayer {
                target_id: 7,
                damage: None
            }
        );
    }

    #[test]
    fn optional_fields_tolerate_wrong_shapes() {
        assert_eq!(
            parse_client_msg(r#"{"type":"select_plane","planeType":5}"#).unwrap(),
            ClientMsg::SelectPlane { plane_type: None }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"i_died","killerId":"ground"}"#).unwrap(),
            ClientMsg::IDied { killer_id: None }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"i_died","killerId":-3}"#).unwrap(),
            ClientMsg::IDied { killer_id: None }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"hit_player","targetId":2,"damage":12.5}"#).unwrap(),
            ClientMsg::HitPlayer {
                target_id: 2,
                damage: Some(12.5)
            }
        );
        assert_eq!(
            parse_client_msg(r#"{"type":"hit_player","targetId":2,"damage":"lots"}"#).unwrap(),
            ClientMsg::HitPlayer {
                target_id: 2,
                damage: None
            }
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert_eq!(
            parse_client_msg(r#"{"type":"chat","text":"hi"}"#).unwrap(),
            ClientMsg::Unknown
        );
    }

    #[test]
    fn malformed_frames_are_classified() {
        assert!(matches!(
            parse_client_msg("{not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_client_msg(r#"{"targetId":1}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            parse_client_msg(r#"{"type":5}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            parse_client_msg(r#"{"type":"hit_player","targetId":"bob"}"#),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn server_messages_use_wire_field_names() {
        let killed = serde_json::to_value(ServerMsg::PlayerKilled {
            victim_id: 2,
            killer_id: 1,
            killer_kills: 3,
        })
        .unwrap();
        assert_eq!(
            killed,
            json!({"type": "player_killed", "victimId": 2, "killerId": 1, "killerKills": 3})
        );

        let your_id = serde_json::to_value(ServerMsg::YourId { id: 4 }).unwrap();
        assert_eq!(your_id, json!({"type": "your_id", "id": 4}));
    }

    #[test]
    fn plane_names_round_trip_through_wire_ids() {
        for plane in [PlaneType::Generic, PlaneType::Spad, PlaneType::RedBaron] {
            assert_eq!(PlaneType::from_wire(plane.as_str()), Some(plane));
            assert_eq!(
                serde_json::to_value(plane).unwrap(),
                Value::String(plane.as_str().to_string())
            );
        }
        assert_eq!(PlaneType::from_wire("zeppelin"), None);
    }
}
