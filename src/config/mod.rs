//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::ws::protocol::PlaneType;

/// How a freshly connected session enters the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationMode {
    /// Player waits in Pending until it sends `select_plane`.
    /// The initial snapshot only carries alive players plus the requester.
    #[default]
    Gated,
    /// Player is spawned Alive on connect and receives every record.
    Immediate,
}

impl FromStr for ActivationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gated" => Ok(Self::Gated),
            "immediate" => Ok(Self::Immediate),
            _ => Err(ConfigError::Invalid("ACTIVATION_MODE")),
        }
    }
}

/// Gameplay rules shared by every session
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Health of a freshly spawned aircraft
    pub max_health: i32,
    /// Delay between death and automatic revival
    pub respawn_delay: Duration,
    /// Distance of each carrier from the world origin
    pub carrier_distance: f64,
    /// Deck altitude of the carriers
    pub carrier_altitude: f64,
    /// Pending-until-selection or alive-on-connect
    pub activation: ActivationMode,
    /// Aircraft a client may pick
    pub allowed_planes: Vec<PlaneType>,
    /// Used when the client picks something outside the allowlist
    pub default_plane: PlaneType,
    /// Depth of each connection's outbound queue
    pub outbound_buffer: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_health: 100,
            respawn_delay: Duration::from_secs(5),
            carrier_distance: 1500.0,
            carrier_altitude: 55.0,
            activation: ActivationMode::Gated,
            allowed_planes: vec![PlaneType::Generic, PlaneType::Spad, PlaneType::RedBaron],
            default_plane: PlaneType::Generic,
            outbound_buffer: 256,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, empty means any
    pub client_origins: Vec<String>,
    /// Inbound messages per second allowed on one connection
    pub message_rate_limit: u32,
    /// Gameplay rules
    pub game: GameConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origins: Vec::new(),
            message_rate_limit: crate::util::rate_limit::MESSAGE_RATE_LIMIT,
            game: GameConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        // PORT wins over SERVER_ADDR so hosted platforms can inject it
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim())
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            None => match lookup("SERVER_ADDR") {
                Some(addr) => addr.trim().parse().map_err(|_| ConfigError::InvalidAddress)?,
                None => defaults.server_addr,
            },
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let game_defaults = defaults.game;

        let respawn_delay = match lookup("RESPAWN_DELAY_SECS") {
            Some(raw) => {
                let secs: f64 = parse_value(&raw, "RESPAWN_DELAY_SECS")?;
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| ConfigError::Invalid("RESPAWN_DELAY_SECS"))?
            }
            None => game_defaults.respawn_delay,
        };

        let allowed_planes = match lookup("ALLOWED_PLANES") {
            Some(raw) => {
                let planes = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        PlaneType::from_wire(s).ok_or(ConfigError::Invalid("ALLOWED_PLANES"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if planes.is_empty() {
                    return Err(ConfigError::Invalid("ALLOWED_PLANES"));
                }
                planes
            }
            None => game_defaults.allowed_planes,
        };

        let default_plane = match lookup("DEFAULT_PLANE") {
            Some(raw) => {
                PlaneType::from_wire(raw.trim()).ok_or(ConfigError::Invalid("DEFAULT_PLANE"))?
            }
            None => game_defaults.default_plane,
        };

        let max_health: i32 = optional(&lookup, "MAX_HEALTH", game_defaults.max_health)?;
        if max_health <= 0 {
            return Err(ConfigError::Invalid("MAX_HEALTH"));
        }

        let outbound_buffer: usize =
            optional(&lookup, "OUTBOUND_BUFFER", game_defaults.outbound_buffer)?;
        if outbound_buffer == 0 {
            return Err(ConfigError::Invalid("OUTBOUND_BUFFER"));
        }

        Ok(Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            client_origins,
            message_rate_limit: optional(
                &lookup,
                "MESSAGE_RATE_LIMIT",
                defaults.message_rate_limit,
            )?,
            game: GameConfig {
                max_health,
                respawn_delay,
                carrier_distance: optional(
                    &lookup,
                    "CARRIER_DISTANCE",
                    game_defaults.carrier_distance,
                )?,
                carrier_altitude: optional(
                    &lookup,
                    "CARRIER_ALTITUDE",
                    game_defaults.carrier_altitude,
                )?,
                activation: optional(&lookup, "ACTIVATION_MODE", game_defaults.activation)?,
                allowed_planes,
                default_plane,
                outbound_buffer,
            },
        })
    }
}

fn optional<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &'static str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid(key))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.game.max_health, 100);
        assert_eq!(config.game.respawn_delay, Duration::from_secs(5));
        assert_eq!(config.game.activation, ActivationMode::Gated);
        assert_eq!(config.game.default_plane, PlaneType::Generic);
        assert!(config.client_origins.is_empty());
    }

    #[test]
    fn port_takes_precedence_over_server_addr() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("SERVER_ADDR", "127.0.0.1:7000"),
        ]))
        .unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:9000".parse().unwrap());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("ACTIVATION_MODE", "Immediate"),
            ("RESPAWN_DELAY_SECS", "2.5"),
            ("ALLOWED_PLANES", "spad, red_baron"),
            ("DEFAULT_PLANE", "spad"),
            ("CLIENT_ORIGIN", "http://a.test, http://b.test"),
        ]))
        .unwrap();
        assert_eq!(config.game.activation, ActivationMode::Immediate);
        assert_eq!(config.game.respawn_delay, Duration::from_millis(2500));
        assert_eq!(
            config.game.allowed_planes,
            vec![PlaneType::Spad, PlaneType::RedBaron]
        );
        assert_eq!(config.game.default_plane, PlaneType::Spad);
        assert_eq!(config.client_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("ACTIVATION_MODE", "lobby")])),
            Err(ConfigError::Invalid("ACTIVATION_MODE"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("MAX_HEALTH", "0")])),
            Err(ConfigError::Invalid("MAX_HEALTH"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("SERVER_ADDR", "nowhere")])),
            Err(ConfigError::InvalidAddress)
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("RESPAWN_DELAY_SECS", "-1")])),
            Err(ConfigError::Invalid("RESPAWN_DELAY_SECS"))
        ));
    }
}
