//! Root configuration types.

use super::defaults::{default_heartbeat_interval_secs, default_host_id, default_port};
use super::lobby::LobbyConfig;
use super::rate_limit::RateLimitConfig;
use super::room::RoomTuning;
use super::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Which role this process plays. A single binary can run any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Lobby,
    Game,
    Hub,
    All,
}

/// One registered application: `id` is the public app identifier
/// clients and hosts address, `key` is the shared HMAC signing secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub id: String,
    pub key: String,
}

/// Root configuration struct for wsnet2.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub role: Role,
    /// Numeric host id this process advertises to the lobby's host cache.
    #[serde(default = "default_host_id")]
    pub host_id: u32,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub public_name: String,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default)]
    pub apps: Vec<AppConfig>,
    #[serde(default)]
    pub lobby: LobbyConfig,
    #[serde(default)]
    pub room: RoomTuning,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Role {
    fn default() -> Self {
        Self::All
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            role: Role::default(),
            host_id: default_host_id(),
            hostname: String::new(),
            public_name: String::new(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            apps: Vec::new(),
            lobby: LobbyConfig::default(),
            room: RoomTuning::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Resolve an app by id, the lookup every lobby and game dispatch handler needs
    /// before it can issue or verify an [`crate::auth::token`].
    #[must_use]
    pub fn find_app(&self, app_id: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|a| a.id == app_id)
    }
}
