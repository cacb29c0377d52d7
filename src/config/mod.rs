//! Configuration module for wsnet2.
//!
//! This module provides layered configuration management:
//! - JSON configuration files
//! - Environment variable overrides (prefix `WSNET2__`, `__` as the nesting separator)
//! - Stdin input
//! - Sensible compiled-in defaults
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct, `Role`, `AppConfig`
//! - [`lobby`]: Lobby-service tunables
//! - [`room`]: Room-loop tunables
//! - [`rate_limit`]: Room-creation/join rate-limit tunables
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod lobby;
pub mod rate_limit;
pub mod room;
pub mod types;
pub mod validation;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use lobby::LobbyConfig;
pub use rate_limit::RateLimitConfig;
pub use room::RoomTuning;
pub use types::{AppConfig, Config, Role};
pub use validation::{is_production_mode, validate_config_security};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3536);
        assert_eq!(config.lobby.max_room_num, 9999);
        assert_eq!(config.lobby.max_watchers, 10_000);
        assert_eq!(config.rate_limit.max_room_creations, 5);
        assert_eq!(config.logging.dir, "logs");
    }

    #[test]
    fn config_serialization_round_trips() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.port, deserialized.port);
        assert_eq!(config.room.history_capacity, deserialized.room.history_capacity);
    }

    #[test]
    fn log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn find_app_looks_up_by_id() {
        let mut config = Config::default();
        config.apps.push(AppConfig { id: "app1".into(), key: "secret".into() });
        assert!(config.find_app("app1").is_some());
        assert!(config.find_app("missing").is_none());
    }
}
