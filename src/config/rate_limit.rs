//! Rate-limit configuration consumed by the top-level [`crate::rate_limit`] runtime.

use serde::{Deserialize, Serialize};

fn default_max_room_creations() -> u32 {
    5
}

fn default_time_window_secs() -> u64 {
    60
}

fn default_max_join_attempts() -> u32 {
    20
}

/// Sliding-window limits applied per `app_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_room_creations")]
    pub max_room_creations: u32,
    #[serde(default = "default_time_window_secs")]
    pub time_window_secs: u64,
    #[serde(default = "default_max_join_attempts")]
    pub max_join_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_room_creations: default_max_room_creations(),
            time_window_secs: default_time_window_secs(),
            max_join_attempts: default_max_join_attempts(),
        }
    }
}
