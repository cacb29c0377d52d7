//! Lobby-service tunables.

use serde::{Deserialize, Serialize};

fn default_valid_heartbeat_secs() -> u64 {
    90
}

fn default_max_room_num() -> u32 {
    9999
}

fn default_retry_count() -> u32 {
    10
}

fn default_max_watchers() -> u32 {
    10_000
}

fn default_room_cache_ttl_ms() -> u64 {
    10
}

fn default_host_cache_ttl_secs() -> u64 {
    1
}

fn default_rpc_timeout_secs() -> u64 {
    5
}

fn default_create_join_deadline_secs() -> u64 {
    5
}

fn default_search_candidate_cap() -> usize {
    1000
}

fn default_join_at_random_timeout_secs() -> u64 {
    3
}

/// Tunables for the lobby's directory/admission/dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// A host is dropped from the host cache once its heartbeat is older than this.
    #[serde(default = "default_valid_heartbeat_secs")]
    pub valid_heartbeat_secs: u64,
    /// Upper bound for auto-assigned room numbers.
    #[serde(default = "default_max_room_num")]
    pub max_room_num: u32,
    /// Id/number collision retries before `create_room` gives up.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Global cap on concurrently attached watchers per room.
    #[serde(default = "default_max_watchers")]
    pub max_watchers: u32,
    #[serde(default = "default_room_cache_ttl_ms")]
    pub room_cache_ttl_ms: u64,
    #[serde(default = "default_host_cache_ttl_secs")]
    pub host_cache_ttl_secs: u64,
    /// Deadline for an outbound dispatch RPC to a game/hub host.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Deadline `Repository::create_room`/`join_room`/`watch_room` wait on the master
    /// or joining client's room-loop reply before failing the request.
    #[serde(default = "default_create_join_deadline_secs")]
    pub create_join_deadline_secs: u64,
    /// `JoinAtRandom`/`Search` draw from at most this many cached candidates before
    /// shuffling.
    #[serde(default = "default_search_candidate_cap")]
    pub search_candidate_cap: usize,
    /// Wall-clock budget for `JoinAtRandom`'s whole candidate walk.
    #[serde(default = "default_join_at_random_timeout_secs")]
    pub join_at_random_timeout_secs: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            valid_heartbeat_secs: default_valid_heartbeat_secs(),
            max_room_num: default_max_room_num(),
            retry_count: default_retry_count(),
            max_watchers: default_max_watchers(),
            room_cache_ttl_ms: default_room_cache_ttl_ms(),
            host_cache_ttl_secs: default_host_cache_ttl_secs(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            create_join_deadline_secs: default_create_join_deadline_secs(),
            search_candidate_cap: default_search_candidate_cap(),
            join_at_random_timeout_secs: default_join_at_random_timeout_secs(),
        }
    }
}
