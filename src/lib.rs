#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # wsnet2
//!
//! A realtime multiplayer room service: a lobby that creates/finds/admits rooms and a
//! game host that runs each room's authoritative event loop over WebSocket.

/// Per-session auth token issuance and verification
pub mod auth;

/// Short-TTL room/host lookup caches in front of the store
pub mod cache;

/// Client websocket transport: reader/writer tasks bridging a room to the wire
pub mod client_session;

/// Self-describing tagged binary codec for room/client properties
pub mod codec;

/// Server configuration and environment variables
pub mod config;

/// Structured logging configuration
pub mod logging;

/// Lobby dispatch operations: Create/Join*/Watch*/Search, and its HTTP surface
pub mod lobby;

/// Metrics collection and reporting
pub mod metrics;

/// Property query matching (Search)
pub mod query;

/// WebSocket message protocol definitions
pub mod protocol;

/// Rate limiting implementation
pub mod rate_limit;

/// Per-(host,app) room/client registry, and the internal game/hub dispatch surface
pub mod repository;

/// Per-room single-writer event loop and its message vocabulary
pub mod room;

/// Dispatch RPC pool to game/hub hosts
pub mod rpc;

/// Room/host store traits and in-memory backend
pub mod store;
