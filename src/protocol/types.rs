//! Core data model: apps, rooms, clients, hosts.

use crate::codec::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Opaque client identifier, assigned by the caller (not generated by the room).
pub type ClientId = String;

/// 16 lowercase-hex-char room id, globally unique per app.
pub type RoomId = String;

pub fn generate_room_id() -> RoomId {
    let mut bytes = [0u8; 8];
    getrandom::fill(&mut bytes).expect("getrandom should not fail on a supported platform");
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Tenant namespace: a string id plus the HMAC secret used to issue session tokens.
#[derive(Debug, Clone)]
pub struct App {
    pub id: String,
    pub key: Vec<u8>,
}

/// Client-supplied identity and properties at join/watch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,
    #[serde(default)]
    pub props: BTreeMap<String, Value>,
}

/// Options supplied on `Create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomOption {
    #[serde(default)]
    pub number: Option<u32>,
    pub search_group: u32,
    pub max_players: u32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub joinable: bool,
    #[serde(default = "default_true")]
    pub watchable: bool,
    #[serde(default)]
    pub public_props: BTreeMap<String, Value>,
    #[serde(default)]
    pub private_props: BTreeMap<String, Value>,
    #[serde(default)]
    pub client_deadline_seconds: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// Persisted room row, also echoed in wire responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub app_id: String,
    pub host_id: u32,
    pub number: Option<u32>,
    pub search_group: u32,
    pub max_players: u32,
    pub players: u32,
    pub visible: bool,
    pub joinable: bool,
    pub watchable: bool,
    #[serde(default)]
    pub public_props: BTreeMap<String, Value>,
    /// Never echoed to clients — only `public_props` is part of the wire contract.
    #[serde(skip_serializing, default)]
    pub private_props: BTreeMap<String, Value>,
    pub created: DateTime<Utc>,
}

impl RoomInfo {
    /// `players == max_players` must force `joinable = false` for future joins,
    /// regardless of what the stored `joinable` flag currently says.
    pub fn is_joinable(&self) -> bool {
        self.joinable && self.players < self.max_players
    }
}

/// A live game or hub host, as cached from the heartbeat table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub host_id: u32,
    pub hostname: String,
    pub public_name: String,
    pub http_port: u16,
    pub status: HostStatus,
    pub heartbeat: DateTime<Utc>,
}

impl Host {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.http_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Live,
    Draining,
    Dead,
}

/// A hub row: a hub host currently serving a room along with its current watcher count.
#[derive(Debug, Clone)]
pub struct HubAssignment {
    pub host_id: u32,
    pub room_id: RoomId,
    pub watchers: u32,
}

/// `{nonce, hex-hmac(key, userId ‖ nonce)}`, bound to a destination room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub nonce: String,
    pub hmac: String,
}

/// Returned by `Create`/`Join*`/`Watch*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedRoomRes {
    pub room_info: RoomInfo,
    pub players: Vec<ClientId>,
    pub token: Token,
    pub master_id: Option<ClientId>,
    pub deadline_seconds: u32,
}

/// Unique id for one process instance (used to name hosts in local test setups).
pub fn new_client_id() -> ClientId {
    Uuid::new_v4().to_string()
}
