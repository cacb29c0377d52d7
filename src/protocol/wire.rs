//! Event/Message wire types exchanged between a room and its clients.
//!
//! Events split into non-regular (no sequence number, not replayed) and regular
//! (sequenced, stored in the room's history ring and replayable). Payloads are encoded
//! with the tagged binary codec, not JSON — these structs describe the envelope only.

use crate::codec::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Host -> client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Non-regular: sent once the transport is fully attached.
    PeerReady,
    /// Non-regular: echoes the ping's timestamp plus server tick and watcher count,
    /// used by the client for RTT measurement.
    Pong {
        ping_timestamp_ms: i64,
        server_tick: u64,
        watchers: u32,
    },
    /// Regular: a client joined. `seq_num` assigned by the room loop on emit.
    Joined {
        seq_num: u32,
        client_id: String,
        props: BTreeMap<String, Value>,
    },
    /// Regular.
    Left {
        seq_num: u32,
        client_id: String,
        cause: LeaveCause,
    },
    /// Regular: room-level properties changed.
    RoomProp {
        seq_num: u32,
        visible: bool,
        joinable: bool,
        watchable: bool,
        search_group: u32,
        max_players: u32,
        public_props: BTreeMap<String, Value>,
    },
    /// Regular: one client's public properties changed.
    ClientProp {
        seq_num: u32,
        client_id: String,
        props: BTreeMap<String, Value>,
    },
    /// Regular: a broadcast/ToMaster/ToClients payload.
    Message {
        seq_num: u32,
        sender: String,
        payload: Vec<u8>,
    },
    /// Regular: master-client succession.
    MasterSwitched {
        seq_num: u32,
        old_master: Option<String>,
        new_master: String,
    },
    /// Regular: final event before the room's send-queues close.
    Closed { seq_num: u32 },
}

impl Event {
    /// Non-regular events (`PeerReady`, `Pong`) never carry a sequence number and are
    /// never stored in the history ring.
    pub fn seq_num(&self) -> Option<u32> {
        match self {
            Event::PeerReady | Event::Pong { .. } => None,
            Event::Joined { seq_num, .. }
            | Event::Left { seq_num, .. }
            | Event::RoomProp { seq_num, .. }
            | Event::ClientProp { seq_num, .. }
            | Event::Message { seq_num, .. }
            | Event::MasterSwitched { seq_num, .. }
            | Event::Closed { seq_num } => Some(*seq_num),
        }
    }

    pub fn is_regular(&self) -> bool {
        self.seq_num().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveCause {
    Leave,
    Timeout,
    Overflow,
    ProtocolError,
    Kicked,
    RoomClosed,
}

/// Client -> host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    Broadcast { payload: Vec<u8> },
    ToMaster { payload: Vec<u8> },
    ToClients { targets: Vec<String>, payload: Vec<u8> },
    RoomProp {
        visible: Option<bool>,
        joinable: Option<bool>,
        watchable: Option<bool>,
        search_group: Option<u32>,
        max_players: Option<u32>,
        client_deadline_seconds: Option<u32>,
        public_props: Option<BTreeMap<String, Value>>,
        private_props: Option<BTreeMap<String, Value>>,
    },
    ClientProp { props: BTreeMap<String, Value> },
    Ping { timestamp_ms: i64 },
    Leave,
    Kick { target: String },
    SwitchMaster { target: String },
}
