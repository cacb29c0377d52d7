//! Messages accepted by a room's single-writer event loop.

use crate::codec::Value;
use crate::protocol::types::{ClientId, ClientInfo, RoomInfo};
use crate::protocol::wire::LeaveCause;
use crate::protocol::AppError;
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};

/// What a successful `Join`/`Watch` replies with; the repository adds the
/// HMAC-signed [`crate::protocol::types::Token`] on top since the room loop has no
/// business knowing the app's signing key.
#[derive(Debug, Clone)]
pub struct JoinedSnapshot {
    pub room_info: RoomInfo,
    pub players: Vec<ClientId>,
    pub master_id: Option<ClientId>,
    pub deadline_seconds: u32,
}

pub type JoinReply = oneshot::Sender<Result<JoinedSnapshot, AppError>>;

#[derive(Debug, Default)]
pub struct RoomPropPatch {
    pub visible: Option<bool>,
    pub joinable: Option<bool>,
    pub watchable: Option<bool>,
    pub search_group: Option<u32>,
    pub max_players: Option<u32>,
    pub client_deadline_seconds: Option<u32>,
    pub public_props: Option<BTreeMap<String, Value>>,
    pub private_props: Option<BTreeMap<String, Value>>,
}

pub enum Msg {
    Join {
        client: ClientInfo,
        /// The event sink a just-attached transport drains from. `None` lets a
        /// caller reserve a player slot before the transport is live; the repository
        /// always supplies `Some` for the wire-level join path.
        sink: Option<mpsc::Sender<crate::protocol::wire::Event>>,
        reply: JoinReply,
    },
    Watch {
        client: ClientInfo,
        sink: Option<mpsc::Sender<crate::protocol::wire::Event>>,
        reply: JoinReply,
    },
    /// Attach (or re-attach, on reconnect) a transport sink to an already-admitted
    /// client, triggering the `PeerReady` + replay-from-seq handshake.
    AttachTransport {
        client_id: ClientId,
        sink: mpsc::Sender<crate::protocol::wire::Event>,
        since_seq: Option<u32>,
    },
    Leave {
        client_id: ClientId,
        cause: LeaveCause,
    },
    Broadcast {
        sender: ClientId,
        payload: Vec<u8>,
    },
    ToMaster {
        sender: ClientId,
        payload: Vec<u8>,
    },
    ToClients {
        sender: ClientId,
        targets: Vec<ClientId>,
        payload: Vec<u8>,
    },
    RoomProp {
        sender: ClientId,
        patch: RoomPropPatch,
    },
    ClientProp {
        client_id: ClientId,
        props: BTreeMap<String, Value>,
    },
    Ping {
        client_id: ClientId,
        timestamp_ms: i64,
    },
    Kick {
        requester: ClientId,
        target: ClientId,
    },
    SwitchMaster {
        requester: ClientId,
        target: ClientId,
    },
    /// A reader task hit a malformed frame; treated as a protocol-error Leave.
    ClientError {
        client_id: ClientId,
    },
    /// Internal: fired by the room's own tick timer.
    Tick,
}
