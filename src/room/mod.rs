//! Per-room single-writer event loop: every mutation to a room's state happens
//! inside one `tokio::spawn`ed task consuming `Msg`s off a channel, mirroring the
//! teacher's actor-per-connection-manager style but scoped to one room instead of one
//! process-wide registry (`src/server/connection_manager.rs`).

pub mod msg;

use crate::protocol::types::{ClientId, ClientInfo, RoomId, RoomInfo};
use crate::protocol::wire::{Event, LeaveCause};
use crate::protocol::AppError;
use crate::store::RoomStore;
use msg::{JoinedSnapshot, Msg, RoomPropPatch};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables that would otherwise live in config; defaults are chosen to be generous
/// enough not to be the bottleneck in ordinary play.
#[derive(Debug, Clone, Copy)]
pub struct RoomConfig {
    pub history_capacity: usize,
    pub send_queue_capacity: usize,
    pub tick_interval: Duration,
    pub default_client_deadline: Duration,
    pub msg_channel_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1024,
            send_queue_capacity: 256,
            tick_interval: Duration::from_secs(1),
            default_client_deadline: Duration::from_secs(30),
            msg_channel_capacity: 512,
        }
    }
}

/// A handle callers use to talk to a running room; the loop itself is only reachable
/// through `tx`.
#[derive(Clone)]
pub struct RoomHandle {
    pub room_id: RoomId,
    tx: mpsc::Sender<Msg>,
    cancel: CancellationToken,
}

impl RoomHandle {
    pub async fn send(&self, msg: Msg) -> Result<(), AppError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| AppError::NotFound)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ClientRuntime {
    props: BTreeMap<String, crate::codec::Value>,
    sink: Option<mpsc::Sender<Event>>,
    is_watcher: bool,
    last_msg: std::time::Instant,
    join_seq: u64,
}

struct RoomLoop {
    info: RoomInfo,
    client_deadline: Duration,
    players: HashMap<ClientId, ClientRuntime>,
    join_order_counter: u64,
    master_id: Option<ClientId>,
    history: VecDeque<(u32, Event)>,
    next_seq: u32,
    config: RoomConfig,
    store: Arc<dyn RoomStore>,
    msg_tx: mpsc::Sender<Msg>,
    tick_count: u64,
}

/// Spawn a room's event loop. `info` is the freshly persisted row; this only builds the in-memory runtime around it.
pub fn spawn(
    info: RoomInfo,
    store: Arc<dyn RoomStore>,
    config: RoomConfig,
    parent_cancel: &CancellationToken,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.msg_channel_capacity);
    let cancel = parent_cancel.child_token();
    let room_id = info.id.clone();

    let client_deadline = info
        .public_props
        .get("__client_deadline_seconds")
        .and_then(|v| match v {
            crate::codec::Value::UInt(s) => Some(Duration::from_secs(u64::from(*s))),
            _ => None,
        })
        .unwrap_or(config.default_client_deadline);

    let state = RoomLoop {
        info,
        client_deadline,
        players: HashMap::new(),
        join_order_counter: 0,
        master_id: None,
        history: VecDeque::new(),
        next_seq: 0,
        config,
        store,
        msg_tx: tx.clone(),
        tick_count: 0,
    };

    let loop_cancel = cancel.clone();
    tokio::spawn(async move {
        state.run(rx, loop_cancel).await;
    });

    RoomHandle {
        room_id,
        tx,
        cancel,
    }
}

impl RoomLoop {
    async fn run(mut self, mut rx: mpsc::Receiver<Msg>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        info!(room_id = %self.info.id, "room loop started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.shutdown().await;
                    break;
                }
                _ = tick.tick() => {
                    self.handle(Msg::Tick).await;
                }
                maybe_msg = rx.recv() => {
                    match maybe_msg {
                        Some(msg) => self.handle(msg).await,
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }
        info!(room_id = %self.info.id, "room loop stopped");
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Join { client, sink, reply } => self.handle_join(client, sink, reply).await,
            Msg::Watch { client, sink, reply } => self.handle_watch(client, sink, reply).await,
            Msg::AttachTransport { client_id, sink, since_seq } => {
                self.handle_attach(&client_id, sink, since_seq).await;
            }
            Msg::Leave { client_id, cause } => self.handle_leave(&client_id, cause).await,
            Msg::Broadcast { sender, payload } => {
                let targets: Vec<ClientId> = self.players.keys().cloned().collect();
                self.emit_message(&sender, &targets, payload).await;
            }
            Msg::ToMaster { sender, payload } => {
                if let Some(master) = self.master_id.clone() {
                    self.emit_message(&sender, &[master], payload).await;
                }
            }
            Msg::ToClients { sender, targets, payload } => {
                self.emit_message(&sender, &targets, payload).await;
            }
            Msg::RoomProp { sender: _, patch } => self.handle_room_prop(patch).await,
            Msg::ClientProp { client_id, props } => self.handle_client_prop(&client_id, props).await,
            Msg::Ping { client_id, timestamp_ms } => self.handle_ping(&client_id, timestamp_ms).await,
            Msg::Kick { requester, target } => {
                if self.master_id.as_deref() == Some(requester.as_str()) {
                    self.handle_leave(&target, LeaveCause::Kicked).await;
                }
            }
            Msg::SwitchMaster { requester, target } => {
                self.handle_switch_master(&requester, &target).await;
            }
            Msg::ClientError { client_id } => {
                self.handle_leave(&client_id, LeaveCause::ProtocolError).await;
            }
            Msg::Tick => self.handle_tick().await,
        }
    }

    async fn handle_join(
        &mut self,
        client: ClientInfo,
        sink: Option<mpsc::Sender<Event>>,
        reply: msg::JoinReply,
    ) {
        if !self.info.is_joinable() {
            let _ = reply.send(Err(if self.info.players >= self.info.max_players {
                AppError::FailedPrecondition("room full".to_string())
            } else {
                AppError::FailedPrecondition("room is not joinable".to_string())
            }));
            return;
        }
        if self.players.contains_key(&client.id) {
            let _ = reply.send(Err(AppError::AlreadyExists(format!(
                "client {} already in room",
                client.id
            ))));
            return;
        }

        self.join_order_counter += 1;
        let runtime = ClientRuntime {
            props: client.props.clone(),
            sink,
            is_watcher: false,
            last_msg: std::time::Instant::now(),
            join_seq: self.join_order_counter,
        };
        self.players.insert(client.id.clone(), runtime);
        self.info.players += 1;
        if self.info.players >= self.info.max_players {
            self.info.joinable = false;
        }
        if self.master_id.is_none() {
            self.master_id = Some(client.id.clone());
        }

        self.broadcast_regular_except(
            Event::Joined {
                seq_num: 0,
                client_id: client.id.clone(),
                props: client.props,
            },
            &client.id,
        )
        .await;

        let snapshot = self.snapshot();
        let _ = reply.send(Ok(snapshot));
        self.persist();
    }

    async fn handle_watch(
        &mut self,
        client: ClientInfo,
        sink: Option<mpsc::Sender<Event>>,
        reply: msg::JoinReply,
    ) {
        if !self.info.watchable {
            let _ = reply.send(Err(AppError::FailedPrecondition(
                "room is not watchable".to_string(),
            )));
            return;
        }
        if self.players.contains_key(&client.id) {
            let _ = reply.send(Err(AppError::AlreadyExists(format!(
                "client {} already in room",
                client.id
            ))));
            return;
        }

        self.join_order_counter += 1;
        let runtime = ClientRuntime {
            props: client.props.clone(),
            sink,
            is_watcher: true,
            last_msg: std::time::Instant::now(),
            join_seq: self.join_order_counter,
        };
        self.players.insert(client.id.clone(), runtime);
        // Watchers never increment `players` and their Joined event is not broadcast to
        // players — only the watcher itself gets the reply snapshot.
        let _ = reply.send(Ok(self.snapshot()));
    }

    async fn handle_attach(
        &mut self,
        client_id: &ClientId,
        sink: mpsc::Sender<Event>,
        since_seq: Option<u32>,
    ) {
        let Some(runtime) = self.players.get_mut(client_id) else {
            return;
        };
        runtime.sink = Some(sink.clone());
        let _ = sink.try_send(Event::PeerReady);

        if let Some(since) = since_seq {
            let floor = self.history.front().map(|(seq, _)| *seq).unwrap_or(self.next_seq);
            if since < floor {
                warn!(%client_id, since, floor, "replay requested below history floor, session must reset");
                return;
            }
            for (seq, event) in &self.history {
                if *seq > since && sink.try_send(event.clone()).is_err() {
                    break;
                }
            }
        }
    }

    async fn handle_leave(&mut self, client_id: &ClientId, cause: LeaveCause) {
        let Some(runtime) = self.players.remove(client_id) else {
            return;
        };
        let was_watcher = runtime.is_watcher;
        if !was_watcher {
            self.info.players = self.info.players.saturating_sub(1);
        }

        if self.master_id.as_deref() == Some(client_id.as_str()) {
            let new_master = self
                .players
                .iter()
                .filter(|(_, r)| !r.is_watcher)
                .min_by_key(|(_, r)| r.join_seq)
                .map(|(id, _)| id.clone());
            let old_master = self.master_id.take();
            self.master_id = new_master.clone();
            if let Some(new_master) = new_master {
                self.broadcast_regular(Event::MasterSwitched {
                    seq_num: 0,
                    old_master,
                    new_master,
                })
                .await;
            }
        }

        self.broadcast_regular(Event::Left {
            seq_num: 0,
            client_id: client_id.clone(),
            cause,
        })
        .await;
        self.persist();

        if self.info.players == 0 {
            self.initiate_shutdown().await;
        }
    }

    async fn handle_room_prop(&mut self, patch: RoomPropPatch) {
        if let Some(v) = patch.visible {
            self.info.visible = v;
        }
        if let Some(v) = patch.joinable {
            self.info.joinable = v;
        }
        if let Some(v) = patch.watchable {
            self.info.watchable = v;
        }
        if let Some(v) = patch.search_group {
            self.info.search_group = v;
        }
        if let Some(v) = patch.max_players {
            self.info.max_players = v;
        }
        if let Some(secs) = patch.client_deadline_seconds {
            self.client_deadline = Duration::from_secs(u64::from(secs));
        }
        if let Some(props) = patch.public_props {
            self.info.public_props = props;
        }
        if let Some(props) = patch.private_props {
            self.info.private_props = props;
        }

        self.broadcast_regular(Event::RoomProp {
            seq_num: 0,
            visible: self.info.visible,
            joinable: self.info.joinable,
            watchable: self.info.watchable,
            search_group: self.info.search_group,
            max_players: self.info.max_players,
            public_props: self.info.public_props.clone(),
        })
        .await;
        self.persist();
    }

    async fn handle_client_prop(
        &mut self,
        client_id: &ClientId,
        props: BTreeMap<String, crate::codec::Value>,
    ) {
        let Some(runtime) = self.players.get_mut(client_id) else {
            return;
        };
        for (k, v) in &props {
            runtime.props.insert(k.clone(), v.clone());
        }
        self.broadcast_regular(Event::ClientProp {
            seq_num: 0,
            client_id: client_id.clone(),
            props,
        })
        .await;
    }

    async fn handle_ping(&mut self, client_id: &ClientId, timestamp_ms: i64) {
        let watchers = self.players.values().filter(|r| r.is_watcher).count() as u32;
        let tick = self.tick_count;
        let Some(runtime) = self.players.get_mut(client_id) else {
            return;
        };
        runtime.last_msg = std::time::Instant::now();
        if let Some(sink) = &runtime.sink {
            let _ = sink
                .send(Event::Pong {
                    ping_timestamp_ms: timestamp_ms,
                    server_tick: tick,
                    watchers,
                })
                .await;
        }
    }

    async fn handle_switch_master(&mut self, requester: &ClientId, target: &ClientId) {
        if self.master_id.as_deref() != Some(requester.as_str()) {
            return;
        }
        if target == requester || !self.players.contains_key(target) {
            return;
        }
        let old_master = self.master_id.replace(target.clone());
        self.broadcast_regular(Event::MasterSwitched {
            seq_num: 0,
            old_master,
            new_master: target.clone(),
        })
        .await;
    }

    async fn handle_tick(&mut self) {
        self.tick_count += 1;
        let now = std::time::Instant::now();
        let deadline = self.client_deadline;
        let timed_out: Vec<ClientId> = self
            .players
            .iter()
            .filter(|(_, r)| now.duration_since(r.last_msg) > deadline)
            .map(|(id, _)| id.clone())
            .collect();
        for client_id in timed_out {
            self.handle_leave(&client_id, LeaveCause::Timeout).await;
        }
    }

    /// A `Message` (Broadcast/ToMaster/ToClients) is delivered exactly once, only to
    /// its intended recipients — never the blanket room fan-out `broadcast_regular`
    /// does for state-change events.
    async fn emit_message(&mut self, sender: &ClientId, targets: &[ClientId], payload: Vec<u8>) {
        let event = self
            .emit_regular(Event::Message {
                seq_num: 0,
                sender: sender.clone(),
                payload,
            })
            .await;
        self.deliver(targets, &event).await;
    }

    /// Assign the next sequence number and append to the history ring. Does not
    /// deliver to anyone; callers choose the recipients.
    async fn emit_regular(&mut self, mut event: Event) -> Event {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        set_seq_num(&mut event, seq);

        self.history.push_back((seq, event.clone()));
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
        event
    }

    /// Deliver a state-change event (Left/MasterSwitched/RoomProp/ClientProp) to
    /// every current room member, players and watchers alike (§4.8: watchers observe
    /// the room).
    async fn broadcast_regular(&mut self, event: Event) {
        let event = self.emit_regular(event).await;
        let targets: Vec<ClientId> = self.players.keys().cloned().collect();
        self.deliver(&targets, &event).await;
    }

    /// Like `broadcast_regular`, but excludes one client — used for `Joined`, whose
    /// wire rule (§4.7 rule 2) is to broadcast to existing members while the joiner
    /// itself learns the same information through its reply snapshot.
    async fn broadcast_regular_except(&mut self, event: Event, exclude: &ClientId) {
        let event = self.emit_regular(event).await;
        let targets: Vec<ClientId> = self
            .players
            .keys()
            .filter(|id| *id != exclude)
            .cloned()
            .collect();
        self.deliver(&targets, &event).await;
    }

    async fn deliver(&mut self, targets: &[ClientId], event: &Event) {
        let mut overflowed = Vec::new();
        for client_id in targets {
            let Some(runtime) = self.players.get(client_id) else {
                continue;
            };
            let Some(sink) = &runtime.sink else { continue };
            if sink.try_send(event.clone()).is_err() {
                overflowed.push(client_id.clone());
            }
        }
        for client_id in overflowed {
            let tx = self.msg_tx.clone();
            tokio::spawn(async move {
                let _ = tx
                    .send(Msg::Leave {
                        client_id,
                        cause: LeaveCause::Overflow,
                    })
                    .await;
            });
        }
    }

    fn snapshot(&self) -> JoinedSnapshot {
        JoinedSnapshot {
            room_info: self.info.clone(),
            players: self
                .players
                .iter()
                .filter(|(_, r)| !r.is_watcher)
                .map(|(id, _)| id.clone())
                .collect(),
            master_id: self.master_id.clone(),
            deadline_seconds: self.client_deadline.as_secs() as u32,
        }
    }

    fn persist(&self) {
        let store = self.store.clone();
        let info = self.info.clone();
        tokio::spawn(async move {
            if let Err(err) = store.update_room(info).await {
                warn!(error = %err, "failed to persist room state");
            }
        });
    }

    async fn initiate_shutdown(&mut self) {
        debug!(room_id = %self.info.id, "last player left, shutting down room");
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        let seq = self.next_seq;
        let closed = Event::Closed { seq_num: seq };
        let targets: Vec<ClientId> = self.players.keys().cloned().collect();
        self.deliver(&targets, &closed).await;
        self.players.clear();

        let store = self.store.clone();
        let app_id = self.info.app_id.clone();
        let room_id = self.info.id.clone();
        tokio::spawn(async move {
            if let Err(err) = store.delete_room(&app_id, &room_id).await {
                warn!(error = %err, "failed to remove room row on shutdown");
            }
        });
    }
}

fn set_seq_num(event: &mut Event, seq: u32) {
    match event {
        Event::Joined { seq_num, .. }
        | Event::Left { seq_num, .. }
        | Event::RoomProp { seq_num, .. }
        | Event::ClientProp { seq_num, .. }
        | Event::Message { seq_num, .. }
        | Event::MasterSwitched { seq_num, .. }
        | Event::Closed { seq_num } => *seq_num = seq,
        Event::PeerReady | Event::Pong { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use tokio::sync::oneshot;

    fn sample_room() -> RoomInfo {
        RoomInfo {
            id: "0123456789abcdef".to_string(),
            app_id: "app1".to_string(),
            host_id: 1,
            number: None,
            search_group: 0,
            max_players: 2,
            players: 0,
            visible: true,
            joinable: true,
            watchable: true,
            public_props: BTreeMap::new(),
            private_props: BTreeMap::new(),
            created: Utc::now(),
        }
    }

    fn client(id: &str) -> ClientInfo {
        ClientInfo {
            id: id.to_string(),
            props: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn first_joiner_becomes_master_and_is_counted() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let handle = spawn(sample_room(), store, RoomConfig::default(), &cancel);

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .send(Msg::Join {
                client: client("c1"),
                sink: None,
                reply: reply_tx,
            })
            .await
            .unwrap();
        let snapshot = reply_rx.await.unwrap().unwrap();
        assert_eq!(snapshot.master_id.as_deref(), Some("c1"));
        assert_eq!(snapshot.room_info.players, 1);
    }

    #[tokio::test]
    async fn room_rejects_join_when_full() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let mut info = sample_room();
        info.max_players = 1;
        let handle = spawn(info, store, RoomConfig::default(), &cancel);

        let (tx1, rx1) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c1"), sink: None, reply: tx1 })
            .await
            .unwrap();
        rx1.await.unwrap().unwrap();

        let (tx2, rx2) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c2"), sink: None, reply: tx2 })
            .await
            .unwrap();
        assert!(rx2.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn duplicate_client_id_is_rejected() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let handle = spawn(sample_room(), store, RoomConfig::default(), &cancel);

        let (tx1, rx1) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c1"), sink: None, reply: tx1 })
            .await
            .unwrap();
        rx1.await.unwrap().unwrap();

        let (tx2, rx2) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c1"), sink: None, reply: tx2 })
            .await
            .unwrap();
        assert!(matches!(
            rx2.await.unwrap(),
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn master_succession_picks_oldest_remaining_joiner() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let mut info = sample_room();
        info.max_players = 3;
        let handle = spawn(info, store, RoomConfig::default(), &cancel);

        for id in ["c1", "c2", "c3"] {
            let (tx, rx) = oneshot::channel();
            handle
                .send(Msg::Join { client: client(id), sink: None, reply: tx })
                .await
                .unwrap();
            rx.await.unwrap().unwrap();
        }

        handle
            .send(Msg::Leave { client_id: "c1".to_string(), cause: LeaveCause::Leave })
            .await
            .unwrap();

        // Give the loop a moment to process the leave before checking via a new join.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (tx, rx) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c4"), sink: None, reply: tx })
            .await
            .unwrap();
        let snapshot = rx.await.unwrap().unwrap();
        assert_eq!(snapshot.master_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn watch_does_not_increment_players() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let handle = spawn(sample_room(), store, RoomConfig::default(), &cancel);

        let (tx, rx) = oneshot::channel();
        handle
            .send(Msg::Watch { client: client("w1"), sink: None, reply: tx })
            .await
            .unwrap();
        let snapshot = rx.await.unwrap().unwrap();
        assert_eq!(snapshot.room_info.players, 0);
    }

    #[tokio::test]
    async fn watcher_observes_master_switch_and_leave() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let mut info = sample_room();
        info.max_players = 3;
        let handle = spawn(info, store, RoomConfig::default(), &cancel);

        let (tx1, rx1) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c1"), sink: None, reply: tx1 })
            .await
            .unwrap();
        rx1.await.unwrap().unwrap();

        let (tx2, rx2) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c2"), sink: None, reply: tx2 })
            .await
            .unwrap();
        rx2.await.unwrap().unwrap();

        let (watch_sink, mut watch_recv) = mpsc::channel(16);
        let (wtx, wrx) = oneshot::channel();
        handle
            .send(Msg::Watch { client: client("w1"), sink: Some(watch_sink), reply: wtx })
            .await
            .unwrap();
        wrx.await.unwrap().unwrap();

        handle
            .send(Msg::Leave { client_id: "c1".to_string(), cause: LeaveCause::Leave })
            .await
            .unwrap();

        let first = watch_recv.recv().await.unwrap();
        assert!(matches!(first, Event::MasterSwitched { ref new_master, .. } if new_master == "c2"));

        let second = watch_recv.recv().await.unwrap();
        assert!(matches!(
            second,
            Event::Left { ref client_id, cause: LeaveCause::Leave, .. } if client_id == "c1"
        ));
    }

    #[tokio::test]
    async fn to_master_reaches_only_the_master() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let mut info = sample_room();
        info.max_players = 2;
        let handle = spawn(info, store, RoomConfig::default(), &cancel);

        let (master_sink, mut master_recv) = mpsc::channel(16);
        let (tx1, rx1) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c1"), sink: Some(master_sink), reply: tx1 })
            .await
            .unwrap();
        rx1.await.unwrap().unwrap();

        let (other_sink, mut other_recv) = mpsc::channel(16);
        let (tx2, rx2) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c2"), sink: Some(other_sink), reply: tx2 })
            .await
            .unwrap();
        rx2.await.unwrap().unwrap();

        // The master already saw c2's Joined broadcast; drain it before the ToMaster send.
        let joined = master_recv.recv().await.unwrap();
        assert!(matches!(joined, Event::Joined { ref client_id, .. } if client_id == "c2"));

        handle
            .send(Msg::ToMaster { sender: "c2".to_string(), payload: b"hello master".to_vec() })
            .await
            .unwrap();

        let received = master_recv.recv().await.unwrap();
        assert!(matches!(
            received,
            Event::Message { ref sender, ref payload, .. }
                if sender == "c2" && payload == b"hello master"
        ));

        // The sender is not the master and must never receive its own ToMaster message.
        assert!(other_recv.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_is_delivered_exactly_once_per_recipient() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let mut info = sample_room();
        info.max_players = 2;
        let handle = spawn(info, store, RoomConfig::default(), &cancel);

        let (sink1, mut recv1) = mpsc::channel(16);
        let (r1, rr1) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c1"), sink: Some(sink1), reply: r1 })
            .await
            .unwrap();
        rr1.await.unwrap().unwrap();

        let (sink2, mut recv2) = mpsc::channel(16);
        let (r2, rr2) = oneshot::channel();
        handle
            .send(Msg::Join { client: client("c2"), sink: Some(sink2), reply: r2 })
            .await
            .unwrap();
        rr2.await.unwrap().unwrap();

        // c1 saw c2's Joined broadcast; drain it before the broadcast under test.
        let joined = recv1.recv().await.unwrap();
        assert!(matches!(joined, Event::Joined { .. }));

        handle
            .send(Msg::Broadcast { sender: "c1".to_string(), payload: b"hi".to_vec() })
            .await
            .unwrap();

        let seen1 = recv1.recv().await.unwrap();
        assert!(matches!(seen1, Event::Message { ref payload, .. } if payload == b"hi"));
        assert!(recv1.try_recv().is_err(), "c1 must not receive the broadcast twice");

        let seen2 = recv2.recv().await.unwrap();
        assert!(matches!(seen2, Event::Message { ref payload, .. } if payload == b"hi"));
        assert!(recv2.try_recv().is_err(), "c2 must not receive the broadcast twice");
    }
}
