//! Per-(host, app) room/client registry: a `DashMap`-backed registry with
//! id-generation-with-retry on the insert path, fronting the per-room event loop.

pub mod http;

use crate::protocol::types::{generate_room_id, App, ClientInfo, RoomId, RoomOption};
use crate::protocol::wire::Event;
use crate::protocol::{AppError, JoinedRoomRes};
use crate::room::msg::Msg;
use crate::room::{RoomConfig, RoomHandle};
use crate::store::{RoomStore, StoreError};
use crate::{auth, protocol::types::RoomInfo};
use dashmap::DashMap;
use rand::Rng as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Deadline for the Create transaction's wait on the master client's Join reply.
const CREATE_JOIN_DEADLINE: Duration = Duration::from_secs(5);

pub struct Repository {
    host_id: u32,
    store: Arc<dyn RoomStore>,
    rooms: DashMap<RoomId, RoomHandle>,
    retry_count: u32,
    max_room_num: u32,
    room_config: RoomConfig,
    cancel: CancellationToken,
}

impl Repository {
    pub fn new(
        host_id: u32,
        store: Arc<dyn RoomStore>,
        retry_count: u32,
        max_room_num: u32,
        room_config: RoomConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            host_id,
            store,
            rooms: DashMap::new(),
            retry_count,
            max_room_num,
            room_config,
            cancel,
        }
    }

    pub fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|h| h.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Generate a 16-hex id (retrying on collision up to `retry_count`), optionally a
    /// fresh random `number` in `[1, max_room_num]` when `room_option.number == Some(0)`
    /// (the auto-assign sentinel; `None` means no number at all, `Some(n)` with `n > 0`
    /// is an explicit caller-chosen number), insert the row, spin up the room loop, and
    /// block on the master client's Join reply with a 5s deadline.
    pub async fn create_room(
        &self,
        app: &App,
        room_option: RoomOption,
        client: ClientInfo,
    ) -> Result<JoinedRoomRes, AppError> {
        let mut last_err = None;
        for _ in 0..self.retry_count.max(1) {
            let id = generate_room_id();
            let number = match room_option.number {
                None => None,
                Some(0) => Some(rand::thread_rng().gen_range(1..=self.max_room_num)),
                Some(n) => Some(n),
            };

            let info = RoomInfo {
                id: id.clone(),
                app_id: app.id.clone(),
                host_id: self.host_id,
                number,
                search_group: room_option.search_group,
                max_players: room_option.max_players,
                players: 0,
                visible: room_option.visible,
                joinable: room_option.joinable,
                watchable: room_option.watchable,
                public_props: room_option.public_props.clone(),
                private_props: room_option.private_props.clone(),
                created: chrono::Utc::now(),
            };

            match self.store.insert_room(info.clone()).await {
                Ok(()) => {
                    return self.birth_room(app, info, client).await;
                }
                Err(err) => {
                    if let Some(store_err) = err.downcast_ref::<StoreError>() {
                        match store_err {
                            StoreError::RoomIdConflict(_) | StoreError::RoomNumberConflict(_) => {
                                last_err = Some(AppError::ResourceExhausted(store_err.to_string()));
                                continue;
                            }
                            StoreError::RoomNotFound => {}
                        }
                    }
                    return Err(AppError::Internal(err));
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| AppError::ResourceExhausted("exhausted id/number retries".into())))
    }

    async fn birth_room(
        &self,
        app: &App,
        info: RoomInfo,
        client: ClientInfo,
    ) -> Result<JoinedRoomRes, AppError> {
        let handle = crate::room::spawn(
            info.clone(),
            self.store.clone(),
            self.room_config,
            &self.cancel,
        );
        self.rooms.insert(info.id.clone(), handle.clone());

        let (reply_tx, reply_rx) = oneshot::channel();
        if handle
            .send(Msg::Join {
                client: client.clone(),
                sink: None,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            self.rooms.remove(&info.id);
            let _ = self.store.delete_room(&app.id, &info.id).await;
            return Err(AppError::Internal(anyhow::anyhow!(
                "room loop died before accepting its master client"
            )));
        }

        let snapshot = match tokio::time::timeout(CREATE_JOIN_DEADLINE, reply_rx).await {
            Ok(Ok(Ok(snapshot))) => snapshot,
            Ok(Ok(Err(err))) => {
                self.rooms.remove(&info.id);
                let _ = self.store.delete_room(&app.id, &info.id).await;
                return Err(err);
            }
            Ok(Err(_)) | Err(_) => {
                self.rooms.remove(&info.id);
                handle.shutdown();
                let _ = self.store.delete_room(&app.id, &info.id).await;
                return Err(AppError::Internal(anyhow::anyhow!(
                    "timed out waiting for the master client's join reply"
                )));
            }
        };

        let token = auth::token::issue(&app.key, &client.id, &info.id);
        Ok(JoinedRoomRes {
            room_info: snapshot.room_info,
            players: snapshot.players,
            token,
            master_id: snapshot.master_id,
            deadline_seconds: snapshot.deadline_seconds,
        })
    }

    /// Forward a join to an already-running room, honoring `deadline` on the reply wait.
    pub async fn join_room(
        &self,
        app: &App,
        room_id: &RoomId,
        client: ClientInfo,
        sink: Option<mpsc::Sender<Event>>,
        deadline: Duration,
    ) -> Result<JoinedRoomRes, AppError> {
        let handle = self.get(room_id).ok_or(AppError::NotFound)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .send(Msg::Join { client: client.clone(), sink, reply: reply_tx })
            .await
            .map_err(|_| AppError::NotFound)?;

        let snapshot = match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) | Err(_) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "timed out waiting for join reply"
                )))
            }
        };

        let token = auth::token::issue(&app.key, &client.id, room_id);
        Ok(JoinedRoomRes {
            room_info: snapshot.room_info,
            players: snapshot.players,
            token,
            master_id: snapshot.master_id,
            deadline_seconds: snapshot.deadline_seconds,
        })
    }

    /// Same shape as `join_room` but dispatches `Msg::Watch`.
    pub async fn watch_room(
        &self,
        app: &App,
        room_id: &RoomId,
        client: ClientInfo,
        sink: Option<mpsc::Sender<Event>>,
        deadline: Duration,
    ) -> Result<JoinedRoomRes, AppError> {
        let handle = self.get(room_id).ok_or(AppError::NotFound)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .send(Msg::Watch { client: client.clone(), sink, reply: reply_tx })
            .await
            .map_err(|_| AppError::NotFound)?;

        let snapshot = match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) | Err(_) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "timed out waiting for watch reply"
                )))
            }
        };

        let token = auth::token::issue(&app.key, &client.id, room_id);
        Ok(JoinedRoomRes {
            room_info: snapshot.room_info,
            players: snapshot.players,
            token,
            master_id: snapshot.master_id,
            deadline_seconds: snapshot.deadline_seconds,
        })
    }

    /// Drop a room from the registry once its loop has shut down; called by whoever
    /// observes the handle's channel close (the lobby dispatch path, or a maintenance
    /// sweep), since the loop itself has no reference back into this map.
    pub fn forget(&self, room_id: &RoomId) {
        if let Some((_, handle)) = self.rooms.remove(room_id) {
            if !handle.is_closed() {
                warn!(%room_id, "forgetting a room whose loop is still running");
            }
        }
    }
}
