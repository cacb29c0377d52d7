//! Lobby dispatch: Create/JoinById/JoinByNumber/JoinAtRandom/Watch*/Search.
//! Each operation runs a rate-limit check, then validation, then dispatch, with every
//! failure mapped to a typed error and returned as `Result<_, AppError>` rather than
//! pushed as a message to a connected player, since the lobby answers an HTTP request
//! rather than an already-open session.

pub mod http;

use crate::cache::{host_cache::HostCache, room_cache::RoomCache};
use crate::config::LobbyConfig;
use crate::metrics::ServerMetrics;
use crate::protocol::types::{ClientInfo, JoinedRoomRes, RoomId, RoomInfo, RoomOption};
use crate::protocol::AppError;
use crate::query::{matches_any_group, PropQueries};
use crate::rate_limit::AppRateLimiter;
use crate::rpc::{CreateRoomReq, JoinRoomReq, RpcPool};
use crate::store::{HostKind, HostStore, RoomStore};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// An application as the lobby needs it: just the id dispatch requests are keyed by.
/// Token-signing (which also needs the app's HMAC key) happens on the game host that
/// actually admits the client, not here.
#[derive(Debug, Clone)]
pub struct App {
    pub id: String,
}

pub struct LobbyService {
    room_store: Arc<dyn RoomStore>,
    host_store: Arc<dyn HostStore>,
    room_cache: RoomCache,
    host_cache: HostCache,
    rpc: RpcPool,
    rate_limiter: Arc<AppRateLimiter>,
    metrics: Arc<ServerMetrics>,
    config: LobbyConfig,
}

impl LobbyService {
    pub fn new(
        room_store: Arc<dyn RoomStore>,
        host_store: Arc<dyn HostStore>,
        rate_limiter: Arc<AppRateLimiter>,
        metrics: Arc<ServerMetrics>,
        config: LobbyConfig,
    ) -> Self {
        let room_cache = RoomCache::with_ttl(
            room_store.clone(),
            Duration::from_millis(config.room_cache_ttl_ms),
        );
        let host_cache = HostCache::with_ttl(
            host_store.clone(),
            chrono::Duration::seconds(i64::try_from(config.valid_heartbeat_secs).unwrap_or(90)),
            Duration::from_secs(config.host_cache_ttl_secs),
        );
        let rpc = RpcPool::new(Duration::from_secs(config.rpc_timeout_secs));
        Self {
            room_store,
            host_store,
            room_cache,
            host_cache,
            rpc,
            rate_limiter,
            metrics,
            config,
        }
    }

    /// Pick a random live game host and ask it to create the room.
    pub async fn create(
        &self,
        app: &App,
        room_option: RoomOption,
        client: ClientInfo,
    ) -> Result<JoinedRoomRes, AppError> {
        self.rate_limiter.check_room_creation(&app.id).await?;

        let host = self
            .host_cache
            .rand(HostKind::Game)
            .await
            .map_err(AppError::Internal)?
            .ok_or(AppError::NoLiveHost)?;

        let req = CreateRoomReq { app_id: app.id.clone(), room_option, client };
        let result = self.rpc.create_room(&host, &req).await;
        match &result {
            Ok(_) => self.metrics.increment_rooms_created(),
            Err(_) => {
                self.metrics.increment_room_creation_failures();
                self.metrics.increment_rpc_dispatch_failures();
            }
        }
        self.room_cache.invalidate(&app.id, req.room_option.search_group).await;
        result
    }

    pub async fn join_by_id(
        &self,
        app: &App,
        room_id: &RoomId,
        queries: Vec<PropQueries>,
        client: ClientInfo,
    ) -> Result<JoinedRoomRes, AppError> {
        self.rate_limiter.check_join_attempt(&app.id).await?;
        let room = self.lookup_for_join(app, room_id, &queries).await?;
        self.dispatch_join(app, &room, client).await
    }

    pub async fn join_by_number(
        &self,
        app: &App,
        number: u32,
        queries: Vec<PropQueries>,
        client: ClientInfo,
    ) -> Result<JoinedRoomRes, AppError> {
        self.rate_limiter.check_join_attempt(&app.id).await?;
        let room = self
            .room_store
            .get_room_by_number(&app.id, number)
            .await
            .map_err(AppError::Internal)?
            .filter(|r| r.is_joinable() && matches_any_group(&queries, &r.public_props))
            .ok_or(AppError::NotFound)?;
        self.dispatch_join(app, &room, client).await
    }

    /// Shuffle up to `search_candidate_cap` joinable, query-matching candidates and try
    /// each in turn, absorbing `NotFound`/`FailedPrecondition`/`ResourceExhausted`/
    /// `AlreadyExists` as "try the next candidate" (the room filled or closed between
    /// the cache read and the dispatch) rather than failing the whole call outright.
    /// `InvalidArgument` still aborts immediately —
    /// a malformed request isn't going to succeed against a different room either.
    /// Returns `Ok(None)` rather than an error when every candidate was exhausted
    /// without success, i.e. "no joinable room found" is a normal, non-error outcome.
    pub async fn join_at_random(
        &self,
        app: &App,
        search_group: u32,
        queries: Vec<PropQueries>,
        client: ClientInfo,
    ) -> Result<Option<JoinedRoomRes>, AppError> {
        self.rate_limiter.check_join_attempt(&app.id).await?;
        self.metrics.increment_join_at_random_attempts();

        let deadline = Instant::now()
            + Duration::from_secs(self.config.join_at_random_timeout_secs);
        let mut candidates = self.joinable_candidates(app, search_group, &queries).await?;
        candidates.shuffle(&mut rand::thread_rng());

        for room in candidates {
            if Instant::now() >= deadline {
                debug!(app_id = %app.id, search_group, "join_at_random timed out mid-walk");
                break;
            }
            match self.dispatch_join(app, &room, client.clone()).await {
                Ok(res) => return Ok(Some(res)),
                Err(err @ AppError::InvalidArgument(_)) => return Err(err),
                Err(err) => {
                    debug!(room_id = %room.id, %err, "join_at_random candidate rejected, trying next");
                }
            }
        }
        self.metrics.increment_join_at_random_no_candidate();
        Ok(None)
    }

    pub async fn watch_by_id(
        &self,
        app: &App,
        room_id: &RoomId,
        queries: Vec<PropQueries>,
        client: ClientInfo,
    ) -> Result<Option<JoinedRoomRes>, AppError> {
        let Some(room) = self
            .room_store
            .get_room_by_id(&app.id, room_id)
            .await
            .map_err(AppError::Internal)?
        else {
            return Ok(None);
        };
        if !room.watchable || !matches_any_group(&queries, &room.public_props) {
            return Ok(None);
        }
        self.dispatch_watch(app, &room, client).await
    }

    pub async fn watch_by_number(
        &self,
        app: &App,
        number: u32,
        queries: Vec<PropQueries>,
        client: ClientInfo,
    ) -> Result<Option<JoinedRoomRes>, AppError> {
        let Some(room) = self
            .room_store
            .get_room_by_number(&app.id, number)
            .await
            .map_err(AppError::Internal)?
        else {
            return Ok(None);
        };
        if !room.watchable || !matches_any_group(&queries, &room.public_props) {
            return Ok(None);
        }
        self.dispatch_watch(app, &room, client).await
    }

    /// Visible rooms matching `queries` in `search_group`, optionally restricted to
    /// currently-joinable/-watchable rooms.
    pub async fn search(
        &self,
        app: &App,
        search_group: u32,
        queries: Vec<PropQueries>,
        limit: usize,
        joinable_only: bool,
        watchable_only: bool,
    ) -> Result<Vec<RoomInfo>, AppError> {
        self.metrics.increment_search_queries();
        let rooms = self.room_cache.search(&app.id, search_group).await.map_err(AppError::Internal)?;
        Ok(rooms
            .into_iter()
            .filter(|r| !joinable_only || r.is_joinable())
            .filter(|r| !watchable_only || r.watchable)
            .filter(|r| matches_any_group(&queries, &r.public_props))
            .take(limit)
            .collect())
    }

    async fn lookup_for_join(
        &self,
        app: &App,
        room_id: &RoomId,
        queries: &[PropQueries],
    ) -> Result<RoomInfo, AppError> {
        self.room_store
            .get_room_by_id(&app.id, room_id)
            .await
            .map_err(AppError::Internal)?
            .filter(|r| r.is_joinable() && matches_any_group(queries, &r.public_props))
            .ok_or(AppError::NotFound)
    }

    async fn joinable_candidates(
        &self,
        app: &App,
        search_group: u32,
        queries: &[PropQueries],
    ) -> Result<Vec<RoomInfo>, AppError> {
        let rooms = self.room_cache.search(&app.id, search_group).await.map_err(AppError::Internal)?;
        Ok(rooms
            .into_iter()
            .filter(|r| r.is_joinable())
            .filter(|r| matches_any_group(queries, &r.public_props))
            .take(self.config.search_candidate_cap)
            .collect())
    }

    async fn dispatch_join(
        &self,
        app: &App,
        room: &RoomInfo,
        client: ClientInfo,
    ) -> Result<JoinedRoomRes, AppError> {
        let host = self
            .host_cache
            .get(HostKind::Game, room.host_id)
            .await
            .map_err(AppError::Internal)?
            .ok_or(AppError::NotFound)?;

        let req = JoinRoomReq { app_id: app.id.clone(), queries: vec![], client };
        let result = self.rpc.join_room(&host, &room.id, &req).await;
        match &result {
            Ok(_) => self.metrics.increment_rooms_joined(),
            Err(_) => self.metrics.increment_room_join_failures(),
        }
        result
    }

    /// Pick a hub to serve `room`: prefer a hub already assigned to it with spare
    /// watcher capacity (spreads watchers of the same room across hubs rather than
    /// piling them onto whichever hub happened to get there first), else fall back to
    /// any random live hub.
    async fn dispatch_watch(
        &self,
        app: &App,
        room: &RoomInfo,
        client: ClientInfo,
    ) -> Result<Option<JoinedRoomRes>, AppError> {
        let assignments = self
            .host_store
            .hubs_for_room(&room.id)
            .await
            .map_err(AppError::Internal)?;
        let under_capacity: Vec<_> = assignments
            .into_iter()
            .filter(|a| a.watchers < self.config.max_watchers)
            .collect();

        let host = if let Some(assignment) = under_capacity.choose(&mut rand::thread_rng()) {
            self.host_cache.get(HostKind::Hub, assignment.host_id).await
        } else {
            self.host_cache.rand(HostKind::Hub).await
        }
        .map_err(AppError::Internal)?;

        let Some(host) = host else {
            warn!(room_id = %room.id, "no live hub available to serve a watch request");
            return Ok(None);
        };

        let req = JoinRoomReq { app_id: app.id.clone(), queries: vec![], client };
        match self.rpc.watch_room(&host, &room.id, &req).await {
            Ok(res) => {
                self.metrics.increment_rooms_watched();
                Ok(Some(res))
            }
            Err(AppError::NotFound | AppError::FailedPrecondition(_)) => Ok(None),
            Err(err) => {
                self.metrics.increment_room_join_failures();
                Err(err)
            }
        }
    }
}
