//! Internal game/hub dispatch surface: `POST /internal/rooms`,
//! `/internal/rooms/{roomId}/join`, `.../watch`, and the client-facing websocket
//! upgrade that attaches a transport to an already-admitted client. This is the
//! HTTP side [`crate::rpc::RpcPool`] talks to from the lobby process.

use crate::auth;
use crate::client_session;
use crate::protocol::types::{App, RoomId};
use crate::protocol::AppError;
use crate::rpc::{CreateRoomReq, JoinRoomReq};
use crate::store::AppRegistry;
use crate::protocol::types::JoinedRoomRes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::Repository;

pub struct GameState {
    pub repo: Arc<Repository>,
    pub apps: Arc<AppRegistry>,
    pub join_deadline: Duration,
    pub send_queue_capacity: usize,
}

pub fn router(state: Arc<GameState>) -> Router {
    Router::new()
        .route("/internal/rooms", post(create_room))
        .route("/internal/rooms/{room_id}/join", post(join_room))
        .route("/internal/rooms/{room_id}/watch", post(watch_room))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

fn resolve_app(apps: &AppRegistry, app_id: &str) -> Result<App, AppError> {
    apps.get(app_id)
        .cloned()
        .ok_or_else(|| AppError::InvalidArgument(format!("unknown app id {app_id}")))
}

async fn create_room(
    State(state): State<Arc<GameState>>,
    Json(req): Json<CreateRoomReq>,
) -> Result<Json<JoinedRoomRes>, AppError> {
    let app = resolve_app(&state.apps, &req.app_id)?;
    let res = state.repo.create_room(&app, req.room_option, req.client).await?;
    Ok(Json(res))
}

async fn join_room(
    State(state): State<Arc<GameState>>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<JoinRoomReq>,
) -> Result<Json<JoinedRoomRes>, AppError> {
    let app = resolve_app(&state.apps, &req.app_id)?;
    let res = state
        .repo
        .join_room(&app, &room_id, req.client, None, state.join_deadline)
        .await?;
    Ok(Json(res))
}

async fn watch_room(
    State(state): State<Arc<GameState>>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<JoinRoomReq>,
) -> Result<Json<JoinedRoomRes>, AppError> {
    let app = resolve_app(&state.apps, &req.app_id)?;
    let res = state
        .repo
        .watch_room(&app, &room_id, req.client, None, state.join_deadline)
        .await?;
    Ok(Json(res))
}

/// Query string for the websocket upgrade: the app's HMAC key verifies the token
/// issued by `create_room`/`join_room`/`watch_room`, binding this connection to the
/// exact `(client_id, room_id)` pair it was minted for.
#[derive(Debug, Deserialize)]
struct ConnectParams {
    app_id: String,
    room_id: RoomId,
    client_id: String,
    nonce: String,
    hmac: String,
    #[serde(default)]
    since_seq: Option<u32>,
}

async fn ws_upgrade(
    State(state): State<Arc<GameState>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let app = resolve_app(&state.apps, &params.app_id)?;
    let token = crate::protocol::types::Token { nonce: params.nonce, hmac: params.hmac };
    auth::token::verify(&app.key, &token, &params.client_id, &params.room_id)
        .map_err(|_| AppError::InvalidArgument("token verification failed".to_string()))?;

    let Some(room) = state.repo.get(&params.room_id) else {
        return Err(AppError::NotFound);
    };

    let client_id = params.client_id;
    let since_seq = params.since_seq;
    let send_queue_capacity = state.send_queue_capacity;
    Ok(ws.on_upgrade(move |socket| async move {
        client_session::run(socket, room, client_id, since_seq, send_queue_capacity).await;
    }))
}

/// Build the `(app_id -> App)` registry both the lobby and game dispatch surfaces
/// resolve requests against, from the shared `apps` config table.
pub fn build_app_registry(apps: &[crate::config::AppConfig]) -> AppRegistry {
    apps.iter()
        .map(|a| (a.id.clone(), App { id: a.id.clone(), key: a.key.clone().into_bytes() }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_app_registry_keys_by_id() {
        let apps = vec![crate::config::AppConfig { id: "app1".to_string(), key: "secret".to_string() }];
        let registry = build_app_registry(&apps);
        assert_eq!(registry.get("app1").unwrap().key, b"secret".to_vec());
    }

    #[test]
    fn resolve_app_rejects_unknown_id() {
        let registry = build_app_registry(&[]);
        let err = resolve_app(&registry, "missing").unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }
}
