//! Public lobby HTTP surface: `POST /rooms`, `/rooms/join/...`, `/rooms/watch/...`,
//! `/rooms/search/{searchGroup}`. The caller's app identity arrives pre-verified in an
//! `X-App-Id` header.

use super::{App, LobbyService};
use crate::protocol::types::{ClientInfo, JoinedRoomRes, RoomInfo, RoomOption};
use crate::protocol::AppError;
use crate::query::PropQueries;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub struct LobbyState {
    pub service: Arc<LobbyService>,
}

pub fn router(state: Arc<LobbyState>) -> Router {
    Router::new()
        .route("/rooms", post(create))
        .route("/rooms/join/id/{room_id}", post(join_by_id))
        .route("/rooms/join/number/{number}", post(join_by_number))
        .route("/rooms/join/random/{search_group}", post(join_at_random))
        .route("/rooms/watch/id/{room_id}", post(watch_by_id))
        .route("/rooms/watch/number/{number}", post(watch_by_number))
        .route("/rooms/search/{search_group}", post(search))
        .with_state(state)
}

const APP_ID_HEADER: &str = "x-app-id";

fn app_from_headers(headers: &HeaderMap) -> Result<App, AppError> {
    let id = headers
        .get(APP_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidArgument("missing X-App-Id header".to_string()))?;
    Ok(App { id: id.to_string() })
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    room: RoomOption,
    client: ClientInfo,
}

#[derive(Debug, Deserialize)]
struct JoinBody {
    #[serde(default)]
    query: Vec<PropQueries>,
    client: ClientInfo,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    query: Vec<PropQueries>,
    #[serde(default = "default_search_limit")]
    limit: usize,
    #[serde(default)]
    joinable: bool,
    #[serde(default)]
    watchable: bool,
}

fn default_search_limit() -> usize {
    100
}

/// Wraps `Join*`/`Watch*` dispatch: `found: false` is the semantic "no such room"
/// outcome, returned as a normal 200 rather than an error status.
#[derive(Debug, Serialize)]
struct JoinResponse {
    found: bool,
    room: Option<JoinedRoomRes>,
}

impl From<JoinedRoomRes> for JoinResponse {
    fn from(res: JoinedRoomRes) -> Self {
        Self { found: true, room: Some(res) }
    }
}

impl From<Option<JoinedRoomRes>> for JoinResponse {
    fn from(res: Option<JoinedRoomRes>) -> Self {
        match res {
            Some(res) => res.into(),
            None => Self { found: false, room: None },
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    rooms: Vec<RoomInfo>,
}

async fn create(
    State(state): State<Arc<LobbyState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<Json<JoinedRoomRes>, AppError> {
    let app = app_from_headers(&headers)?;
    let res = state.service.create(&app, body.room, body.client).await?;
    Ok(Json(res))
}

async fn join_by_id(
    State(state): State<Arc<LobbyState>>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, AppError> {
    let app = app_from_headers(&headers)?;
    let res = state.service.join_by_id(&app, &room_id, body.query, body.client).await?;
    Ok(Json(res.into()))
}

async fn join_by_number(
    State(state): State<Arc<LobbyState>>,
    headers: HeaderMap,
    Path(number): Path<u32>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, AppError> {
    let app = app_from_headers(&headers)?;
    let res = state.service.join_by_number(&app, number, body.query, body.client).await?;
    Ok(Json(res.into()))
}

async fn join_at_random(
    State(state): State<Arc<LobbyState>>,
    headers: HeaderMap,
    Path(search_group): Path<u32>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, AppError> {
    let app = app_from_headers(&headers)?;
    let res = state
        .service
        .join_at_random(&app, search_group, body.query, body.client)
        .await?;
    Ok(Json(res.into()))
}

async fn watch_by_id(
    State(state): State<Arc<LobbyState>>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, AppError> {
    let app = app_from_headers(&headers)?;
    let res = state.service.watch_by_id(&app, &room_id, body.query, body.client).await?;
    Ok(Json(res.into()))
}

async fn watch_by_number(
    State(state): State<Arc<LobbyState>>,
    headers: HeaderMap,
    Path(number): Path<u32>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, AppError> {
    let app = app_from_headers(&headers)?;
    let res = state.service.watch_by_number(&app, number, body.query, body.client).await?;
    Ok(Json(res.into()))
}

async fn search(
    State(state): State<Arc<LobbyState>>,
    headers: HeaderMap,
    Path(search_group): Path<u32>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let app = app_from_headers(&headers)?;
    let rooms = state
        .service
        .search(&app, search_group, body.query, body.limit, body.joinable, body.watchable)
        .await?;
    Ok(Json(SearchResponse { rooms }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn app_from_headers_requires_the_header() {
        let headers = HeaderMap::new();
        assert!(app_from_headers(&headers).is_err());
    }

    #[test]
    fn app_from_headers_reads_the_app_id() {
        let mut headers = HeaderMap::new();
        headers.insert(APP_ID_HEADER, HeaderValue::from_static("app1"));
        let app = app_from_headers(&headers).unwrap();
        assert_eq!(app.id, "app1");
    }

    #[test]
    fn join_response_from_none_reports_not_found() {
        let response: JoinResponse = None.into();
        assert!(!response.found);
        assert!(response.room.is_none());
    }
}
