//! Dispatch RPC between the lobby and game/hub hosts: a lazy
//! address→connection map, realized as one pooled [`reqwest::Client`] per host address.

use crate::protocol::error::{AppError, RemoteStatus};
use crate::protocol::types::{ClientInfo, Host, JoinedRoomRes, RoomOption};
use crate::query::PropQueries;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body for `POST /internal/rooms`. `app_id` travels with the request since one game
/// host serves every app in the deployment (the host pool is not partitioned by app).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomReq {
    pub app_id: String,
    pub room_option: RoomOption,
    pub client: ClientInfo,
}

/// Body for `POST /internal/rooms/{roomId}/join` and `.../watch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomReq {
    pub app_id: String,
    #[serde(default)]
    pub queries: Vec<PropQueries>,
    pub client: ClientInfo,
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    code: String,
    message: String,
}

/// Lazy `address → reqwest::Client` map. Each distinct host address gets its own pooled
/// client so one host's connection failures/backoff never bleed into another's; tearing
/// an entry down (on a sustained dispatch failure) forces the next `Get` to build a
/// fresh client rather than reuse a potentially wedged connection pool.
pub struct RpcPool {
    clients: DashMap<String, reqwest::Client>,
    timeout: Duration,
}

impl Default for RpcPool {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl RpcPool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            timeout,
        }
    }

    fn get(&self, base_url: &str) -> reqwest::Client {
        if let Some(client) = self.clients.get(base_url) {
            return client.clone();
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .expect("reqwest client builder should not fail with only a timeout set");
        self.clients.insert(base_url.to_string(), client.clone());
        client
    }

    /// Drop the pooled client for `base_url`, forcing a fresh one on the next call.
    pub fn teardown(&self, base_url: &str) {
        self.clients.remove(base_url);
    }

    pub async fn create_room(
        &self,
        host: &Host,
        req: &CreateRoomReq,
    ) -> Result<JoinedRoomRes, AppError> {
        self.dispatch(host, "/internal/rooms", req).await
    }

    pub async fn join_room(
        &self,
        host: &Host,
        room_id: &str,
        req: &JoinRoomReq,
    ) -> Result<JoinedRoomRes, AppError> {
        self.dispatch(host, &format!("/internal/rooms/{room_id}/join"), req)
            .await
    }

    pub async fn watch_room(
        &self,
        host: &Host,
        room_id: &str,
        req: &JoinRoomReq,
    ) -> Result<JoinedRoomRes, AppError> {
        self.dispatch(host, &format!("/internal/rooms/{room_id}/watch"), req)
            .await
    }

    async fn dispatch<Req: Serialize>(
        &self,
        host: &Host,
        path: &str,
        body: &Req,
    ) -> Result<JoinedRoomRes, AppError> {
        let base_url = host.base_url();
        let client = self.get(&base_url);
        let url = format!("{base_url}{path}");

        let response = client.post(&url).json(body).send().await.map_err(|e| {
            self.teardown(&base_url);
            AppError::Internal(anyhow::anyhow!("dispatch to {url} failed: {e}"))
        })?;

        if response.status().is_success() {
            response
                .json::<JoinedRoomRes>()
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed dispatch reply: {e}")))
        } else {
            let body = response
                .json::<RemoteErrorBody>()
                .await
                .unwrap_or_else(|_| RemoteErrorBody {
                    code: "Internal".to_string(),
                    message: "dispatch call failed with an unreadable error body".to_string(),
                });
            Err(remote_error(&body.code, body.message))
        }
    }
}

fn remote_error(code: &str, message: String) -> AppError {
    match code {
        "invalid_argument" => AppError::InvalidArgument(message),
        "not_found" => AppError::NotFound,
        "failed_precondition" => AppError::FailedPrecondition(message),
        "resource_exhausted" => AppError::ResourceExhausted(message),
        "already_exists" => AppError::AlreadyExists(message),
        _ => AppError::Internal(anyhow::anyhow!(message)),
    }
}

/// Same mapping, reused directly when a caller already has a [`RemoteStatus`] rather
/// than its JSON wire spelling.
pub fn from_remote_status(status: RemoteStatus, message: impl Into<String>) -> AppError {
    let message = message.into();
    match status {
        RemoteStatus::InvalidArgument => AppError::InvalidArgument(message),
        RemoteStatus::NotFound => AppError::NotFound,
        RemoteStatus::FailedPrecondition => AppError::FailedPrecondition(message),
        RemoteStatus::ResourceExhausted => AppError::ResourceExhausted(message),
        RemoteStatus::AlreadyExists => AppError::AlreadyExists(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_the_same_client_for_one_address() {
        let pool = RpcPool::default();
        pool.get("http://host-a:9000");
        pool.get("http://host-a:9000");
        assert_eq!(pool.clients.len(), 1);
    }

    #[test]
    fn teardown_forces_a_fresh_client_on_next_get() {
        let pool = RpcPool::default();
        pool.get("http://host-a:9000");
        pool.teardown("http://host-a:9000");
        assert_eq!(pool.clients.len(), 0);
        pool.get("http://host-a:9000");
        assert_eq!(pool.clients.len(), 1);
    }

    #[test]
    fn remote_error_mapping_round_trips_known_codes() {
        assert!(matches!(
            remote_error("invalid_argument", "bad".into()),
            AppError::InvalidArgument(_)
        ));
        assert!(matches!(
            remote_error("not_found", "x".into()),
            AppError::NotFound
        ));
        assert!(matches!(
            remote_error("weird_unknown_code", "x".into()),
            AppError::Internal(_)
        ));
    }
}
