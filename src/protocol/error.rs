//! Error taxonomy surfaced to clients and its HTTP-status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json;
use thiserror::Error;

/// Status codes returned by the game/hub dispatch surface, mirroring the gRPC status
/// codes a generated stub would carry, over this crate's HTTP/JSON transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    ResourceExhausted,
    AlreadyExists,
}

/// Errors raised anywhere below the HTTP boundary: store, cache, RPC, room loop.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("room not found")]
    NotFound,
    #[error("precondition failed: {0}")]
    FailedPrecondition(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("no live host available")]
    NoLiveHost,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn remote_status(&self) -> Option<RemoteStatus> {
        match self {
            AppError::InvalidArgument(_) => Some(RemoteStatus::InvalidArgument),
            AppError::NotFound => Some(RemoteStatus::NotFound),
            AppError::FailedPrecondition(_) => Some(RemoteStatus::FailedPrecondition),
            AppError::ResourceExhausted(_) => Some(RemoteStatus::ResourceExhausted),
            AppError::AlreadyExists(_) => Some(RemoteStatus::AlreadyExists),
            AppError::NoLiveHost | AppError::Internal(_) => None,
        }
    }

    /// HTTP status for the lobby surface. A 400 aborts any caller-side retry loop;
    /// NotFound/FailedPrecondition are absorbed by `JoinAtRandom` rather than surfaced.
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::NoLiveHost | AppError::ResourceExhausted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::NotFound | AppError::FailedPrecondition(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let code = self
            .remote_status()
            .and_then(|s| serde_json::to_value(s).ok())
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "internal".to_string());
        // DB/RPC internals never leak raw driver errors; only the top-level Display is
        // sent, which for `Internal` is the anyhow chain's outer message.
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_maps_to_400() {
        let err = AppError::InvalidArgument("bad room id".into());
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.remote_status(), Some(RemoteStatus::InvalidArgument));
    }

    #[test]
    fn already_exists_maps_to_409() {
        let err = AppError::AlreadyExists("client already present".into());
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn no_live_host_maps_to_503_with_no_remote_status() {
        let err = AppError::NoLiveHost;
        assert_eq!(err.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.remote_status(), None);
    }
}
