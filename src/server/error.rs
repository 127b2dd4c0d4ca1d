//! Mapping failures onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::sync::SyncError;

/// A failed request. Every variant renders as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself was malformed.
    #[error("{0}")]
    BadRequest(String),

    /// A snapshot could not be produced for a read.
    #[error("failed to read snapshot: {0}")]
    Read(#[source] SyncError),

    /// A create, update, delete or move failed.
    #[error("{0}")]
    Mutation(#[source] SyncError),
}

/// Result type for request handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Read(SyncError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Read(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Mutation(e) => match e {
                SyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                SyncError::NotFound(_) => StatusCode::NOT_FOUND,
                SyncError::RemoteWriteConflict(_) => StatusCode::CONFLICT,
                SyncError::RemoteList { .. } | SyncError::Backend(_) => StatusCode::BAD_GATEWAY,
                SyncError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
