//! Sync and match endpoints.

use crate::error::ServerError;
use crate::server::FieldSyncServer;
use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use sync_types::{MatchRequest, MatchResult, RecordKind, SyncError, SyncRequest, SyncResponse};

/// `POST /sync/:kind`
pub async fn sync_handler(
    Extension(server): Extension<Arc<FieldSyncServer>>,
    Path(kind): Path<String>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let kind: RecordKind = kind.parse()?;
    let Json(request) = payload?;
    Ok(Json(server.sync(kind, &request).await?))
}

/// `POST /match`
pub async fn match_handler(
    Extension(server): Extension<Arc<FieldSyncServer>>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(server.find_matches(&request).await?))
}

/// Error body: `{ "error": <kind>, "message": <text> }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error kind.
    pub error: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// A [`ServerError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(ServerError::Request(err))
    }
}

/// Bodies axum cannot decode (bad JSON, a non-UUID id, a template that is
/// not base64) are answered like any other malformed request.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServerError::Request(SyncError::InvalidData(rejection.body_text())))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServerError::Request(SyncError::Validation(_))
            | ServerError::Request(SyncError::InvalidData(_)) => StatusCode::BAD_REQUEST,
            ServerError::Request(SyncError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Request(SyncError::Conflict(_)) => StatusCode::CONFLICT,
            ServerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match &self.0 {
            ServerError::Request(e) => ErrorBody {
                error: e.kind(),
                message: e.to_string(),
            },
            ServerError::RateLimited { reason } => ErrorBody {
                error: "rate_limited",
                message: reason.clone(),
            },
            // Internal details stay in the logs.
            _ => ErrorBody {
                error: "internal",
                message: "internal server error".to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(self.body())).into_response()
    }
}
