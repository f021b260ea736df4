use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("No active identity")]
    NotAuthenticated,

    #[error("Incident type is required")]
    MissingType,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Remote delivery failed: {0}")]
    RemoteDeliveryFailed(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind for the presentation layer.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::StorageUnavailable(_) => "storage_unavailable",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::MissingType => "missing_type",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::WriteConflict(_) => "write_conflict",
            AppError::RemoteDeliveryFailed(_) => "remote_delivery_failed",
            AppError::Unauthorized => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound => "not_found",
            AppError::Database(_) | AppError::Pool(_) | AppError::Json(_) | AppError::Internal(_) => {
                "internal"
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AppError::StorageUnavailable(msg),
            StoreError::WriteConflict(msg) => AppError::WriteConflict(msg),
            StoreError::Sql(e) => AppError::Database(e),
            StoreError::Pool(e) => AppError::Pool(e),
            StoreError::Serialization(e) => AppError::Json(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::StorageUnavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::NotAuthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::MissingType => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::WriteConflict(msg) => {
                tracing::warn!("Write conflict: {}", msg);
                (StatusCode::CONFLICT, "Write conflict, retry".to_string())
            }
            AppError::RemoteDeliveryFailed(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": self.kind(), "message": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
