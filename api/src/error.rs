use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stride_core::error::{self, ApiError};
use stride_core::progress::ProgressError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or invalid credentials (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Resource does not exist, or belongs to another user (404)
    NotFound { resource: String },
    /// State conflict, e.g. completing an already-completed task (409)
    Conflict {
        message: String,
        docs_hint: Option<String>,
    },
    /// Idempotency conflict — same idempotency_key already used (409)
    IdempotencyConflict { idempotency_key: String },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} not found"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Conflict { message, docs_hint } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::IdempotencyConflict { idempotency_key } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::IDEMPOTENCY_CONFLICT.to_string(),
                    message: format!(
                        "Completion with idempotency_key '{}' already exists",
                        idempotency_key
                    ),
                    field: Some("metadata.idempotency_key".to_string()),
                    received: Some(serde_json::Value::String(idempotency_key)),
                    request_id,
                    docs_hint: Some(
                        "Each completion must have a unique idempotency_key per user. \
                         If you're retrying a request, the original completion was already recorded."
                            .to_string(),
                    ),
                },
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<ProgressError> for AppError {
    fn from(err: ProgressError) -> Self {
        let (field, received) = match &err {
            ProgressError::NegativeDuration(d) | ProgressError::ExcessiveDuration(d) => (
                Some("duration_minutes".to_string()),
                Some(serde_json::json!(d)),
            ),
            ProgressError::UnknownKind(k) => (
                Some("kind".to_string()),
                Some(serde_json::Value::String(k.clone())),
            ),
        };
        AppError::Validation {
            message: err.to_string(),
            field,
            received,
            docs_hint: None,
        }
    }
}
