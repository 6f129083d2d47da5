use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stride_core::auth;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn register_router() -> Router<AppState> {
    Router::new().route("/v1/auth/register", post(register))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The full API key. Shown exactly once — only its hash is stored.
    pub api_key: String,
    /// First 8 characters of the key body, for later identification.
    pub key_prefix: String,
}

/// Register a new user and issue their first API key
///
/// The key is returned once and never recoverable afterwards; the server only
/// keeps its SHA-256 hash.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Validation error", body = stride_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.email.is_empty() || !req.email.contains('@') {
        return Err(AppError::Validation {
            message: "email must be a valid address".to_string(),
            field: Some("email".to_string()),
            received: Some(serde_json::Value::String(req.email.clone())),
            docs_hint: None,
        });
    }
    if req.password.len() < 8 {
        return Err(AppError::Validation {
            message: "password must be at least 8 characters".to_string(),
            field: Some("password".to_string()),
            received: None,
            docs_hint: None,
        });
    }

    let password_hash = auth::hash_password(&req.password).map_err(AppError::Internal)?;
    let (api_key, key_hash) = auth::generate_api_key();
    let key_prefix = auth::key_prefix(&api_key);

    let user_id = Uuid::now_v7();
    let key_id = Uuid::now_v7();

    let mut tx = state.db.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, display_name) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&req.display_name)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                return AppError::Validation {
                    message: format!("Email '{}' is already registered", req.email),
                    field: Some("email".to_string()),
                    received: Some(serde_json::Value::String(req.email.clone())),
                    docs_hint: Some("Use a different email address.".to_string()),
                };
            }
        }
        AppError::Database(e)
    })?;

    sqlx::query("INSERT INTO api_keys (id, user_id, key_hash, key_prefix) VALUES ($1, $2, $3, $4)")
        .bind(key_id)
        .bind(user_id)
        .bind(&key_hash)
        .bind(&key_prefix)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            email: req.email,
            display_name: req.display_name,
            api_key,
            key_prefix,
        }),
    ))
}
