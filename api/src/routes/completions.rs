use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use stride_core::error::ApiError;
use stride_core::events::{
    Completion, CompletionMetadata, CompletionResponse, CreateCompletionRequest, PaginatedResponse,
};
use stride_core::progress::{CompletionKind, MAX_DURATION_MINUTES, ProgressSummary};

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;
use crate::store::ProgressStore;

pub fn write_router() -> Router<AppState> {
    Router::new().route("/v1/completions", post(create_completion))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/completions", get(list_completions))
}

fn validate_completion(req: &CreateCompletionRequest) -> Result<(), AppError> {
    // Reject out-of-range durations before anything is persisted; the
    // aggregator would refuse them too, but by then the row is written.
    if req.duration_minutes < 0 || req.duration_minutes > MAX_DURATION_MINUTES {
        return Err(AppError::Validation {
            message: format!(
                "duration_minutes must be between 0 and {MAX_DURATION_MINUTES}"
            ),
            field: Some("duration_minutes".to_string()),
            received: Some(serde_json::json!(req.duration_minutes)),
            docs_hint: Some("Zero is valid for untimed completions.".to_string()),
        });
    }

    if req.metadata.idempotency_key.is_empty() {
        return Err(AppError::Validation {
            message: "metadata.idempotency_key must not be empty".to_string(),
            field: Some("metadata.idempotency_key".to_string()),
            received: None,
            docs_hint: Some(
                "Generate a unique idempotency_key per completion (e.g. a UUID). \
                 This allows safe retries without duplicate XP grants."
                    .to_string(),
            ),
        });
    }

    Ok(())
}

/// Record a completion
///
/// Stores the completion immutably and runs one aggregation step over the
/// user's progress snapshot (XP, level, streak, daily stats, history). Use
/// this for focus/pomodoro sessions and chat completions; task check-offs go
/// through POST /v1/tasks/{id}/complete.
#[utoipa::path(
    post,
    path = "/v1/completions",
    request_body = CreateCompletionRequest,
    responses(
        (status = 201, description = "Completion recorded", body = CompletionResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "Idempotency conflict", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "completions"
)]
pub async fn create_completion(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(req): AppJson<CreateCompletionRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_completion(&req)?;

    let completion_id = Uuid::now_v7();

    let row = sqlx::query_as::<_, CompletionRow>(
        r#"
        INSERT INTO completions
            (id, user_id, kind, timestamp, duration_minutes, title, source, device, idempotency_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, user_id, kind, timestamp, duration_minutes, title,
                  source, device, idempotency_key, created_at
        "#,
    )
    .bind(completion_id)
    .bind(auth.user_id)
    .bind(req.kind.as_str())
    .bind(req.timestamp)
    .bind(req.duration_minutes)
    .bind(&req.title)
    .bind(&req.metadata.source)
    .bind(&req.metadata.device)
    .bind(&req.metadata.idempotency_key)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                return AppError::IdempotencyConflict {
                    idempotency_key: req.metadata.idempotency_key.clone(),
                };
            }
        }
        AppError::Database(e)
    })?;

    let progress = ProgressStore::new(state.db.clone())
        .apply(auth.user_id, &req.to_event())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CompletionResponse {
            completion: row.into_completion()?,
            progress: ProgressSummary::of(&progress),
        }),
    ))
}

/// Query parameters for listing completions
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListCompletionsParams {
    /// Filter by kind ("task", "focus", "pomodoro", "chat")
    #[serde(default)]
    pub kind: Option<String>,
    /// Only completions after this timestamp (inclusive)
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Only completions before this timestamp (exclusive)
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of completions to return (default 50, max 200)
    #[serde(default)]
    pub limit: Option<i64>,
    /// Cursor for pagination (opaque string from previous response's next_cursor)
    #[serde(default)]
    pub cursor: Option<String>,
}

/// List completions with cursor-based pagination
///
/// Returns completions ordered by timestamp descending (newest first).
/// Use cursor-based pagination for stable iteration over growing data.
#[utoipa::path(
    get,
    path = "/v1/completions",
    params(ListCompletionsParams),
    responses(
        (status = 200, description = "Paginated list of completions", body = PaginatedResponse<Completion>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "completions"
)]
pub async fn list_completions(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<ListCompletionsParams>,
) -> Result<Json<PaginatedResponse<Completion>>, AppError> {
    let kind = params
        .kind
        .as_deref()
        .map(|k| k.parse::<CompletionKind>())
        .transpose()?;

    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    // Fetch one extra to determine has_more
    let fetch_limit = limit + 1;

    let cursor_data = match params.cursor {
        Some(ref cursor_str) => Some(decode_cursor(cursor_str)?),
        None => None,
    };

    // Ordered by (timestamp DESC, id DESC) for stable cursor pagination
    let rows = sqlx::query_as::<_, CompletionRow>(
        r#"
        SELECT id, user_id, kind, timestamp, duration_minutes, title,
               source, device, idempotency_key, created_at
        FROM completions
        WHERE user_id = $1
          AND ($2::text IS NULL OR kind = $2)
          AND ($3::timestamptz IS NULL OR timestamp >= $3)
          AND ($4::timestamptz IS NULL OR timestamp < $4)
          AND ($5::timestamptz IS NULL OR (timestamp, id) < ($5, $6))
        ORDER BY timestamp DESC, id DESC
        LIMIT $7
        "#,
    )
    .bind(auth.user_id)
    .bind(kind.map(|k| k.as_str()))
    .bind(params.since)
    .bind(params.until)
    .bind(cursor_data.as_ref().map(|c| c.timestamp))
    .bind(cursor_data.as_ref().map(|c| c.id))
    .bind(fetch_limit)
    .fetch_all(&state.db)
    .await?;

    let has_more = rows.len() as i64 > limit;
    let completions: Vec<Completion> = rows
        .into_iter()
        .take(limit as usize)
        .map(CompletionRow::into_completion)
        .collect::<Result<_, _>>()?;

    let next_cursor = if has_more {
        completions
            .last()
            .map(|c| encode_cursor(&c.timestamp, &c.id))
    } else {
        None
    };

    Ok(Json(PaginatedResponse {
        data: completions,
        next_cursor,
        has_more,
    }))
}

/// Cursor is base64("timestamp\0id") — opaque to the client, stable for pagination
fn encode_cursor(timestamp: &DateTime<Utc>, id: &Uuid) -> String {
    use base64::Engine;
    let raw = format!("{}\0{}", timestamp.to_rfc3339(), id);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

struct CursorData {
    timestamp: DateTime<Utc>,
    id: Uuid,
}

fn decode_cursor(cursor: &str) -> Result<CursorData, AppError> {
    use base64::Engine;

    let invalid = |message: &str| AppError::Validation {
        message: message.to_string(),
        field: Some("cursor".to_string()),
        received: None,
        docs_hint: Some("Use the next_cursor value from a previous response".to_string()),
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| invalid("Invalid cursor format"))?;

    let s = String::from_utf8(bytes).map_err(|_| invalid("Invalid cursor encoding"))?;

    let (ts, id) = s
        .split_once('\0')
        .ok_or_else(|| invalid("Invalid cursor structure"))?;

    let timestamp = DateTime::parse_from_rfc3339(ts)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid("Invalid cursor timestamp"))?;

    let id = Uuid::parse_str(id).map_err(|_| invalid("Invalid cursor id"))?;

    Ok(CursorData { timestamp, id })
}

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct CompletionRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    timestamp: DateTime<Utc>,
    duration_minutes: i64,
    title: Option<String>,
    source: Option<String>,
    device: Option<String>,
    idempotency_key: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

impl CompletionRow {
    fn into_completion(self) -> Result<Completion, AppError> {
        let kind = self
            .kind
            .parse::<CompletionKind>()
            .map_err(|e| AppError::Internal(format!("Corrupt kind column: {e}")))?;

        Ok(Completion {
            id: self.id,
            user_id: self.user_id,
            kind,
            timestamp: self.timestamp,
            duration_minutes: self.duration_minutes,
            title: self.title,
            metadata: CompletionMetadata {
                source: self.source,
                device: self.device,
                idempotency_key: self.idempotency_key,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::{decode_cursor, encode_cursor};

    #[test]
    fn cursor_roundtrip() {
        let timestamp = Utc.with_ymd_and_hms(2025, 6, 1, 15, 30, 0).unwrap();
        let id = Uuid::now_v7();

        let cursor = encode_cursor(&timestamp, &id);
        let decoded = decode_cursor(&cursor).unwrap();

        assert_eq!(decoded.timestamp, timestamp);
        assert_eq!(decoded.id, id);
    }

    #[test]
    fn garbage_cursor_is_a_validation_error() {
        assert!(decode_cursor("not-base64!!!").is_err());
        assert!(decode_cursor("aGVsbG8").is_err());
    }
}
