use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use stride_core::error::ApiError;
use stride_core::progress::{ProgressSummary, UserProgress};

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::ProgressStore;

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/progress", get(get_progress))
}

pub fn write_router() -> Router<AppState> {
    Router::new().route("/v1/progress/reset", post(reset_progress))
}

/// Full progress snapshot plus the derived summary view.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProgressResponse {
    pub progress: UserProgress,
    pub summary: ProgressSummary,
}

/// Get the authenticated user's progress
///
/// Returns the full snapshot (XP, level, streaks, the 30-day daily-stats
/// window, recent history) plus the derived weekly/monthly summary. Users who
/// have never completed anything get the zero state, not a 404.
#[utoipa::path(
    get,
    path = "/v1/progress",
    responses(
        (status = 200, description = "Progress snapshot", body = ProgressResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "progress"
)]
pub async fn get_progress(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = ProgressStore::new(state.db.clone())
        .load_or_default(auth.user_id)
        .await?;

    let summary = ProgressSummary::of(&progress);
    Ok(Json(ProgressResponse { progress, summary }))
}

/// Reset the authenticated user's progress to the zero state
///
/// Clears XP, streaks, daily stats and history. Recorded completions are kept;
/// only the aggregated snapshot is reset.
#[utoipa::path(
    post,
    path = "/v1/progress/reset",
    responses(
        (status = 200, description = "Progress reset", body = ProgressResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "progress"
)]
pub async fn reset_progress(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = ProgressStore::new(state.db.clone())
        .reset(auth.user_id)
        .await?;

    tracing::info!(user_id = %auth.user_id, "progress reset to zero state");

    let summary = ProgressSummary::of(&progress);
    Ok(Json(ProgressResponse { progress, summary }))
}
