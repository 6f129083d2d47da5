use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stride_core::error::ApiError;
use stride_core::progress::{
    CompletionEvent, CompletionKind, MAX_DURATION_MINUTES, ProgressSummary,
};

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;
use crate::store::ProgressStore;

pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/v1/tasks", post(create_task))
        .route("/v1/tasks/{id}", axum::routing::patch(update_task).delete(delete_task))
        .route("/v1/tasks/{id}/complete", post(complete_task))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/tasks", get(list_tasks))
}

const PRIORITIES: &[&str] = &["high", "medium", "low"];
const ENERGIES: &[&str] = &["high", "medium", "low"];

/// A task as stored and returned by the API.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: String,
    pub energy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Planned duration in minutes
    pub duration_minutes: i64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// "high", "medium" or "low" (default "medium")
    #[serde(default)]
    pub priority: Option<String>,
    /// Energy the task demands: "high", "medium" or "low" (default "medium")
    #[serde(default)]
    pub energy: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_minutes: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub energy: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CompleteTaskRequest {
    /// Actual minutes spent; falls back to the task's planned duration.
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    /// When the task was completed. Defaults to now.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Response for completing a task: the task plus the progress summary after
/// this aggregation step.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CompleteTaskResponse {
    pub task: Task,
    pub progress: ProgressSummary,
}

fn validate_choice(
    value: Option<String>,
    allowed: &[&str],
    field: &str,
) -> Result<String, AppError> {
    let value = value.unwrap_or_else(|| "medium".to_string()).to_lowercase();
    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(AppError::Validation {
            message: format!("{field} must be one of: {}", allowed.join(", ")),
            field: Some(field.to_string()),
            received: Some(serde_json::Value::String(value)),
            docs_hint: None,
        })
    }
}

fn validate_duration(duration_minutes: i64) -> Result<(), AppError> {
    if duration_minutes < 0 || duration_minutes > MAX_DURATION_MINUTES {
        return Err(AppError::Validation {
            message: format!(
                "duration_minutes must be between 0 and {MAX_DURATION_MINUTES}"
            ),
            field: Some("duration_minutes".to_string()),
            received: Some(serde_json::json!(duration_minutes)),
            docs_hint: None,
        });
    }
    Ok(())
}

/// Fetch a task and verify ownership. Foreign tasks surface as 404 rather
/// than 403 so task ids don't leak across users.
async fn find_owned_task(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    task_id: Uuid,
) -> Result<TaskRow, AppError> {
    sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, user_id, title, description, priority, energy, due_date,
               duration_minutes, completed, completed_at, created_at
        FROM tasks
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(task_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound {
        resource: format!("task {task_id}"),
    })
}

/// Create a task
#[utoipa::path(
    post,
    path = "/v1/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(req): AppJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation {
            message: "title must not be empty".to_string(),
            field: Some("title".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    validate_duration(req.duration_minutes)?;
    let priority = validate_choice(req.priority, PRIORITIES, "priority")?;
    let energy = validate_choice(req.energy, ENERGIES, "energy")?;

    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        INSERT INTO tasks (id, user_id, title, description, priority, energy, due_date, duration_minutes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, user_id, title, description, priority, energy, due_date,
                  duration_minutes, completed, completed_at, created_at
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(auth.user_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(&priority)
    .bind(&energy)
    .bind(req.due_date)
    .bind(req.duration_minutes)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(row.into_task())))
}

/// Query parameters for listing tasks
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListTasksParams {
    /// Filter by completion state
    #[serde(default)]
    pub completed: Option<bool>,
    /// Maximum number of tasks to return (default 50, max 200)
    #[serde(default)]
    pub limit: Option<i64>,
}

/// List the authenticated user's tasks, newest first
#[utoipa::path(
    get,
    path = "/v1/tasks",
    params(ListTasksParams),
    responses(
        (status = 200, description = "Tasks", body = Vec<Task>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<Vec<Task>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let rows = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, user_id, title, description, priority, energy, due_date,
               duration_minutes, completed, completed_at, created_at
        FROM tasks
        WHERE user_id = $1
          AND ($2::boolean IS NULL OR completed = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(auth.user_id)
    .bind(params.completed)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(TaskRow::into_task).collect()))
}

/// Update a task's editable fields
#[utoipa::path(
    patch,
    path = "/v1/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 404, description = "Task not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    AppJson(req): AppJson<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let current = find_owned_task(&state.db, auth.user_id, task_id).await?;

    let title = match req.title {
        Some(t) if t.trim().is_empty() => {
            return Err(AppError::Validation {
                message: "title must not be empty".to_string(),
                field: Some("title".to_string()),
                received: None,
                docs_hint: None,
            });
        }
        Some(t) => t.trim().to_string(),
        None => current.title,
    };
    let priority = match req.priority {
        Some(p) => validate_choice(Some(p), PRIORITIES, "priority")?,
        None => current.priority,
    };
    let energy = match req.energy {
        Some(e) => validate_choice(Some(e), ENERGIES, "energy")?,
        None => current.energy,
    };
    let duration_minutes = req.duration_minutes.unwrap_or(current.duration_minutes);
    validate_duration(duration_minutes)?;
    let description = req.description.or(current.description);
    let due_date = req.due_date.or(current.due_date);

    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        UPDATE tasks
        SET title = $3, description = $4, priority = $5, energy = $6,
            due_date = $7, duration_minutes = $8, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, title, description, priority, energy, due_date,
                  duration_minutes, completed, completed_at, created_at
        "#,
    )
    .bind(task_id)
    .bind(auth.user_id)
    .bind(&title)
    .bind(&description)
    .bind(&priority)
    .bind(&energy)
    .bind(due_date)
    .bind(duration_minutes)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(row.into_task()))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/v1/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id)
        .bind(auth.user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound {
            resource: format!("task {task_id}"),
        });
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Complete a task
///
/// Marks the task completed, records a task-kind completion, and runs one
/// aggregation step over the user's progress snapshot. Completing a task that
/// is already completed is a conflict, not a repeat XP grant.
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/complete",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = CompleteTaskRequest,
    responses(
        (status = 200, description = "Task completed", body = CompleteTaskResponse),
        (status = 404, description = "Task not found", body = ApiError),
        (status = 409, description = "Task already completed", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn complete_task(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    AppJson(req): AppJson<CompleteTaskRequest>,
) -> Result<Json<CompleteTaskResponse>, AppError> {
    let task = find_owned_task(&state.db, auth.user_id, task_id).await?;

    if task.completed {
        return Err(AppError::Conflict {
            message: format!("Task {task_id} is already completed"),
            docs_hint: Some(
                "A task grants XP exactly once. Record extra work on it as a \
                 focus completion via POST /v1/completions."
                    .to_string(),
            ),
        });
    }

    let completed_at = req.completed_at.unwrap_or_else(Utc::now);
    let duration_minutes = req.duration_minutes.unwrap_or(task.duration_minutes);
    validate_duration(duration_minutes)?;

    let event = CompletionEvent {
        kind: CompletionKind::Task,
        timestamp: completed_at,
        duration_minutes,
        title: Some(task.title.clone()),
    };

    // Mark completed first; the row flip is what guards against double grants.
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        UPDATE tasks
        SET completed = TRUE, completed_at = $3, updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND completed = FALSE
        RETURNING id, user_id, title, description, priority, energy, due_date,
                  duration_minutes, completed, completed_at, created_at
        "#,
    )
    .bind(task_id)
    .bind(auth.user_id)
    .bind(completed_at)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict {
        message: format!("Task {task_id} is already completed"),
        docs_hint: None,
    })?;

    sqlx::query(
        r#"
        INSERT INTO completions
            (id, user_id, kind, timestamp, duration_minutes, title, source, idempotency_key)
        VALUES ($1, $2, 'task', $3, $4, $5, 'api', $6)
        ON CONFLICT (user_id, idempotency_key) DO NOTHING
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(auth.user_id)
    .bind(completed_at)
    .bind(duration_minutes)
    .bind(&task.title)
    .bind(format!("task:{task_id}"))
    .execute(&state.db)
    .await?;

    let progress = ProgressStore::new(state.db.clone())
        .apply(auth.user_id, &event)
        .await?;

    Ok(Json(CompleteTaskResponse {
        task: row.into_task(),
        progress: ProgressSummary::of(&progress),
    }))
}

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: Option<String>,
    priority: String,
    energy: String,
    due_date: Option<NaiveDate>,
    duration_minutes: i64,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Task {
        Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            energy: self.energy,
            due_date: self.due_date,
            duration_minutes: self.duration_minutes,
            completed: self.completed,
            completed_at: self.completed_at,
            created_at: self.created_at,
        }
    }
}
