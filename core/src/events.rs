use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::progress::{CompletionEvent, CompletionKind, ProgressSummary};

/// A persisted completion record. Completions are immutable — once written,
/// never changed; the aggregated snapshot is what evolves.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Completion {
    /// Unique completion ID (UUIDv7 — time-sortable)
    pub id: Uuid,
    /// Owner of this completion
    pub user_id: Uuid,
    pub kind: CompletionKind,
    /// When the completion happened (as reported by the client, not server time)
    pub timestamp: DateTime<Utc>,
    pub duration_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub metadata: CompletionMetadata,
}

/// Context about how a completion was recorded, not the completion itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompletionMetadata {
    /// How the completion was recorded: "cli", "api", "web"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Device or environment identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Client-generated idempotency key for deduplication
    pub idempotency_key: String,
}

/// Request to record a new completion.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCompletionRequest {
    pub kind: CompletionKind,
    /// When the completion happened
    pub timestamp: DateTime<Utc>,
    /// Minutes spent; defaults to 0 for untimed completions
    #[serde(default)]
    pub duration_minutes: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub metadata: CompletionMetadata,
}

impl CreateCompletionRequest {
    /// The aggregator-facing view of this request.
    pub fn to_event(&self) -> CompletionEvent {
        CompletionEvent {
            kind: self.kind,
            timestamp: self.timestamp,
            duration_minutes: self.duration_minutes,
            title: self.title.clone(),
        }
    }
}

/// Response for recording a completion: the stored record plus the progress
/// summary after this aggregation step.
#[derive(Debug, Serialize, ToSchema)]
pub struct CompletionResponse {
    pub completion: Completion,
    pub progress: ProgressSummary,
}

/// Cursor-based pagination
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    /// Cursor for the next page. None if this is the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether there are more results after this page
    pub has_more: bool,
}
