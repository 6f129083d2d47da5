use chrono::{DateTime, Utc};
use serde_json::json;
use std::str::FromStr;

use stride_core::progress::CompletionKind;

use crate::util::{client, exit_error, print_response, resolve_api_key};

pub async fn run(
    api_url: &str,
    kind: &str,
    minutes: i64,
    title: Option<String>,
    at: Option<String>,
    idempotency_key: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = resolve_api_key();

    // Validate the kind locally for a fast, friendly error
    let kind = CompletionKind::from_str(kind)
        .unwrap_or_else(|e| exit_error(&e.to_string(), Some("Try: stride log --kind focus --minutes 25")));

    let timestamp: DateTime<Utc> = match at {
        Some(ref raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| {
                exit_error(
                    "Invalid --at timestamp",
                    Some("Use RFC3339, e.g. 2025-06-01T15:30:00Z"),
                )
            }),
        None => Utc::now(),
    };

    let mut body = json!({
        "kind": kind.as_str(),
        "timestamp": timestamp.to_rfc3339(),
        "duration_minutes": minutes,
        "metadata": {
            "source": "cli",
            "idempotency_key": idempotency_key.unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
        }
    });
    if let Some(t) = title {
        body["title"] = json!(t);
    }

    let response = client()
        .post(format!("{api_url}/v1/completions"))
        .bearer_auth(&api_key)
        .json(&body)
        .send()
        .await?;
    print_response(response).await
}
