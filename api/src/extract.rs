//! Custom extractors that convert axum rejections to structured AppError responses.
//!
//! Use `AppJson<T>` as a drop-in replacement for `axum::Json<T>` in handler
//! signatures. Unlike the standard extractor, deserialization failures produce a
//! JSON `AppError` instead of axum's default plain-text 422 response.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use crate::error::AppError;

/// JSON extractor that converts deserialization errors to structured
/// `AppError` responses.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

/// Convert a `JsonRejection` to a structured `AppError::Validation`.
pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();
    let field_hint = extract_field_from_serde_message(&body_text);

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field_hint.unwrap_or_else(|| "body".to_string())),
        received: None,
        docs_hint: Some(
            "Check the request body against the endpoint's schema (GET /api-doc/openapi.json)."
                .to_string(),
        ),
    }
}

/// Try to extract a field name from serde's error messages:
/// "missing field `timestamp`" → "timestamp", "unknown field `foo`" → "foo".
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    for marker in ["missing field `", "unknown field `", "invalid type for field `"] {
        if let Some(rest) = msg.split(marker).nth(1) {
            if let Some(field) = rest.split('`').next() {
                if !field.is_empty() {
                    return Some(field.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::extract_field_from_serde_message;

    #[test]
    fn pulls_field_name_out_of_serde_messages() {
        assert_eq!(
            extract_field_from_serde_message("missing field `timestamp` at line 1 column 2"),
            Some("timestamp".to_string())
        );
        assert_eq!(
            extract_field_from_serde_message("unknown field `foo`, expected one of ..."),
            Some("foo".to_string())
        );
        assert_eq!(extract_field_from_serde_message("expected value"), None);
    }
}
