use serde_json::{Value, json};

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", serde_json::to_string_pretty(&err).unwrap());
    std::process::exit(1);
}

/// API key for Bearer auth, from `STRIDE_API_KEY`.
pub fn resolve_api_key() -> String {
    std::env::var("STRIDE_API_KEY").unwrap_or_else(|_| {
        exit_error(
            "No API key configured",
            Some("Set STRIDE_API_KEY to a key from 'stride register' (strd_sk_...)."),
        )
    })
}

/// Print a response body as pretty JSON; non-2xx responses exit with the
/// server's structured error.
pub async fn print_response(
    response: reqwest::Response,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        println!("{}", serde_json::to_string_pretty(&body)?);
        Ok(())
    } else {
        eprintln!("{}", serde_json::to_string_pretty(&body)?);
        std::process::exit(1);
    }
}
