use serde_json::json;

use crate::util::{client, print_response};

pub async fn register(
    api_url: &str,
    email: &str,
    password: &str,
    display_name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut body = json!({
        "email": email,
        "password": password,
    });
    if let Some(name) = display_name {
        body["display_name"] = json!(name);
    }

    // The api_key in the response is shown exactly once; put it in
    // STRIDE_API_KEY for the other commands.
    let response = client()
        .post(format!("{api_url}/v1/auth/register"))
        .json(&body)
        .send()
        .await?;
    print_response(response).await
}
