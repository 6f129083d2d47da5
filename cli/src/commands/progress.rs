use crate::util::{client, print_response, resolve_api_key};

pub async fn run(api_url: &str, reset: bool) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = resolve_api_key();

    let response = if reset {
        client()
            .post(format!("{api_url}/v1/progress/reset"))
            .bearer_auth(&api_key)
            .send()
            .await?
    } else {
        client()
            .get(format!("{api_url}/v1/progress"))
            .bearer_auth(&api_key)
            .send()
            .await?
    };

    print_response(response).await
}
