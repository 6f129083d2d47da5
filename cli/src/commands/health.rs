use crate::util::{client, print_response};

pub async fn run(api_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = client().get(format!("{api_url}/health")).send().await?;
    print_response(response).await
}
