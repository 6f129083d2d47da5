use clap::Subcommand;
use serde_json::json;

use crate::util::{client, print_response, resolve_api_key};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// "high", "medium" or "low"
        #[arg(long)]
        priority: Option<String>,
        /// Energy the task demands: "high", "medium" or "low"
        #[arg(long)]
        energy: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Planned minutes
        #[arg(long, default_value_t = 0)]
        minutes: i64,
    },
    /// List tasks
    List {
        /// Only completed (true) or open (false) tasks
        #[arg(long)]
        completed: Option<bool>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Complete a task (grants XP and advances the streak)
    Done {
        /// Task ID
        id: String,
        /// Actual minutes spent (falls back to the planned duration)
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
}

pub async fn run(api_url: &str, command: TaskCommands) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = resolve_api_key();

    match command {
        TaskCommands::Add {
            title,
            description,
            priority,
            energy,
            due,
            minutes,
        } => {
            let mut body = json!({
                "title": title,
                "duration_minutes": minutes,
            });
            if let Some(d) = description {
                body["description"] = json!(d);
            }
            if let Some(p) = priority {
                body["priority"] = json!(p);
            }
            if let Some(e) = energy {
                body["energy"] = json!(e);
            }
            if let Some(d) = due {
                body["due_date"] = json!(d);
            }

            let response = client()
                .post(format!("{api_url}/v1/tasks"))
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await?;
            print_response(response).await
        }
        TaskCommands::List { completed, limit } => {
            let mut query: Vec<(String, String)> = Vec::new();
            if let Some(c) = completed {
                query.push(("completed".to_string(), c.to_string()));
            }
            if let Some(l) = limit {
                query.push(("limit".to_string(), l.to_string()));
            }

            let response = client()
                .get(format!("{api_url}/v1/tasks"))
                .bearer_auth(&api_key)
                .query(&query)
                .send()
                .await?;
            print_response(response).await
        }
        TaskCommands::Done { id, minutes } => {
            let mut body = json!({});
            if let Some(m) = minutes {
                body["duration_minutes"] = json!(m);
            }

            let response = client()
                .post(format!("{api_url}/v1/tasks/{id}/complete"))
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await?;
            print_response(response).await
        }
        TaskCommands::Delete { id } => {
            let response = client()
                .delete(format!("{api_url}/v1/tasks/{id}"))
                .bearer_auth(&api_key)
                .send()
                .await?;

            if response.status().is_success() {
                println!("{}", json!({ "deleted": id }));
                Ok(())
            } else {
                print_response(response).await
            }
        }
    }
}
