pub mod auth;
pub mod completions;
pub mod health;
pub mod progress;
pub mod tasks;
