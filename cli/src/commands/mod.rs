pub mod auth;
pub mod health;
pub mod log;
pub mod progress;
pub mod task;
