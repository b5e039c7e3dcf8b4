pub mod config;
mod overview;

use axum::Json;
use serde_json::{Value, json};

pub use overview::overview;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
