//! API route handlers.

use axum::Json;
use mylocal_shared::HealthResponse;

pub mod admin;
pub mod auth;
pub mod businesses;
pub mod chats;
pub mod posts;
pub mod reviews;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
