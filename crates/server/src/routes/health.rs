use axum::{Json, extract::State};
use db::models::image::Image;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub total_images: u64,
}

/// Liveness probe. Never fails the request; a broken database shows up in
/// the body instead.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = state.db().is_connected().await;
    let total_images = if database_ok {
        Image::count(&state.db().conn).await.unwrap_or(0)
    } else {
        0
    };

    Json(HealthResponse {
        status: if database_ok { "healthy" } else { "degraded" },
        database: if database_ok {
            "connected"
        } else {
            "disconnected"
        },
        total_images,
    })
}
