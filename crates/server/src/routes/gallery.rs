use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use db::models::image::Image;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

const DEFAULT_DIMENSION: u32 = 512;
const MAX_DIMENSION: u32 = 2048;

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    pub prompt: String,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
}

fn default_dimension() -> u32 {
    DEFAULT_DIMENSION
}

#[derive(Debug, Serialize)]
pub struct GenerateImageResponse {
    pub status: &'static str,
    /// The generated bytes, base64-encoded for immediate inline display.
    pub image: String,
    pub prompt: String,
    pub image_id: Uuid,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub images: Vec<Image>,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub status: &'static str,
    pub message: String,
    pub remaining_count: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_images: u64,
    pub total_size_mb: f64,
}

pub async fn generate_image(
    State(state): State<AppState>,
    Json(payload): Json<GenerateImageRequest>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    if payload.width == 0
        || payload.height == 0
        || payload.width > MAX_DIMENSION
        || payload.height > MAX_DIMENSION
    {
        return Err(ApiError::BadRequest(format!(
            "Image dimensions must be between 1 and {MAX_DIMENSION}"
        )));
    }

    let generated = state
        .gallery()
        .generate(
            &state.db().conn,
            &payload.prompt,
            payload.width,
            payload.height,
        )
        .await?;

    Ok(Json(GenerateImageResponse {
        status: "success",
        image: BASE64.encode(&generated.bytes),
        prompt: generated.record.prompt.clone(),
        image_id: generated.record.id,
        filename: generated.record.filename.clone(),
    }))
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let images = state
        .gallery()
        .list(&state.db().conn, query.skip, query.limit)
        .await?;
    Ok(Json(HistoryResponse { images }))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteImageResponse>, ApiError> {
    let id: Uuid = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid image id: {id}")))?;

    if state.gallery().delete(&state.db().conn, id).await? {
        Ok(Json(DeleteImageResponse {
            status: "success",
            message: format!("Image {id} deleted"),
        }))
    } else {
        Err(ApiError::NotFound("Image not found".to_string()))
    }
}

pub async fn run_cleanup(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let Some(days) = state.config().cleanup_after_days else {
        return Err(ApiError::BadRequest(
            "Cleanup is not configured; set CLEANUP_AFTER_DAYS".to_string(),
        ));
    };

    let removed = state.gallery().cleanup(&state.db().conn, days).await?;
    let remaining_count = Image::count(&state.db().conn).await?;

    Ok(Json(CleanupResponse {
        status: "success",
        message: format!("Removed {removed} images older than {days} days"),
        remaining_count,
    }))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let total_images = Image::count(&state.db().conn).await?;
    let total_size_bytes = Image::total_size_bytes(&state.db().conn).await?;
    let total_size_mb = (total_size_bytes as f64 / 1_048_576.0 * 100.0).round() / 100.0;

    Ok(Json(StatsResponse {
        total_images,
        total_size_mb,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_image))
        .route("/history", get(get_history))
        .route("/history/{id}", delete(delete_image))
        // The gallery aliases exist for the same reads and deletes.
        .route("/gallery", get(get_history))
        .route("/gallery/{id}", delete(delete_image))
        .route("/cleanup", post(run_cleanup))
        .route("/stats", get(get_stats))
}
