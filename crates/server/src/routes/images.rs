use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{AppState, error::ApiError};

/// Serve the raw bytes of a stored image file. The filename is validated by
/// the store, so path traversal attempts fall out as 400s before any
/// filesystem access.
pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let store = state.gallery().store();
    if store.path_for(&filename).is_none() {
        return Err(ApiError::BadRequest(format!(
            "Invalid image filename: {filename}"
        )));
    }

    let Some(bytes) = store.read(&filename).await? else {
        return Err(ApiError::NotFound("Image not found".to_string()));
    };

    let content_type = mime_guess::from_path(&filename)
        .first_or_octet_stream()
        .to_string();
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/images/{filename}", get(get_image))
}
