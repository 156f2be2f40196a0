use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::DbErr;
use serde::Serialize;
use services::services::{backend::BackendError, gallery::GalleryServiceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gallery(#[from] GalleryServiceError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error body shape shared by every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

fn db_status(err: &DbErr) -> StatusCode {
    match err {
        DbErr::RecordNotFound(_) => StatusCode::NOT_FOUND,
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ApiError::Gallery(err) => match err {
                // A backend timeout is the upstream's fault, not ours.
                GalleryServiceError::Generation(BackendError::Timeout) => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                GalleryServiceError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
                GalleryServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                GalleryServiceError::Database(db_err) => db_status(db_err),
                GalleryServiceError::EmptyPrompt => StatusCode::BAD_REQUEST,
            },
            ApiError::Database(db_err) => db_status(db_err),
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let detail = match &self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            _ => self.to_string(),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error = %self,
                "API request failed"
            );
        }
        (status_code, Json(ErrorBody { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn gallery_errors_map_to_expected_http_statuses() {
        assert_eq!(
            ApiError::from(GalleryServiceError::EmptyPrompt)
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(GalleryServiceError::Generation(BackendError::Timeout))
                .into_response()
                .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(GalleryServiceError::Generation(BackendError::Api {
                status: 503,
                message: "unavailable".to_string(),
            }))
            .into_response()
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(DbErr::RecordNotFound("images".to_string()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}
