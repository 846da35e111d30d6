use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::generation::{FieldError, ServiceError};
use crate::image_processing::UploadError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid image")]
    InvalidImage(#[from] UploadError),
    #[error("Invalid settings")]
    InvalidSettings(Vec<FieldError>),
    #[error("Invalid form data: {message}")]
    Multipart { status: StatusCode, message: String },
    #[error("Generation not found")]
    NotFound,
    #[error("Output not found")]
    OutputNotFound,
    #[error("Generation failed")]
    GenerationFailed { id: Uuid, detail: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidImage(_) | ApiError::InvalidSettings(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart { status, .. } => *status,
            ApiError::NotFound | ApiError::OutputNotFound => StatusCode::NOT_FOUND,
            ApiError::GenerationFailed { .. } | ApiError::Service(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::InvalidImage(err) => ErrorResponse {
                message: match &err {
                    UploadError::Missing => err.to_string(),
                    _ => "Invalid image".to_string(),
                },
                errors: Some(vec![FieldError::new("image", err.to_string())]),
                id: None,
                error: None,
            },
            ApiError::InvalidSettings(errors) => ErrorResponse {
                message: "Invalid settings".to_string(),
                errors: Some(errors),
                id: None,
                error: None,
            },
            ApiError::GenerationFailed { id, detail } => ErrorResponse {
                message: "Generation failed".to_string(),
                errors: None,
                id: Some(id),
                error: Some(detail),
            },
            ApiError::Service(err) => {
                error!(error = %err, "internal error while handling request");
                ErrorResponse {
                    message: "Internal server error".to_string(),
                    errors: None,
                    id: None,
                    error: None,
                }
            }
            other => ErrorResponse {
                message: other.to_string(),
                errors: None,
                id: None,
                error: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
