use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptchaError {
    #[error("Invalid image processing operation: {operation}:{parameters}: {cause}")]
    InvalidOperation {
        operation: String,
        parameters: String,
        cause: String,
    },

    #[error("Calibration failed: {0}")]
    Calibration(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process image: {0}")]
    Image(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid ground truth label: {0}")]
    Label(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaptchaError {
    pub fn invalid_operation(
        operation: impl Into<String>,
        parameters: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::InvalidOperation {
            operation: operation.into(),
            parameters: parameters.into(),
            cause: cause.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for CaptchaError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            CaptchaError::InvalidOperation { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_OPERATION")
            }
            CaptchaError::Calibration(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CALIBRATION_ERROR"),
            CaptchaError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            CaptchaError::Image(_) => (StatusCode::BAD_REQUEST, "IMAGE_ERROR"),
            CaptchaError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            CaptchaError::Label(_) => (StatusCode::BAD_REQUEST, "INVALID_LABEL"),
            CaptchaError::Classification(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CLASSIFICATION_ERROR")
            }
            CaptchaError::ImageTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "IMAGE_TOO_LARGE"),
            CaptchaError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            CaptchaError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            CaptchaError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
