use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("too many images: {count} uploaded, at most {max} are allowed per batch")]
    BatchSizeExceeded { count: usize, max: usize },

    #[error("invalid upload: {0}")]
    Upload(String),

    #[error("upload too large: {0}")]
    UploadTooLarge(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl AppError {
    /// Stable machine-readable name, used in JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ModelLoad(_) => "model_load",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::Decode(_) => "decode",
            AppError::Inference(_) => "inference",
            AppError::BatchSizeExceeded { .. } => "batch_size_exceeded",
            AppError::Upload(_) => "upload",
            AppError::UploadTooLarge(_) => "upload_too_large",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Csv(_) => "csv",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BatchSizeExceeded { .. } | AppError::UploadTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Upload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => AppError::Io(e),
            other => AppError::Decode(other.to_string()),
        }
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError::Inference(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        // Over the body limit axum reports 413; anything else is a malformed form
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::UploadTooLarge(err.body_text())
        } else {
            AppError::Upload(err.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
