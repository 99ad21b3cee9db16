use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed offer: {0}")]
    MalformedOffer(String),

    #[error("Incompatible offer: {0}")]
    IncompatibleOffer(String),

    #[error("Renegotiation not supported: session {0} has already negotiated")]
    RenegotiationNotSupported(String),

    #[error("ICE gathering did not complete within {0} ms")]
    GatheringTimeout(u64),

    #[error("Unreadable container [{path}]: {reason}")]
    UnreadableContainer { path: String, reason: String },

    #[error("Invalid sample sequence: granule position went from {previous} to {current}")]
    InvalidSampleSequence { previous: u64, current: u64 },

    #[error("Sink write failed on {track} track: {reason}")]
    SinkWriteFailure { track: String, reason: String },

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Pipeline already running for session {0}")]
    PipelineAlreadyRunning(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MalformedOffer(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MediaNotFound(_) => StatusCode::NOT_FOUND,
            AppError::RenegotiationNotSupported(_) | AppError::PipelineAlreadyRunning(_) => {
                StatusCode::CONFLICT
            }
            AppError::IncompatibleOffer(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::GatheringTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build an `UnreadableContainer` error for a path
    pub fn unreadable(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        AppError::UnreadableContainer {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            status = status.as_u16(),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
