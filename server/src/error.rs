//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] tandem_engine::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use tandem_engine::Error as EngineError;

        let (status, error_message, details) = match &self {
            AppError::Engine(e @ (EngineError::MissingCredential | EngineError::InvalidCredential)) => {
                (StatusCode::UNAUTHORIZED, e.to_string(), None)
            }
            AppError::Engine(e @ EngineError::MissingDeviceId) => {
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::Engine(
                e @ (EngineError::AttachmentNotFound(_) | EngineError::RecordNotFound(_)),
            ) => (StatusCode::NOT_FOUND, e.to_string(), None),
            AppError::Engine(EngineError::Storage(msg)) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
