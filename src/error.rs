use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Convenience type alias for Results with SpiralError
pub type Result<T> = std::result::Result<T, SpiralError>;

/// Main error type for the pipeline backend.
///
/// Every public store/service operation returns `Result<T, SpiralError>`;
/// the HTTP boundary maps each variant to a status code in exactly one
/// place (the `IntoResponse` impl below).
#[derive(Error, Debug)]
pub enum SpiralError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Agent error: {message}")]
    Agent { message: String },

    #[error("Task execution error: {task_id} - {message}")]
    TaskExecution { task_id: String, message: String },

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Structure check failed: {0:?}")]
    Structure(Vec<String>),

    #[error("Creative evaluation rejected: {0}")]
    CreativeRejection(String),

    #[error("Asset materialization failed: {0}")]
    AssetFailure(String),

    #[error("Agent discovery error: {0}")]
    Discovery(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for SpiralError {
    fn into_response(self) -> Response {
        let status = match &self {
            SpiralError::NotFound(_) => StatusCode::NOT_FOUND,
            SpiralError::Validation(_)
            | SpiralError::InvariantViolation(_)
            | SpiralError::Agent { .. }
            | SpiralError::TaskExecution { .. } => StatusCode::BAD_REQUEST,
            SpiralError::Http(_) => StatusCode::BAD_GATEWAY,
            SpiralError::Structure(_)
            | SpiralError::CreativeRejection(_)
            | SpiralError::AssetFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SpiralError::Adapter(_)
            | SpiralError::Discovery(_)
            | SpiralError::Configuration(_)
            | SpiralError::Serialization(_)
            | SpiralError::Io(_)
            | SpiralError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(error = %self, %status, "request failed");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
