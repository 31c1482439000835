//! Mapping from run failures to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use k6_script::ScriptError;

use crate::runner::RunError;

/// Returned for failures while launching or running k6.
pub const EXECUTION_FAILED_MESSAGE: &str =
    "Failed to execute k6 test. See server logs for details.";

/// Returned for every other server-side failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error. See server logs for details.";

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Run(#[from] RunError),

    /// The request body could not be read as test parameters.
    #[error("{0}")]
    BadRequest(String),

    /// No new runs are accepted.
    #[error("Server is shutting down")]
    ShuttingDown,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Script(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Script(_) | ApiError::Run(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the caller. Server-side failures get a fixed message;
    /// the details are only logged.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Script(e) if e.is_client_error() => e.to_string(),
            ApiError::BadRequest(detail) => detail.clone(),
            ApiError::ShuttingDown => self.to_string(),
            ApiError::Run(e) if e.is_execution_failure() => EXECUTION_FAILED_MESSAGE.to_string(),
            ApiError::Script(_) | ApiError::Run(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Rejected request");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
