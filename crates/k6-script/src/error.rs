//! Error types for script generation.

use thiserror::Error;

/// Result type alias using ScriptError.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors raised while validating parameters or rendering a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template error: {0}")]
    Template(String),
}

impl ScriptError {
    pub fn invalid(param: &str, message: impl Into<String>) -> Self {
        ScriptError::InvalidParameter {
            param: param.to_string(),
            message: message.into(),
        }
    }

    /// True when the caller can fix the error by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ScriptError::InvalidParameter { .. } | ScriptError::MalformedBody(_)
        )
    }
}
