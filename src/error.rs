//! Error types for the dispatcher

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for dispatcher operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or out-of-range job description. Never retried; the
    /// message names the offending field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Recognized but not implemented job kind
    #[error("{0} not yet supported")]
    Unsupported(String),

    /// Missing or unverifiable caller identity
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Workflow, node map, or pod lookup miss
    #[error("not found: {0}")]
    NotFound(String),

    /// Kubernetes API error during provisioning or submission. Expected
    /// "already exists" conflicts are absorbed by the ensure-exists helper
    /// and never reach this variant.
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error at load time
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant failure (e.g. engine returned no identifier)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid-request error with the given message
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::InvalidRequest(_) | Error::Unsupported(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            Error::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            // Platform failures are logged server-side with full context;
            // the caller only gets a generic message.
            Error::Kube(_) | Error::Config(_) | Error::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "message": message,
            "code": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let err = Error::invalid("no command specified");
        assert_eq!(err.to_string(), "invalid request: no command specified");

        let err = Error::Unsupported("execution type 'nb'".into());
        assert_eq!(err.to_string(), "execution type 'nb' not yet supported");
    }

    #[test]
    fn platform_errors_map_to_500() {
        let resp = Error::Internal("no workflow created".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = Error::not_found("workflow 'wf-x'").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_errors_map_to_422() {
        let resp = Error::invalid("'image' must be a string").into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
