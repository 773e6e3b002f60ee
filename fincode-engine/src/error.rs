//! Error types for fincode-engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., code already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resolver unreachable (503)
    #[error("Resolver unavailable: {0}")]
    ResolverUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<fincode_common::Error> for ApiError {
    fn from(err: fincode_common::Error) -> Self {
        match err {
            fincode_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            fincode_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            fincode_common::Error::ResolverUnavailable(msg) => ApiError::ResolverUnavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::ResolverUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RESOLVER_UNAVAILABLE",
                msg,
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_from_common_errors() {
        let cases = [
            (
                fincode_common::Error::NotFound("x".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                fincode_common::Error::InvalidInput("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                fincode_common::Error::ResolverUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                fincode_common::Error::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
