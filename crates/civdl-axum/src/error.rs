//! Axum-specific error types and mappings.
//!
//! Maps `DownloadError` onto HTTP status codes and a JSON body of the form
//! `{"error": ..., "status": ..., "type": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use civdl_core::DownloadError;
use serde::Serialize;
use thiserror::Error;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Service unavailable (catalog down, delegate gone, shutting down).
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        error_type: &'static str,
    },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
    /// Stable error type discriminant for client-side handling
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    error_type: Option<&'static str>,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message, error_type) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Some("not_found")),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Some("validation")),
            Self::ServiceUnavailable {
                message,
                error_type,
            } => (StatusCode::SERVICE_UNAVAILABLE, message, Some(error_type)),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };

        if status.is_server_error() {
            tracing::warn!(target: "civdl.http", status = status.as_u16(), error = %message, "Request failed");
        }

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
            error_type,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<DownloadError> for HttpError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Validation { message } => Self::BadRequest(message),
            DownloadError::NotFound { id } => Self::NotFound(format!("Download not found: {id}")),
            DownloadError::Catalog { message } => Self::ServiceUnavailable {
                message,
                error_type: "catalog_unavailable",
            },
            DownloadError::DelegateUnavailable { message } => Self::ServiceUnavailable {
                message,
                error_type: "delegate_unavailable",
            },
            err @ DownloadError::ShuttingDown => Self::ServiceUnavailable {
                message: err.to_string(),
                error_type: "shutting_down",
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err: HttpError = DownloadError::validation("Model 99 not found").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_keeps_the_id() {
        let err: HttpError = DownloadError::not_found("abc").into();
        assert_eq!(err.to_string(), "Not found: Download not found: abc");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unavailable_variants_map_to_503() {
        for err in [
            DownloadError::catalog("timeout"),
            DownloadError::delegate_unavailable("connection refused"),
            DownloadError::ShuttingDown,
        ] {
            let response = HttpError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[test]
    fn everything_else_is_internal() {
        let err: HttpError = DownloadError::invalid_transition("completed", "queued").into();
        assert!(matches!(err, HttpError::Internal(_)));
    }
}
