//! HTTP-facing errors with a stable `{error, message}` body.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use courier_core::{ErrorKind, ExecuteError, ImportError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidId(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidItemType(&'static str),

    #[error("method is required for request items")]
    MissingMethod,

    #[error("{0}")]
    InvalidMethod(String),

    #[error("{0}")]
    InvalidParent(&'static str),

    #[error("No fields provided to update")]
    NoUpdates,

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("{0}")]
    Internal(String),
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl AppError {
    /// Status code and machine-readable kind.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InvalidItemType(_) => (StatusCode::BAD_REQUEST, "invalid_item_type"),
            AppError::MissingMethod => (StatusCode::BAD_REQUEST, "missing_method"),
            AppError::InvalidMethod(_) => (StatusCode::BAD_REQUEST, "invalid_method"),
            AppError::InvalidParent(_) => (StatusCode::BAD_REQUEST, "invalid_parent"),
            AppError::NoUpdates => (StatusCode::BAD_REQUEST, "no_updates"),
            AppError::Execute(e) => match e.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str()),
                ErrorKind::SsrfProtection => (StatusCode::FORBIDDEN, ErrorKind::SsrfProtection.as_str()),
                ErrorKind::Execution => (StatusCode::BAD_GATEWAY, ErrorKind::Execution.as_str()),
            },
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        let body = ErrorBody {
            error: kind.to_string(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after } = self {
            let secs = retry_after
                .as_secs()
                .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
            if let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{SafetyVerdict, TransportError};

    #[test]
    fn execute_errors_map_by_kind() {
        let blocked = AppError::from(ExecuteError::Blocked(SafetyVerdict::BlockedScheme("ftp".into())));
        assert_eq!(blocked.classify(), (StatusCode::FORBIDDEN, "ssrf_protection"));
        assert_eq!(blocked.to_string(), "URL blocked by SSRF protection: unsupported URL scheme: ftp");

        let invalid = AppError::from(ExecuteError::InvalidRequest("bad header".into()));
        assert_eq!(invalid.classify(), (StatusCode::BAD_REQUEST, "validation_error"));

        let failed = AppError::from(ExecuteError::Transport(TransportError::Request("refused".into())));
        assert_eq!(failed.classify(), (StatusCode::BAD_GATEWAY, "execution_error"));

        let limit = AppError::from(ExecuteError::RedirectLimit(5));
        assert_eq!(limit.classify().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn rate_limited_sets_retry_after_in_whole_seconds() {
        let response = AppError::RateLimited {
            retry_after: Duration::from_millis(1200),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let response = AppError::RateLimited {
            retry_after: Duration::from_millis(1),
        }
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn import_errors_are_validation_errors() {
        let err = AppError::from(ImportError::Empty);
        assert_eq!(err.classify(), (StatusCode::BAD_REQUEST, "validation_error"));
        assert_eq!(err.to_string(), "collection must contain at least one item");
    }
}
