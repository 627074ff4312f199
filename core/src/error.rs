//! Error types for execution, transport, and the agent client.
//!
//! # Design
//! Security rejections (`Blocked`, `RedirectBlocked`) are separate variants
//! from network failures so callers can tell *why* a request was refused.
//! `ErrorKind` is the coarse classification the HTTP surfaces map to status
//! codes.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::url_guard::SafetyVerdict;

/// Failure of a single hop on the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Request(String),

    #[error("failed to read response: {0}")]
    Body(String),
}

/// Reasons an execution did not produce an `ExecutionResult`.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The descriptor could not be turned into a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The initial URL failed validation.
    #[error("URL blocked by SSRF protection: {0}")]
    Blocked(SafetyVerdict),

    #[error("stopped after {0} redirects")]
    RedirectLimit(usize),

    #[error("redirect blocked: {0}")]
    RedirectBlocked(SafetyVerdict),

    #[error("invalid redirect location: {0}")]
    InvalidRedirect(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(#[from] TransportError),
}

/// Coarse classification used to pick an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    SsrfProtection,
    Execution,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::SsrfProtection => "ssrf_protection",
            ErrorKind::Execution => "execution_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExecuteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecuteError::InvalidRequest(_) => ErrorKind::Validation,
            ExecuteError::Blocked(_) => ErrorKind::SsrfProtection,
            ExecuteError::RedirectLimit(_)
            | ExecuteError::RedirectBlocked(_)
            | ExecuteError::InvalidRedirect(_)
            | ExecuteError::Timeout(_)
            | ExecuteError::Transport(_) => ErrorKind::Execution,
        }
    }
}

/// Errors returned by `AgentClient` parse methods.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The agent base URL could not be parsed.
    #[error("invalid agent URL: {0}")]
    InvalidUrl(String),

    /// The agent returned a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url_guard::BlockedRange;

    #[test]
    fn security_rejections_are_distinguishable() {
        let blocked = ExecuteError::Blocked(SafetyVerdict::BlockedScheme("file".into()));
        assert_eq!(blocked.kind(), ErrorKind::SsrfProtection);

        let redirect = ExecuteError::RedirectBlocked(SafetyVerdict::BlockedIp {
            addr: "127.0.0.1".parse().unwrap(),
            range: BlockedRange::Loopback,
        });
        assert_eq!(redirect.kind(), ErrorKind::Execution);
        assert!(redirect.to_string().starts_with("redirect blocked: "));
        assert!(redirect.to_string().contains("loopback"));

        let network = ExecuteError::from(TransportError::Request("connection refused".into()));
        assert_eq!(network.kind(), ErrorKind::Execution);
        assert_eq!(network.to_string(), "request failed: connection refused");
    }

    #[test]
    fn kind_names_match_the_wire() {
        assert_eq!(ErrorKind::Validation.as_str(), "validation_error");
        assert_eq!(ErrorKind::SsrfProtection.to_string(), "ssrf_protection");
        assert_eq!(ErrorKind::Execution.as_str(), "execution_error");
    }

    #[test]
    fn redirect_limit_message() {
        assert_eq!(ExecuteError::RedirectLimit(5).to_string(), "stopped after 5 redirects");
    }
}
