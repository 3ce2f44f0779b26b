//! Error taxonomy for the control plane.
//!
//! Mirrors the behavioral taxonomy a controller or operator actually needs
//! to distinguish: bad input, unknown resource, unimplemented surface,
//! a daemon that rejected a request, and on-disk corruption. Transient
//! network failures talking to the registry are not part of this enum:
//! the IS-04 worker swallows those and self-heals via its state machine
//! (see [`crate::is04`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error code, surfaced in JSON error bodies.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Failure talking to the local audio daemon's REST API.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("daemon returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl DaemonError {
    /// Whether retrying the same request later has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            DaemonError::Http(e) => e.is_timeout() || e.is_connect(),
            DaemonError::Status { status, .. } => *status >= 500,
        }
    }
}

impl ErrorCode for DaemonError {
    fn code(&self) -> &'static str {
        match self {
            DaemonError::Http(_) => "daemon_unreachable",
            DaemonError::Status { .. } => "daemon_rejected",
        }
    }
}

/// Top-level error type for the IS-05/IS-04 HTTP surfaces.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid staged parameters: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),

    #[error("state store corrupted: {0}")]
    StateCorruption(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "validation_error",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::NotImplemented(_) => "not_implemented",
            BridgeError::Daemon(e) => e.code(),
            BridgeError::StateCorruption(_) => "state_corruption",
            BridgeError::Internal(_) => "internal_error",
        }
    }
}

impl BridgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            BridgeError::Daemon(_) => StatusCode::BAD_GATEWAY,
            BridgeError::StateCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// IS-04/IS-05 error envelope: `{code, error, debug}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub error: String,
    pub debug: Option<String>,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            code: status.as_u16(),
            error: self.code().to_string(),
            debug: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_is_400() {
        let err = BridgeError::Validation("bad volume".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn not_found_is_404() {
        let err = BridgeError::NotFound("no such receiver".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_implemented_is_501() {
        let err = BridgeError::NotImplemented("scheduled activation".into());
        assert_eq!(err.status_code(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn daemon_status_5xx_is_transient() {
        let err = DaemonError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn daemon_status_4xx_is_not_transient() {
        let err = DaemonError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(!err.is_transient());
    }
}
