//! Error types for the HTTP integration.
//!
//! [`HttpApiError`] is what handlers return; it renders as
//! `{ "code", "message", "details"? }` with a status derived from the core
//! error taxonomy. [`ServerError`] covers startup and shutdown.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use sophia_core::SophiaError;
use thiserror::Error;
use tracing::error;

/// Failure of a single request.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl HttpApiError {
    /// A 400 for a body that could not be read.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: message.into(),
            details: None,
        }
    }

    /// A 500 that hides internals from the caller.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: message.into(),
            details: None,
        }
    }

    /// The HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<SophiaError> for HttpApiError {
    fn from(err: SophiaError) -> Self {
        let code = err.code();
        match err {
            SophiaError::Validation(msg) => Self {
                status: StatusCode::BAD_REQUEST,
                code,
                message: msg,
                details: None,
            },
            SophiaError::NotFound { kind, ref id } => Self {
                status: StatusCode::NOT_FOUND,
                code,
                message: err.to_string(),
                details: Some(json!({ "kind": kind, "id": id })),
            },
            SophiaError::InvalidState(msg) | SophiaError::Conflict(msg) => Self {
                status: StatusCode::CONFLICT,
                code,
                message: msg,
                details: None,
            },
            internal => {
                error!(error = %internal, code, "Internal error while handling request");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    message: "internal server error".to_string(),
                    details: None,
                }
            }
        }
    }
}

impl From<JsonRejection> for HttpApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            details: Some(json!({ "status": rejection.status().as_u16() })),
            ..Self::bad_request(rejection.body_text())
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
            details: self.details.as_ref(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Failure to start or stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The rules engine could not be built.
    #[error("engine error: {0}")]
    Core(#[from] SophiaError),

    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        let cases = [
            (SophiaError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (SophiaError::not_found("player", "p1"), StatusCode::NOT_FOUND),
            (SophiaError::InvalidState("x".into()), StatusCode::CONFLICT),
            (SophiaError::Conflict("x".into()), StatusCode::CONFLICT),
            (SophiaError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(HttpApiError::from(err).status(), status);
        }
    }

    #[test]
    fn not_found_carries_details() {
        let err = HttpApiError::from(SophiaError::not_found("enemy", "hydra"));
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.details, Some(json!({ "kind": "enemy", "id": "hydra" })));
    }

    #[test]
    fn internal_errors_are_redacted() {
        let err = HttpApiError::from(SophiaError::Serialization("secret path".into()));
        assert_eq!(err.message, "internal server error");
    }
}
