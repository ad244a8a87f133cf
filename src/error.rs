// Caller-facing error surface.
//
// Every failure that reaches the HTTP boundary is rendered as
// `{"error":{"message","type","details"?}}` with the status code the
// error class dictates. Upstream failures keep the upstream status so
// callers can distinguish rate limits from hard errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The caller's request was malformed or incomplete.
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        details: Option<String>,
    },

    /// The upstream answered with a non-success status.
    #[error("upstream api error: {status} {message}")]
    Upstream { status: u16, message: String },

    /// The upstream could not be reached at all.
    #[error("upstream transport failure: {0}")]
    Transport(String),

    /// An internal failure on our side.
    #[error("internal error: {message}")]
    Server {
        message: String,
        details: Option<String>,
    },
}

impl RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            RelayError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            RelayError::Transport(_) | RelayError::Server { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest { .. } => "invalid_request_error",
            RelayError::Upstream { .. } | RelayError::Transport(_) => "relay_error",
            RelayError::Server { .. } => "server_error",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        let (message, details) = match self {
            RelayError::InvalidRequest { message, details } => (message, details),
            RelayError::Upstream { status, message } => {
                (format!("upstream api error: {status} {message}"), None)
            }
            RelayError::Transport(message) => {
                ("error sending request to upstream".to_string(), Some(message))
            }
            RelayError::Server { message, details } => (message, details),
        };

        tracing::warn!(status = %status, kind, message = %message, "request failed");

        let body = ErrorBody {
            error: ErrorDetail {
                message,
                kind,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
