//! Broker error types with HTTP status code mapping.
//!
//! [`BrokerError`] is the central error type for the broker. Each variant
//! maps to a numeric error code and, at the HTTP boundary, a status code
//! and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::correlator::CorrelationKey;
use crate::domain::stream_id::StreamId;

/// Structured JSON error response body.
///
/// All HTTP error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "stream not found: 7f3a…",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`BrokerError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum covering the broker's failure taxonomy.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Caller error    | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server/Timing   | 500 / 504                    |
/// | 401       | Authentication  | 401 Unauthorized             |
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Operation referenced a stream id with no live subscription.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Authentication was required and failed or was absent.
    #[error("access denied")]
    Unauthorized,

    /// No correlated response arrived before the deadline.
    #[error("no response for {key} within {waited_ms} ms")]
    Timeout {
        /// Correlation key of the abandoned request.
        key: CorrelationKey,
        /// Milliseconds waited before giving up.
        waited_ms: u128,
    },

    /// Malformed command or payload; caller error.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// A request is already waiting on the same correlation key.
    #[error("a request is already pending for {0}")]
    PendingExists(CorrelationKey),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::BadRequest(_) => 1001,
            Self::StreamNotFound(_) => 2001,
            Self::PendingExists(_) => 2002,
            Self::Unauthorized => 401,
            Self::Timeout { .. } => 3002,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::StreamNotFound(_) => StatusCode::NOT_FOUND,
            Self::PendingExists(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
