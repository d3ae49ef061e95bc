//! Uniform response envelope returned by every worker invocation.
//!
//! Workers never fail with a raw error; anything that goes wrong is folded
//! into a [`ResponseEnvelope`] with [`ResultCode::Error`] so the transport
//! always has exactly one well-formed reply to send. The builders here are
//! pure constructors.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::BrokerError;

/// Outcome discriminator of a [`ResponseEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// The request was processed.
    Ok,
    /// The request failed; `message`/`data` carry the diagnostics.
    Error,
}

/// Uniform reply to an inbound command or fetch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Outcome of the request.
    pub result: ResultCode,
    /// Human-readable status text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Ordered sequence of typed payloads (zero or more).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<Value>,
}

impl ResponseEnvelope {
    /// Empty success envelope.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            result: ResultCode::Ok,
            message: String::new(),
            data: Vec::new(),
        }
    }

    /// Success envelope carrying one payload.
    #[must_use]
    pub fn ok_with(payload: Value) -> Self {
        Self {
            result: ResultCode::Ok,
            message: String::new(),
            data: vec![payload],
        }
    }

    /// Success envelope with only a status message.
    #[must_use]
    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            result: ResultCode::Ok,
            message: message.into(),
            data: Vec::new(),
        }
    }

    /// Success envelope carrying a payload sequence.
    #[must_use]
    pub fn ok_many(payloads: Vec<Value>) -> Self {
        Self {
            result: ResultCode::Ok,
            message: String::new(),
            data: payloads,
        }
    }

    /// Error envelope for a caller mistake.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            result: ResultCode::Error,
            message: message.into(),
            data: Vec::new(),
        }
    }

    /// Error envelope built from a [`BrokerError`], preserving the numeric
    /// error code as diagnostic data.
    #[must_use]
    pub fn from_error(err: &BrokerError) -> Self {
        Self {
            result: ResultCode::Error,
            message: err.to_string(),
            data: vec![json!({ "code": err.error_code() })],
        }
    }

    /// Access-denied envelope.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self {
            result: ResultCode::Error,
            message: "Access denied".to_string(),
            data: Vec::new(),
        }
    }

    /// Returns `true` if the envelope reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok
    }

    /// Returns `true` if the envelope reports failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.result == ResultCode::Error
    }
}
