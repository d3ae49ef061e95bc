//! WebSocket frame envelope.
//!
//! Every frame on the wire is a [`WsMessage`]: client→server `command` and
//! `fetch` frames, server→client `response` frames (exactly one per
//! inbound frame), `push` frames carrying forwarded commands, and `error`
//! frames for unparseable input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::command::Command;
use crate::domain::envelope::ResponseEnvelope;

/// Top-level WebSocket frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided id for requests, echoed in the response frame;
    /// server-generated for pushes.
    pub id: String,
    /// Frame type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket frame types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server push-style command.
    Command,
    /// Client → Server pull-style fetch request.
    Fetch,
    /// Server → Client reply to a command or fetch frame.
    Response,
    /// Server → Client forwarded command.
    Push,
    /// Server → Client error for an unparseable frame.
    Error,
}

impl WsMessage {
    /// Builds the response frame for an inbound frame id.
    #[must_use]
    pub fn response(id: String, envelope: &ResponseEnvelope) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload: serde_json::to_value(envelope).unwrap_or_default(),
        }
    }

    /// Builds a push frame carrying a forwarded command.
    #[must_use]
    pub fn push(command: &Command) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Push,
            timestamp: Utc::now(),
            payload: serde_json::to_value(command).unwrap_or_default(),
        }
    }

    /// Builds an error frame.
    #[must_use]
    pub fn error(id: String, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: json!({
                "code": code,
                "message": message.into(),
            }),
        }
    }

    /// Serializes the frame to its wire form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
