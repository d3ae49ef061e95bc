//! Command value object exchanged between streams.
//!
//! A [`Command`] is immutable once built; the broker passes it by reference
//! through the pipeline and clones it only at the per-stream enqueue
//! boundary. The payload is an opaque [`serde_json::Value`] the core never
//! interprets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known command keys handled by the broker itself rather than
/// forwarded to subscribers.
pub mod keys {
    /// Adds a topic (from [`super::Command::topic`]) to the sending
    /// stream's subscription set.
    pub const SUBSCRIBE: &str = "broker.subscribe";
    /// Removes a topic from the sending stream's subscription set.
    pub const UNSUBSCRIBE: &str = "broker.unsubscribe";
}

/// A routed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Correlation identifier, unique per logical request.
    pub id: String,
    /// Operation name; secondary correlation discriminator.
    pub key: String,
    /// Identity of the originator. Stamped by the forwarder on
    /// wait-for-response sends; empty for plain fan-out commands.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
    /// Intended recipient identity. A command carrying a target is treated
    /// as a response and offered to the pending-request correlator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Routing label for fan-out. Control commands carry the topic they
    /// operate on here as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Opaque message body.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Command {
    /// Creates a command with a fresh UUID v4 id and the given operation key.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            sender_id: String::new(),
            target_id: None,
            topic: None,
            payload,
        }
    }

    /// Sets the routing topic.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the intended recipient.
    #[must_use]
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Builds the response to a request command.
    ///
    /// Carries the request's `key` and targets the request's sender, which
    /// is exactly what the correlator matches a waiting request against.
    #[must_use]
    pub fn response_to(request: &Command, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: request.key.clone(),
            sender_id: String::new(),
            target_id: Some(request.sender_id.clone()),
            topic: None,
            payload,
        }
    }
}
