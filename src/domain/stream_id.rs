//! Type-safe stream identifier.
//!
//! [`StreamId`] is a newtype wrapper around an opaque string identity.
//! Server-generated ids are UUID v4; a peer may also supply its own stable
//! id so a reconnecting device resumes its topic subscriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a connected stream.
///
/// Stable for the lifetime of a logical connection. Used as the key in
/// [`super::registry::SubscriptionRegistry`] and carried by every
/// [`super::stream_handle::StreamHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a new random `StreamId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
