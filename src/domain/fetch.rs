//! Pull-style fetch request.
//!
//! Distinct from push/subscribe commands: a fetch asks the broker for an
//! immediate result and never touches the forwarding pipeline.

use serde::{Deserialize, Serialize};

/// A pull-style query dispatched to a fetch worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Request identifier, echoed in the transport reply frame.
    pub id: String,
    /// What to fetch (e.g. `streams`, `topics`, `pending`).
    pub entity: String,
    /// Entity-specific selector; may be empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
}

impl FetchRequest {
    /// Creates a fetch request with a fresh UUID v4 id.
    #[must_use]
    pub fn new(entity: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity: entity.into(),
            filter: filter.into(),
        }
    }
}
