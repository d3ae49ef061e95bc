//! The broker's fetch worker: registry and correlator introspection.
//!
//! Serves pull-style queries with an immediate result; nothing here goes
//! through the forwarding pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{FetchWorker, RequestMetadata};
use crate::auth::Authenticator;
use crate::domain::envelope::ResponseEnvelope;
use crate::domain::fetch::FetchRequest;
use crate::domain::stream_id::StreamId;
use crate::service::MessageBroker;

/// Fetch entities served by [`RegistryFetchWorker`].
pub mod entities {
    /// All attached streams with owners and topics.
    pub const STREAMS: &str = "streams";
    /// Topic set of one stream (`filter` = stream id, defaults to the
    /// requesting stream).
    pub const TOPICS: &str = "topics";
    /// Number of requests currently awaiting a response.
    pub const PENDING: &str = "pending";
}

/// Fetch worker wired to the [`MessageBroker`] core.
#[derive(Debug)]
pub struct RegistryFetchWorker {
    broker: MessageBroker,
    auth: Arc<dyn Authenticator>,
}

impl RegistryFetchWorker {
    /// Creates a worker over the broker core and an authenticator.
    #[must_use]
    pub fn new(broker: MessageBroker, auth: Arc<dyn Authenticator>) -> Self {
        Self { broker, auth }
    }
}

#[async_trait]
impl FetchWorker for RegistryFetchWorker {
    async fn process_fetch(
        &self,
        request: FetchRequest,
        stream_id: &StreamId,
        token: &str,
        _metadata: &RequestMetadata,
        require_auth: bool,
    ) -> ResponseEnvelope {
        if require_auth && self.auth.validate(token).await.is_err() {
            tracing::warn!(%stream_id, entity = %request.entity, "fetch rejected");
            return ResponseEnvelope::unauthorized();
        }
        tracing::debug!(%stream_id, entity = %request.entity, "processing fetch");

        match request.entity.as_str() {
            entities::STREAMS => {
                let infos = self.broker.streams().await;
                let payloads = infos
                    .iter()
                    .map(|info| serde_json::to_value(info).unwrap_or_default())
                    .collect();
                ResponseEnvelope::ok_many(payloads)
            }
            entities::TOPICS => {
                let target = if request.filter.is_empty() {
                    stream_id.clone()
                } else {
                    StreamId::from(request.filter.as_str())
                };
                match self.broker.registry().topics(&target).await {
                    Ok(topics) => ResponseEnvelope::ok_with(json!({
                        "stream_id": target,
                        "topics": topics,
                    })),
                    Err(err) => ResponseEnvelope::from_error(&err),
                }
            }
            entities::PENDING => ResponseEnvelope::ok_with(json!({
                "pending": self.broker.correlator().pending_count(),
            })),
            other => ResponseEnvelope::bad_request(format!("unknown fetch entity: {other}")),
        }
    }
}
