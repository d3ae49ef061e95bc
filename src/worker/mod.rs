//! Worker contracts: the pluggable handlers the transport invokes per
//! inbound message.
//!
//! A worker never fails with a raw error; every invocation returns exactly
//! one [`ResponseEnvelope`]. Concrete workers are constructed explicitly at
//! startup and handed to the transport through application state.

pub mod broker_worker;
pub mod fetch_worker;

pub use broker_worker::BrokerCommandWorker;
pub use fetch_worker::RegistryFetchWorker;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::command::Command;
use crate::domain::envelope::ResponseEnvelope;
use crate::domain::fetch::FetchRequest;
use crate::domain::stream_handle::StreamHandle;
use crate::domain::stream_id::StreamId;

/// String key/value pairs carried alongside a request (transport headers,
/// query parameters).
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata(HashMap<String, String>);

impl RequestMetadata {
    /// Creates an empty metadata map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key/value pair, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Handler for push-style commands and stream lifecycle events.
#[async_trait]
pub trait CommandWorker: Send + Sync + fmt::Debug {
    /// Called when a peer's stream comes up, before any command from it is
    /// processed. Registers the stream on success.
    async fn on_stream_connected(
        &self,
        handle: Arc<dyn StreamHandle>,
        token: &str,
        metadata: &RequestMetadata,
    ) -> ResponseEnvelope;

    /// Called when a peer's stream goes away.
    async fn on_stream_disconnected(&self, stream_id: &StreamId) -> ResponseEnvelope;

    /// Processes one inbound command from `stream_id`.
    ///
    /// With `require_auth` set, a failed token validation short-circuits
    /// to an unauthorized envelope before any side effect;
    /// `require_auth = false` is the escape hatch for trusted internal
    /// calls.
    async fn process_command(
        &self,
        broker_id: &str,
        command: Command,
        stream_id: &StreamId,
        token: &str,
        metadata: &RequestMetadata,
        require_auth: bool,
    ) -> ResponseEnvelope;
}

/// Handler for pull-style fetch requests.
#[async_trait]
pub trait FetchWorker: Send + Sync + fmt::Debug {
    /// Processes one fetch request from `stream_id`; same authentication
    /// contract as [`CommandWorker::process_command`].
    async fn process_fetch(
        &self,
        request: FetchRequest,
        stream_id: &StreamId,
        token: &str,
        metadata: &RequestMetadata,
        require_auth: bool,
    ) -> ResponseEnvelope;
}
