//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::service::MessageBroker;
use crate::worker::{CommandWorker, FetchWorker};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Broker configuration loaded at startup.
    pub config: Arc<BrokerConfig>,
    /// The messaging core.
    pub broker: MessageBroker,
    /// Command worker the transport dispatches to. Supplied explicitly at
    /// startup rather than discovered.
    pub command_worker: Arc<dyn CommandWorker>,
    /// Fetch worker the transport dispatches to.
    pub fetch_worker: Arc<dyn FetchWorker>,
}
