//! Message broker: the assembled messaging subsystem.
//!
//! [`MessageBroker`] owns the subscription registry, the topic forwarder,
//! and the pending-request correlator as one explicit instance constructed
//! at startup and shared by reference. Workers and the transport layer go
//! through it rather than through any global state.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::command::Command;
use crate::domain::correlator::RequestCorrelator;
use crate::domain::forwarder::TopicForwarder;
use crate::domain::registry::{StreamInfo, SubscriptionRegistry};
use crate::domain::stream_handle::StreamHandle;
use crate::domain::stream_id::StreamId;
use crate::error::BrokerError;

/// The broker's messaging core as a single shareable unit.
#[derive(Debug, Clone)]
pub struct MessageBroker {
    broker_id: String,
    registry: Arc<SubscriptionRegistry>,
    correlator: Arc<RequestCorrelator>,
    forwarder: TopicForwarder,
}

impl MessageBroker {
    /// Creates a broker with empty registry and correlator tables.
    #[must_use]
    pub fn new(broker_id: impl Into<String>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let correlator = Arc::new(RequestCorrelator::new());
        let forwarder = TopicForwarder::new(Arc::clone(&registry), Arc::clone(&correlator));
        Self {
            broker_id: broker_id.into(),
            registry,
            correlator,
            forwarder,
        }
    }

    /// Identity of this broker process, used as the sender of
    /// broker-originated commands.
    #[must_use]
    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    /// Returns the subscription registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Returns the pending-request correlator.
    #[must_use]
    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    /// Attaches a connected stream under its owner.
    pub async fn attach_stream(&self, handle: Arc<dyn StreamHandle>, owner: impl Into<String>) {
        let owner = owner.into();
        tracing::info!(stream_id = %handle.id(), %owner, "stream attached");
        self.registry.register(handle, owner).await;
    }

    /// Detaches a stream, dropping its subscriptions.
    pub async fn detach_stream(&self, stream_id: &StreamId) {
        if self.registry.unregister(stream_id).await {
            tracing::info!(%stream_id, "stream detached");
        }
    }

    /// Adds a topic to a stream's subscription set.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::StreamNotFound`] if the stream is not
    /// attached.
    pub async fn subscribe(&self, stream_id: &StreamId, topic: &str) -> Result<(), BrokerError> {
        self.registry.subscribe(stream_id, topic).await
    }

    /// Removes a topic from a stream's subscription set.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::StreamNotFound`] if the stream is not
    /// attached.
    pub async fn unsubscribe(&self, stream_id: &StreamId, topic: &str) -> Result<(), BrokerError> {
        self.registry.unsubscribe(stream_id, topic).await
    }

    /// Fans `command` out to every subscriber of `topic`; returns the
    /// number of streams reached.
    pub async fn forward(&self, command: &Command, topic: &str) -> usize {
        self.forwarder.forward(command, topic).await
    }

    /// Fans `command` out to `topic` and awaits the correlated response.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Timeout`] if no response arrives within
    /// `timeout`, or [`BrokerError::PendingExists`] if the sender already
    /// has a wait open on the same operation key.
    pub async fn forward_and_await(
        &self,
        sender_id: &str,
        command: Command,
        topic: &str,
        timeout: Duration,
    ) -> Result<Command, BrokerError> {
        self.forwarder
            .forward_and_await(sender_id, command, topic, timeout)
            .await
    }

    /// Offers a response command to the correlator; returns `true` if it
    /// resolved a waiting request.
    pub fn resolve_response(&self, response: &Command) -> bool {
        self.correlator.resolve(response)
    }

    /// Summaries of all attached streams.
    pub async fn streams(&self) -> Vec<StreamInfo> {
        self.registry.list().await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::stream_handle::ChannelStreamHandle;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    async fn attach(broker: &MessageBroker, id: &str, owner: &str) -> mpsc::Receiver<Command> {
        let (handle, rx) = ChannelStreamHandle::new(StreamId::from(id), 16);
        broker.attach_stream(Arc::new(handle), owner).await;
        rx
    }

    /// Stream A subscribes to `jobs`; stream B sends a wait-for-response
    /// command into the topic; A answers; B's call returns the response.
    #[tokio::test]
    async fn request_response_round_trip_between_streams() {
        let broker = MessageBroker::new("test-broker");
        let mut a_rx = attach(&broker, "stream-a", "device-a").await;
        let _b_rx = attach(&broker, "stream-b", "device-b").await;
        let subscribed = broker.subscribe(&StreamId::from("stream-a"), "jobs").await;
        assert!(subscribed.is_ok());

        // Stream A's dispatcher: process the pushed command, answer it.
        let responder = {
            let broker = broker.clone();
            tokio::spawn(async move {
                let Some(request) = a_rx.recv().await else {
                    return false;
                };
                assert_eq!(request.sender_id, "B");
                let response = Command::response_to(&request, json!({"status": "accepted"}));
                broker.resolve_response(&response)
            })
        };

        let result = broker
            .forward_and_await(
                "B",
                Command::new("run", json!({"job": 1})),
                "jobs",
                Duration::from_secs(5),
            )
            .await;

        let Ok(response) = result else {
            panic!("B should receive A's response");
        };
        assert_eq!(response.payload, json!({"status": "accepted"}));
        assert!(responder.await.unwrap_or(false));
    }

    /// Same setup, but stream A never responds: B times out and the
    /// pending entry is gone afterwards.
    #[tokio::test(start_paused = true)]
    async fn request_without_response_times_out_cleanly() {
        let broker = MessageBroker::new("test-broker");
        let _a_rx = attach(&broker, "stream-a", "device-a").await;
        let subscribed = broker.subscribe(&StreamId::from("stream-a"), "jobs").await;
        assert!(subscribed.is_ok());

        let result = broker
            .forward_and_await(
                "B",
                Command::new("run", Value::Null),
                "jobs",
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(result, Err(BrokerError::Timeout { .. })));
        assert_eq!(broker.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn detach_drops_subscriptions() {
        let broker = MessageBroker::new("test-broker");
        let _rx = attach(&broker, "stream-a", "device-a").await;
        let id = StreamId::from("stream-a");
        assert!(broker.subscribe(&id, "jobs").await.is_ok());

        broker.detach_stream(&id).await;
        assert!(broker.streams().await.is_empty());
        assert!(matches!(
            broker.subscribe(&id, "jobs").await,
            Err(BrokerError::StreamNotFound(_))
        ));
    }

    #[tokio::test]
    async fn forward_without_wait_reaches_all_subscribers() {
        let broker = MessageBroker::new("test-broker");
        let mut a_rx = attach(&broker, "stream-a", "device-a").await;
        let mut b_rx = attach(&broker, "stream-b", "device-b").await;
        for id in ["stream-a", "stream-b"] {
            let subscribed = broker.subscribe(&StreamId::from(id), "alerts").await;
            assert!(subscribed.is_ok());
        }

        let delivered = broker
            .forward(&Command::new("alarm", json!({"level": "high"})), "alerts")
            .await;
        assert_eq!(delivered, 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
    }
}
