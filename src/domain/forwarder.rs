//! Topic fan-out and wait-for-response forwarding.
//!
//! [`TopicForwarder`] reads a snapshot from the subscription registry and
//! enqueues the command on every matching stream handle. Fan-out is
//! unordered across streams; order within one stream is the handle queue's
//! enqueue order. A stream whose handle has gone away is skipped silently,
//! and a slow consumer is the handle's own problem: enqueue never blocks.

use std::sync::Arc;
use std::time::Duration;

use super::command::Command;
use super::correlator::{CorrelationKey, RequestCorrelator};
use super::registry::SubscriptionRegistry;
use crate::error::BrokerError;

/// Default deadline for [`TopicForwarder::forward_and_await`].
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Routes commands to topic subscribers, optionally awaiting a correlated
/// response.
#[derive(Debug, Clone)]
pub struct TopicForwarder {
    registry: Arc<SubscriptionRegistry>,
    correlator: Arc<RequestCorrelator>,
}

impl TopicForwarder {
    /// Creates a forwarder over the given registry and correlator.
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>, correlator: Arc<RequestCorrelator>) -> Self {
        Self {
            registry,
            correlator,
        }
    }

    /// Returns the subscription registry this forwarder reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Returns the correlator this forwarder registers waits with.
    #[must_use]
    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    /// Enqueues `command` on every stream currently subscribed to `topic`.
    ///
    /// Returns the number of streams the command was enqueued on. Zero
    /// matches is a no-op, not an error.
    pub async fn forward(&self, command: &Command, topic: &str) -> usize {
        let subscribers = self.registry.snapshot(topic).await;
        for subscriber in &subscribers {
            tracing::trace!(
                topic,
                owner = %subscriber.owner,
                stream_id = %subscriber.stream_id,
                key = %command.key,
                "forwarding command to stream"
            );
            subscriber.handle.enqueue(command.clone());
        }
        subscribers.len()
    }

    /// Forwards `command` to `topic` and awaits the correlated response.
    ///
    /// Stamps `sender_id` onto the command, registers the pending wait
    /// (before fan-out, so a response cannot slip past it), forwards, and
    /// suspends until resolution or `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PendingExists`] if a wait is already
    /// registered under the same sender/key pair, or
    /// [`BrokerError::Timeout`] if no matching response arrives in time.
    pub async fn forward_and_await(
        &self,
        sender_id: &str,
        mut command: Command,
        topic: &str,
        timeout: Duration,
    ) -> Result<Command, BrokerError> {
        command.sender_id = sender_id.to_string();
        let key = CorrelationKey::for_request(&command);
        let pending = Arc::clone(&self.correlator).begin(key)?;
        self.forward(&command, topic).await;
        pending.await_response(timeout).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::stream_handle::{ChannelStreamHandle, StreamHandle};
    use crate::domain::stream_id::StreamId;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    fn make_forwarder() -> TopicForwarder {
        TopicForwarder::new(
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(RequestCorrelator::new()),
        )
    }

    async fn attach(
        forwarder: &TopicForwarder,
        id: &str,
        topics: &[&str],
    ) -> mpsc::Receiver<Command> {
        let (handle, rx) = ChannelStreamHandle::new(StreamId::from(id), 16);
        let handle: Arc<dyn StreamHandle> = Arc::new(handle);
        forwarder.registry().register(handle, "owner").await;
        for topic in topics {
            let subscribed = forwarder.registry().subscribe(&StreamId::from(id), topic).await;
            assert!(subscribed.is_ok());
        }
        rx
    }

    #[tokio::test]
    async fn forward_reaches_subscribers_and_only_subscribers() {
        let forwarder = make_forwarder();
        let mut jobs_rx = attach(&forwarder, "s-jobs", &["jobs"]).await;
        let mut other_rx = attach(&forwarder, "s-other", &["alerts"]).await;

        let delivered = forwarder.forward(&Command::new("run", Value::Null), "jobs").await;
        assert_eq!(delivered, 1);

        let Some(received) = jobs_rx.try_recv().ok() else {
            panic!("subscriber should receive the command");
        };
        assert_eq!(received.key, "run");
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_to_topic_without_subscribers_is_a_noop() {
        let forwarder = make_forwarder();
        let delivered = forwarder.forward(&Command::new("run", Value::Null), "empty").await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn per_stream_order_is_preserved() {
        let forwarder = make_forwarder();
        let mut rx = attach(&forwarder, "s-1", &["jobs"]).await;

        forwarder.forward(&Command::new("first", Value::Null), "jobs").await;
        forwarder.forward(&Command::new("second", Value::Null), "jobs").await;

        let keys: Vec<String> = [rx.try_recv(), rx.try_recv()]
            .into_iter()
            .filter_map(Result::ok)
            .map(|cmd| cmd.key)
            .collect();
        assert_eq!(keys, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn disconnected_handle_is_skipped_silently() {
        let forwarder = make_forwarder();
        let gone_rx = attach(&forwarder, "s-gone", &["jobs"]).await;
        let mut live_rx = attach(&forwarder, "s-live", &["jobs"]).await;
        drop(gone_rx);

        // Both are still registered; the dead handle drops the command,
        // the live one receives it.
        let delivered = forwarder.forward(&Command::new("run", Value::Null), "jobs").await;
        assert_eq!(delivered, 2);
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn forward_and_await_resolves_with_matching_response() {
        let forwarder = make_forwarder();
        let mut rx = attach(&forwarder, "s-worker", &["jobs"]).await;

        let responder = {
            let correlator = Arc::clone(forwarder.correlator());
            tokio::spawn(async move {
                let Some(request) = rx.recv().await else {
                    return false;
                };
                let response = Command::response_to(&request, json!({"status": "done"}));
                correlator.resolve(&response)
            })
        };

        let result = forwarder
            .forward_and_await(
                "caller-1",
                Command::new("run", json!({"job": 7})),
                "jobs",
                Duration::from_secs(5),
            )
            .await;

        let Ok(response) = result else {
            panic!("response should arrive before the deadline");
        };
        assert_eq!(response.payload, json!({"status": "done"}));
        assert_eq!(response.target_id.as_deref(), Some("caller-1"));
        assert!(responder.await.unwrap_or(false));
        assert_eq!(forwarder.correlator().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn forward_and_await_times_out_without_response() {
        let forwarder = make_forwarder();
        let _rx = attach(&forwarder, "s-worker", &["jobs"]).await;

        let result = forwarder
            .forward_and_await(
                "caller-1",
                Command::new("run", Value::Null),
                "jobs",
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(result, Err(BrokerError::Timeout { .. })));
        assert_eq!(forwarder.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn sender_id_is_stamped_on_the_forwarded_command() {
        let forwarder = make_forwarder();
        let mut rx = attach(&forwarder, "s-worker", &["jobs"]).await;

        let correlator = Arc::clone(forwarder.correlator());
        let responder = tokio::spawn(async move {
            let Some(request) = rx.recv().await else {
                return None;
            };
            let sender = request.sender_id.clone();
            correlator.resolve(&Command::response_to(&request, Value::Null));
            Some(sender)
        });

        let result = forwarder
            .forward_and_await(
                "caller-1",
                Command::new("run", Value::Null),
                "jobs",
                Duration::from_secs(5),
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(responder.await.ok().flatten().as_deref(), Some("caller-1"));
    }
}
