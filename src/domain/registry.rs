//! Concurrent subscription storage with per-stream fine-grained locking.
//!
//! [`SubscriptionRegistry`] owns the mapping from stream identity to
//! subscription state. The outer `HashMap` and each entry are individually
//! protected by a [`tokio::sync::RwLock`], so reads on one stream never
//! contend with writes on another. Lock order is always outer map first,
//! then entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use super::stream_handle::StreamHandle;
use super::stream_id::StreamId;
use crate::error::BrokerError;

/// Subscription state of one connected stream.
///
/// Exclusively owned by the registry; the forwarder only ever sees
/// [`TopicSubscriber`] snapshot rows.
#[derive(Debug)]
pub struct StreamSubscription {
    /// Authenticated principal owning the stream; may be empty for
    /// anonymous streams.
    pub owner: String,
    /// Topics the stream currently wants to receive.
    pub topics: HashSet<String>,
    /// Live output sink. Replaced in place when the same stream id
    /// reconnects.
    pub handle: Arc<dyn StreamHandle>,
}

/// Point-in-time view of one subscriber of a topic.
#[derive(Debug, Clone)]
pub struct TopicSubscriber {
    /// Identity of the subscribed stream.
    pub stream_id: StreamId,
    /// Owner of the subscribed stream.
    pub owner: String,
    /// Output sink of the subscribed stream at snapshot time.
    pub handle: Arc<dyn StreamHandle>,
}

/// Serializable summary of one registered stream, for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Identity of the stream.
    pub stream_id: StreamId,
    /// Owner of the stream.
    pub owner: String,
    /// Sorted topic subscriptions.
    pub topics: Vec<String>,
}

/// Central store mapping stream ids to their subscription state.
///
/// # Concurrency
///
/// - `register`/`unregister` are linearizable per stream id: the outer
///   write lock makes insert-or-replace and remove atomic single-key
///   operations, so racing calls cannot lose updates or resurrect a
///   removed entry.
/// - `subscribe`/`unsubscribe` on different streams run concurrently.
/// - `snapshot` copies matching entries out under read locks and is safe
///   to iterate while the registry keeps mutating.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    streams: RwLock<HashMap<StreamId, Arc<RwLock<StreamSubscription>>>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a stream handle under its id.
    ///
    /// First registration creates the subscription with an empty topic
    /// set. Re-registration of a live id replaces the handle and owner in
    /// place while preserving the topic set, so a reconnecting peer
    /// resumes its subscriptions transparently.
    pub async fn register(&self, handle: Arc<dyn StreamHandle>, owner: impl Into<String>) {
        let stream_id = handle.id().clone();
        let owner = owner.into();
        let mut map = self.streams.write().await;
        if let Some(entry) = map.get(&stream_id) {
            let mut subscription = entry.write().await;
            subscription.handle = handle;
            subscription.owner = owner;
            tracing::debug!(%stream_id, "stream re-registered; topics preserved");
        } else {
            map.insert(
                stream_id.clone(),
                Arc::new(RwLock::new(StreamSubscription {
                    owner,
                    topics: HashSet::new(),
                    handle,
                })),
            );
            tracing::debug!(%stream_id, "stream registered");
        }
    }

    /// Removes the subscription for `stream_id`, returning `true` if one
    /// was present. No-op on unknown ids.
    pub async fn unregister(&self, stream_id: &StreamId) -> bool {
        let removed = self.streams.write().await.remove(stream_id).is_some();
        if removed {
            tracing::debug!(%stream_id, "stream unregistered");
        }
        removed
    }

    /// Adds `topic` to the stream's subscription set.
    ///
    /// An empty topic is a silent no-op, as is a duplicate subscription.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::StreamNotFound`] if the stream id has no
    /// subscription; callers must register before subscribing.
    pub async fn subscribe(&self, stream_id: &StreamId, topic: &str) -> Result<(), BrokerError> {
        if topic.is_empty() {
            return Ok(());
        }
        let entry = self.entry(stream_id).await?;
        let mut subscription = entry.write().await;
        if subscription.topics.insert(topic.to_string()) {
            tracing::debug!(%stream_id, topic, "topic subscribed");
        }
        Ok(())
    }

    /// Removes `topic` from the stream's subscription set.
    ///
    /// An empty or absent topic is a silent no-op; unsubscribing twice is
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::StreamNotFound`] if the stream id has no
    /// subscription.
    pub async fn unsubscribe(&self, stream_id: &StreamId, topic: &str) -> Result<(), BrokerError> {
        if topic.is_empty() {
            return Ok(());
        }
        let entry = self.entry(stream_id).await?;
        let mut subscription = entry.write().await;
        if subscription.topics.remove(topic) {
            tracing::debug!(%stream_id, topic, "topic unsubscribed");
        }
        Ok(())
    }

    /// Returns a point-in-time copy of every subscription whose topic set
    /// contains `topic`, safe to iterate during concurrent mutation.
    pub async fn snapshot(&self, topic: &str) -> Vec<TopicSubscriber> {
        let map = self.streams.read().await;
        let mut subscribers = Vec::new();
        for (stream_id, entry) in map.iter() {
            let subscription = entry.read().await;
            if subscription.topics.contains(topic) {
                subscribers.push(TopicSubscriber {
                    stream_id: stream_id.clone(),
                    owner: subscription.owner.clone(),
                    handle: Arc::clone(&subscription.handle),
                });
            }
        }
        subscribers
    }

    /// Returns summaries of all registered streams.
    pub async fn list(&self) -> Vec<StreamInfo> {
        let map = self.streams.read().await;
        let mut infos = Vec::with_capacity(map.len());
        for (stream_id, entry) in map.iter() {
            let subscription = entry.read().await;
            let mut topics: Vec<String> = subscription.topics.iter().cloned().collect();
            topics.sort();
            infos.push(StreamInfo {
                stream_id: stream_id.clone(),
                owner: subscription.owner.clone(),
                topics,
            });
        }
        infos
    }

    /// Returns the sorted topic set of one stream.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::StreamNotFound`] if the stream id has no
    /// subscription.
    pub async fn topics(&self, stream_id: &StreamId) -> Result<Vec<String>, BrokerError> {
        let entry = self.entry(stream_id).await?;
        let subscription = entry.read().await;
        let mut topics: Vec<String> = subscription.topics.iter().cloned().collect();
        topics.sort();
        Ok(topics)
    }

    /// Returns `true` if a subscription exists for `stream_id`.
    pub async fn contains(&self, stream_id: &StreamId) -> bool {
        self.streams.read().await.contains_key(stream_id)
    }

    /// Returns the number of registered streams.
    pub async fn len(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Returns `true` if no stream is registered.
    pub async fn is_empty(&self) -> bool {
        self.streams.read().await.is_empty()
    }

    async fn entry(
        &self,
        stream_id: &StreamId,
    ) -> Result<Arc<RwLock<StreamSubscription>>, BrokerError> {
        let map = self.streams.read().await;
        map.get(stream_id)
            .map(Arc::clone)
            .ok_or_else(|| BrokerError::StreamNotFound(stream_id.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::stream_handle::ChannelStreamHandle;
    use tokio::sync::mpsc;

    fn make_handle(id: &str) -> (Arc<dyn StreamHandle>, mpsc::Receiver<crate::domain::command::Command>) {
        let (handle, rx) = ChannelStreamHandle::new(StreamId::from(id), 16);
        (Arc::new(handle), rx)
    }

    #[tokio::test]
    async fn register_then_subscribe_then_snapshot() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = make_handle("s-1");
        registry.register(handle, "alice").await;

        assert!(registry.subscribe(&StreamId::from("s-1"), "jobs").await.is_ok());

        let subscribers = registry.snapshot("jobs").await;
        assert_eq!(subscribers.len(), 1);
        let Some(first) = subscribers.first() else {
            panic!("subscriber missing");
        };
        assert_eq!(first.stream_id, StreamId::from("s-1"));
        assert_eq!(first.owner, "alice");
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_snapshot_and_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = make_handle("s-1");
        registry.register(handle, "alice").await;
        let id = StreamId::from("s-1");

        assert!(registry.subscribe(&id, "jobs").await.is_ok());
        assert!(registry.unsubscribe(&id, "jobs").await.is_ok());
        assert!(registry.snapshot("jobs").await.is_empty());

        // Second unsubscribe is a no-op, not an error.
        assert!(registry.unsubscribe(&id, "jobs").await.is_ok());
    }

    #[tokio::test]
    async fn subscribe_on_unknown_stream_fails_not_found() {
        let registry = SubscriptionRegistry::new();
        let result = registry.subscribe(&StreamId::from("ghost"), "jobs").await;
        assert!(matches!(result, Err(BrokerError::StreamNotFound(_))));
    }

    #[tokio::test]
    async fn unregister_prevents_resurrection() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = make_handle("s-1");
        registry.register(handle, "alice").await;
        let id = StreamId::from("s-1");

        assert!(registry.unregister(&id).await);
        let result = registry.subscribe(&id, "jobs").await;
        assert!(matches!(result, Err(BrokerError::StreamNotFound(_))));

        // A second unregister is a no-op.
        assert!(!registry.unregister(&id).await);
    }

    #[tokio::test]
    async fn empty_topic_is_silent_noop() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = make_handle("s-1");
        registry.register(handle, "alice").await;
        let id = StreamId::from("s-1");

        assert!(registry.subscribe(&id, "").await.is_ok());
        assert!(registry.unsubscribe(&id, "").await.is_ok());
        let topics = registry.topics(&id).await.unwrap_or_default();
        assert!(topics.is_empty());
    }

    #[tokio::test]
    async fn reregistration_preserves_topics_and_replaces_handle() {
        let registry = SubscriptionRegistry::new();
        let (old_handle, _old_rx) = make_handle("s-1");
        registry.register(old_handle, "alice").await;
        let id = StreamId::from("s-1");
        assert!(registry.subscribe(&id, "jobs").await.is_ok());

        // Reconnect with the same id: topics survive, traffic goes to the
        // new handle.
        let (new_handle, mut new_rx) = make_handle("s-1");
        registry.register(new_handle, "alice").await;

        let topics = registry.topics(&id).await.unwrap_or_default();
        assert_eq!(topics, vec!["jobs".to_string()]);

        let subscribers = registry.snapshot("jobs").await;
        assert_eq!(subscribers.len(), 1);
        let Some(first) = subscribers.first() else {
            panic!("subscriber missing");
        };
        first
            .handle
            .enqueue(crate::domain::command::Command::new("ping", serde_json::Value::Null));
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn list_reports_owner_and_sorted_topics() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = make_handle("s-1");
        registry.register(handle, "alice").await;
        let id = StreamId::from("s-1");
        assert!(registry.subscribe(&id, "zeta").await.is_ok());
        assert!(registry.subscribe(&id, "alpha").await.is_ok());

        let infos = registry.list().await;
        assert_eq!(infos.len(), 1);
        let Some(info) = infos.first() else {
            panic!("stream info missing");
        };
        assert_eq!(info.owner, "alice");
        assert_eq!(info.topics, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_paired_register_unregister_leaves_registry_empty() {
        let registry = Arc::new(SubscriptionRegistry::new());

        // 100 tasks over 10 distinct stream ids, each registering and then
        // unregistering its id. Whatever the interleaving, the last
        // operation on each id is an unregister, so nothing may leak.
        let mut tasks = Vec::new();
        for task_no in 0..100u32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let id = format!("s-{}", task_no % 10);
                let (handle, _rx) = ChannelStreamHandle::new(StreamId::from(id.as_str()), 4);
                let handle: Arc<dyn StreamHandle> = Arc::new(handle);
                registry.register(handle, "owner").await;
                if task_no % 2 == 0 {
                    let _ = registry.subscribe(&StreamId::from(id.as_str()), "jobs").await;
                }
                tokio::task::yield_now().await;
                registry.unregister(&StreamId::from(id.as_str())).await;
            }));
        }
        for task in tasks {
            assert!(task.await.is_ok());
        }

        assert!(registry.is_empty().await);
        assert!(registry.snapshot("jobs").await.is_empty());
    }

    #[tokio::test]
    async fn len_and_contains() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.is_empty().await);

        let (handle, _rx) = make_handle("s-1");
        registry.register(handle, "alice").await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(&StreamId::from("s-1")).await);
        assert!(!registry.contains(&StreamId::from("s-2")).await);
    }
}
