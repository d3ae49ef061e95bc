//! The broker's own command worker.
//!
//! Registers and unregisters streams on connect/disconnect, applies the
//! subscribe/unsubscribe control commands, offers targeted commands to the
//! pending-request correlator, and fans everything else out by topic. A
//! publishing command whose payload sets `"await_response": true` is sent
//! through the correlator instead: the worker suspends until a subscriber
//! answers (or the deadline passes) and returns the response command in
//! the envelope.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{CommandWorker, RequestMetadata};
use crate::auth::Authenticator;
use crate::domain::command::{Command, keys};
use crate::domain::envelope::ResponseEnvelope;
use crate::domain::stream_handle::StreamHandle;
use crate::domain::stream_id::StreamId;
use crate::service::MessageBroker;

/// Command worker wired to the [`MessageBroker`] core.
#[derive(Debug)]
pub struct BrokerCommandWorker {
    broker: MessageBroker,
    auth: Arc<dyn Authenticator>,
    response_timeout: Duration,
}

impl BrokerCommandWorker {
    /// Creates a worker over the broker core and an authenticator.
    /// Wait-for-response publishes give up after `response_timeout`.
    #[must_use]
    pub fn new(
        broker: MessageBroker,
        auth: Arc<dyn Authenticator>,
        response_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            auth,
            response_timeout,
        }
    }

    async fn authorize(&self, token: &str) -> Result<(), ResponseEnvelope> {
        match self.auth.validate(token).await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "command rejected: authentication failed");
                Err(ResponseEnvelope::unauthorized())
            }
        }
    }
}

#[async_trait]
impl CommandWorker for BrokerCommandWorker {
    async fn on_stream_connected(
        &self,
        handle: Arc<dyn StreamHandle>,
        token: &str,
        _metadata: &RequestMetadata,
    ) -> ResponseEnvelope {
        let principal = match self.auth.validate(token).await {
            Ok(principal) => principal,
            Err(err) => {
                tracing::warn!(stream_id = %handle.id(), error = %err, "stream rejected");
                return ResponseEnvelope::unauthorized();
            }
        };
        let stream_id = handle.id().clone();
        self.broker.attach_stream(handle, principal.id.clone()).await;
        ResponseEnvelope::ok_with(json!({
            "stream_id": stream_id,
            "owner": principal.id,
        }))
    }

    async fn on_stream_disconnected(&self, stream_id: &StreamId) -> ResponseEnvelope {
        self.broker.detach_stream(stream_id).await;
        ResponseEnvelope::ok()
    }

    async fn process_command(
        &self,
        broker_id: &str,
        command: Command,
        stream_id: &StreamId,
        token: &str,
        _metadata: &RequestMetadata,
        require_auth: bool,
    ) -> ResponseEnvelope {
        if require_auth && let Err(envelope) = self.authorize(token).await {
            return envelope;
        }
        tracing::debug!(broker_id, %stream_id, key = %command.key, "processing command");

        // A targeted command is a response to someone's pending request.
        // Whether it resolves a waiter or the waiter is already gone, the
        // inbound frame itself was processed fine.
        if command.target_id.is_some() {
            return if self.broker.resolve_response(&command) {
                ResponseEnvelope::ok_with_message("response delivered")
            } else {
                ResponseEnvelope::ok_with_message("no pending request for response; dropped")
            };
        }

        match command.key.as_str() {
            keys::SUBSCRIBE => {
                let Some(topic) = command.topic.as_deref() else {
                    return ResponseEnvelope::bad_request("subscribe command carries no topic");
                };
                match self.broker.subscribe(stream_id, topic).await {
                    Ok(()) => ResponseEnvelope::ok_with_message(format!("subscribed to {topic}")),
                    Err(err) => ResponseEnvelope::from_error(&err),
                }
            }
            keys::UNSUBSCRIBE => {
                let Some(topic) = command.topic.as_deref() else {
                    return ResponseEnvelope::bad_request("unsubscribe command carries no topic");
                };
                match self.broker.unsubscribe(stream_id, topic).await {
                    Ok(()) => {
                        ResponseEnvelope::ok_with_message(format!("unsubscribed from {topic}"))
                    }
                    Err(err) => ResponseEnvelope::from_error(&err),
                }
            }
            _ => {
                let Some(topic) = command.topic.clone() else {
                    return ResponseEnvelope::bad_request(
                        "command carries neither topic nor target",
                    );
                };
                let wants_response = command
                    .payload
                    .get("await_response")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if wants_response {
                    match self
                        .broker
                        .forward_and_await(
                            stream_id.as_str(),
                            command,
                            &topic,
                            self.response_timeout,
                        )
                        .await
                    {
                        Ok(response) => ResponseEnvelope::ok_with(
                            serde_json::to_value(&response).unwrap_or_default(),
                        ),
                        Err(err) => ResponseEnvelope::from_error(&err),
                    }
                } else {
                    let delivered = self.broker.forward(&command, &topic).await;
                    ResponseEnvelope::ok_with(json!({ "delivered": delivered }))
                }
            }
        }
    }
}
