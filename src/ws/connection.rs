//! WebSocket connection loop.
//!
//! One task per connected peer: inbound frames are dispatched to the
//! workers (every command/fetch frame gets exactly one response frame),
//! and commands queued on the peer's stream handle are pushed out as they
//! arrive.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::messages::{WsMessage, WsMessageType};
use crate::app_state::AppState;
use crate::domain::command::Command;
use crate::domain::fetch::FetchRequest;
use crate::domain::stream_handle::{ChannelStreamHandle, StreamHandle};
use crate::domain::stream_id::StreamId;
use crate::worker::RequestMetadata;

/// Identity and credentials a peer presented at upgrade time.
#[derive(Debug)]
pub struct ConnectParams {
    /// Stream identity; client-supplied for reconnects, generated
    /// otherwise.
    pub stream_id: StreamId,
    /// Credential token, validated by the command worker on connect and
    /// per inbound frame.
    pub token: String,
    /// Transport metadata handed to the workers.
    pub metadata: RequestMetadata,
}

/// Runs the read/write loop for one WebSocket connection.
pub async fn run_connection(socket: WebSocket, state: AppState, params: ConnectParams) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (handle, mut outbound_rx) =
        ChannelStreamHandle::new(params.stream_id.clone(), state.config.stream_queue_capacity);
    let handle: Arc<dyn StreamHandle> = Arc::new(handle);

    let connected = state
        .command_worker
        .on_stream_connected(Arc::clone(&handle), &params.token, &params.metadata)
        .await;
    let accepted = connected.is_ok();
    let hello = WsMessage::response(String::new(), &connected);
    if ws_tx.send(Message::text(hello.to_json())).await.is_err() {
        if accepted {
            let _ = state
                .command_worker
                .on_stream_disconnected(&params.stream_id)
                .await;
        }
        return;
    }
    if !accepted {
        return;
    }

    loop {
        tokio::select! {
            // Inbound frame from the peer
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = dispatch_frame(&text, &state, &params).await;
                        if ws_tx.send(Message::text(reply)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Command queued on this peer's stream handle
            command = outbound_rx.recv() => {
                match command {
                    Some(command) => {
                        let frame = WsMessage::push(&command);
                        if ws_tx.send(Message::text(frame.to_json())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = state
        .command_worker
        .on_stream_disconnected(&params.stream_id)
        .await;
    tracing::debug!(stream_id = %params.stream_id, "ws connection closed");
}

/// Dispatches one inbound frame, returning the reply frame's wire form.
async fn dispatch_frame(text: &str, state: &AppState, params: &ConnectParams) -> String {
    let Ok(frame) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 1001, "malformed JSON frame").to_json();
    };

    match frame.msg_type {
        WsMessageType::Command => match serde_json::from_value::<Command>(frame.payload) {
            Ok(command) => {
                let envelope = state
                    .command_worker
                    .process_command(
                        state.broker.broker_id(),
                        command,
                        &params.stream_id,
                        &params.token,
                        &params.metadata,
                        true,
                    )
                    .await;
                WsMessage::response(frame.id, &envelope).to_json()
            }
            Err(err) => {
                WsMessage::error(frame.id, 1001, format!("invalid command payload: {err}"))
                    .to_json()
            }
        },
        WsMessageType::Fetch => match serde_json::from_value::<FetchRequest>(frame.payload) {
            Ok(request) => {
                let envelope = state
                    .fetch_worker
                    .process_fetch(
                        request,
                        &params.stream_id,
                        &params.token,
                        &params.metadata,
                        true,
                    )
                    .await;
                WsMessage::response(frame.id, &envelope).to_json()
            }
            Err(err) => {
                WsMessage::error(frame.id, 1001, format!("invalid fetch payload: {err}")).to_json()
            }
        },
        WsMessageType::Response | WsMessageType::Push | WsMessageType::Error => {
            WsMessage::error(frame.id, 1001, "unsupported frame type").to_json()
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::auth::StaticTokenAuthenticator;
    use crate::config::BrokerConfig;
    use crate::domain::command::keys;
    use crate::service::MessageBroker;
    use crate::worker::{BrokerCommandWorker, CommandWorker, FetchWorker, RegistryFetchWorker};
    use serde_json::{Value, json};

    const TOKEN: &str = "device-1:s3cret";

    fn make_state() -> AppState {
        let config = Arc::new(BrokerConfig::for_tests());
        let broker = MessageBroker::new("test-broker");
        let auth = Arc::new(StaticTokenAuthenticator::new("s3cret"));
        let command_worker: Arc<dyn CommandWorker> = Arc::new(BrokerCommandWorker::new(
            broker.clone(),
            Arc::clone(&auth) as Arc<dyn crate::auth::Authenticator>,
            config.response_timeout(),
        ));
        let fetch_worker: Arc<dyn FetchWorker> =
            Arc::new(RegistryFetchWorker::new(broker.clone(), auth));
        AppState {
            config,
            broker,
            command_worker,
            fetch_worker,
        }
    }

    fn make_params(id: &str) -> ConnectParams {
        ConnectParams {
            stream_id: StreamId::from(id),
            token: TOKEN.to_string(),
            metadata: RequestMetadata::new(),
        }
    }

    async fn attach(state: &AppState, id: &str) {
        let (handle, _rx) = ChannelStreamHandle::new(StreamId::from(id), 16);
        let envelope = state
            .command_worker
            .on_stream_connected(Arc::new(handle), TOKEN, &RequestMetadata::new())
            .await;
        assert!(envelope.is_ok());
    }

    #[tokio::test]
    async fn malformed_frame_yields_error_frame() {
        let state = make_state();
        let params = make_params("s-1");

        let reply = dispatch_frame("{not json", &state, &params).await;
        let Some(frame) = serde_json::from_str::<WsMessage>(&reply).ok() else {
            panic!("reply should be a frame");
        };
        assert_eq!(frame.msg_type, WsMessageType::Error);
    }

    #[tokio::test]
    async fn command_frame_gets_exactly_one_response_frame() {
        let state = make_state();
        attach(&state, "s-1").await;
        let params = make_params("s-1");

        let frame = WsMessage {
            id: "req-1".to_string(),
            msg_type: WsMessageType::Command,
            timestamp: chrono::Utc::now(),
            payload: serde_json::to_value(
                Command::new(keys::SUBSCRIBE, Value::Null).with_topic("jobs"),
            )
            .unwrap_or_default(),
        };

        let reply = dispatch_frame(&frame.to_json(), &state, &params).await;
        let Some(reply) = serde_json::from_str::<WsMessage>(&reply).ok() else {
            panic!("reply should be a frame");
        };
        assert_eq!(reply.id, "req-1");
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.payload.get("result"), Some(&json!("ok")));

        let topics = state
            .broker
            .registry()
            .topics(&StreamId::from("s-1"))
            .await
            .unwrap_or_default();
        assert_eq!(topics, vec!["jobs".to_string()]);
    }

    #[tokio::test]
    async fn fetch_frame_is_dispatched_to_the_fetch_worker() {
        let state = make_state();
        attach(&state, "s-1").await;
        let params = make_params("s-1");

        let frame = WsMessage {
            id: "req-2".to_string(),
            msg_type: WsMessageType::Fetch,
            timestamp: chrono::Utc::now(),
            payload: json!({"id": "f-1", "entity": "streams"}),
        };

        let reply = dispatch_frame(&frame.to_json(), &state, &params).await;
        let Some(reply) = serde_json::from_str::<WsMessage>(&reply).ok() else {
            panic!("reply should be a frame");
        };
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.payload.get("result"), Some(&json!("ok")));
    }

    #[tokio::test]
    async fn push_frames_from_clients_are_rejected() {
        let state = make_state();
        let params = make_params("s-1");

        let frame = WsMessage::push(&Command::new("run", Value::Null));
        let reply = dispatch_frame(&frame.to_json(), &state, &params).await;
        let Some(reply) = serde_json::from_str::<WsMessage>(&reply).ok() else {
            panic!("reply should be a frame");
        };
        assert_eq!(reply.msg_type, WsMessageType::Error);
    }
}
