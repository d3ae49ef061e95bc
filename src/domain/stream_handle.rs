//! Outbound stream handle contract and its channel-backed implementation.
//!
//! A [`StreamHandle`] is the only thing the forwarding pipeline knows about
//! a connected peer: a stable identity and a non-blocking enqueue. Delivery
//! order within one stream follows enqueue order; everything past the queue
//! (the socket write loop, backpressure, reconnects) is the transport's
//! concern.

use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::command::Command;
use super::stream_id::StreamId;

/// Addressable output sink for one connected peer.
///
/// `enqueue` must never block: a handle with a full or closed queue applies
/// its own bounded-queue policy (drop, for the channel implementation) and
/// the caller moves on.
pub trait StreamHandle: Send + Sync + fmt::Debug {
    /// Stable identity of the stream, for the lifetime of the connection.
    fn id(&self) -> &StreamId;

    /// Queues a command for delivery to the remote peer.
    fn enqueue(&self, command: Command);
}

/// [`StreamHandle`] backed by a bounded [`mpsc`] channel.
///
/// The receiving half is drained by the transport's write loop. When the
/// queue is full the command is dropped with a warning; when the receiver
/// is gone (peer disconnected) the command is dropped silently.
#[derive(Debug)]
pub struct ChannelStreamHandle {
    id: StreamId,
    queue: mpsc::Sender<Command>,
}

impl ChannelStreamHandle {
    /// Creates a handle with the given queue capacity, returning the
    /// receiving half for the transport's write loop.
    #[must_use]
    pub fn new(id: StreamId, capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (queue, rx) = mpsc::channel(capacity);
        (Self { id, queue }, rx)
    }
}

impl StreamHandle for ChannelStreamHandle {
    fn id(&self) -> &StreamId {
        &self.id
    }

    fn enqueue(&self, command: Command) {
        match self.queue.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                tracing::warn!(
                    stream_id = %self.id,
                    key = %cmd.key,
                    "outbound queue full; dropping command"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(stream_id = %self.id, "stream closed; dropping command");
            }
        }
    }
}
