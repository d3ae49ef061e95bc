//! Pending-request correlation with timeout and cancellation.
//!
//! A wait-for-response send registers a [`PendingRequest`] under its
//! correlation key. Each pending entry moves through exactly one terminal
//! transition: resolved by a matching response, timed out at its deadline,
//! or cancelled when the waiting caller abandons it. The table entry is
//! removed by whichever transition fires first; tickets make the removal
//! race-free so a later request reusing the key can never be evicted by a
//! stale cleanup.
//!
//! The table is a `std::sync::Mutex` rather than an async lock: no code
//! path awaits while holding it, and the cancellation guard must be able
//! to clean up from `Drop`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use super::command::Command;
use crate::error::BrokerError;

/// Identifies the request a response belongs to.
///
/// Derived from the request's sender and operation key; the responder
/// addresses the original sender via `target_id` and echoes the key, so
/// both sides derive the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    origin: String,
    key: String,
}

impl CorrelationKey {
    /// Creates a key from an origin identity and an operation key.
    #[must_use]
    pub fn new(origin: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            key: key.into(),
        }
    }

    /// Derives the key under which a request waits.
    #[must_use]
    pub fn for_request(request: &Command) -> Self {
        Self::new(request.sender_id.clone(), request.key.clone())
    }

    /// Derives the key a response resolves, if it addresses anyone.
    #[must_use]
    pub fn for_response(response: &Command) -> Option<Self> {
        response
            .target_id
            .as_ref()
            .map(|target| Self::new(target.clone(), response.key.clone()))
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.origin, self.key)
    }
}

#[derive(Debug)]
struct PendingEntry {
    ticket: u64,
    completion: oneshot::Sender<Command>,
}

/// Tracks in-flight requests awaiting a correlated response.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: Mutex<HashMap<CorrelationKey, PendingEntry>>,
    next_ticket: AtomicU64,
}

impl RequestCorrelator {
    /// Creates an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending request under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PendingExists`] if a request is already
    /// waiting on the same key; concurrent waits on one key are a caller
    /// error.
    pub fn begin(self: Arc<Self>, key: CorrelationKey) -> Result<PendingRequest, BrokerError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (completion, rx) = oneshot::channel();
        {
            let mut table = self.table();
            if table.contains_key(&key) {
                return Err(BrokerError::PendingExists(key));
            }
            table.insert(key.clone(), PendingEntry { ticket, completion });
        }
        tracing::trace!(%key, ticket, "pending request registered");
        Ok(PendingRequest {
            key,
            ticket,
            rx,
            correlator: self,
            armed: true,
        })
    }

    /// Offers a response command to whatever request is waiting on its key.
    ///
    /// Returns `true` if a waiter was resolved. A response without a
    /// target, or whose key matches no waiting entry (the caller already
    /// timed out or was cancelled, or never existed), is dropped: not an
    /// error, only a discarded message.
    pub fn resolve(&self, response: &Command) -> bool {
        let Some(key) = CorrelationKey::for_response(response) else {
            return false;
        };
        let entry = self.table().remove(&key);
        match entry {
            Some(PendingEntry { completion, .. }) => {
                // Send can only fail if the waiter was dropped between the
                // removal above and here; the response is then discarded
                // like any other unmatched one.
                let delivered = completion.send(response.clone()).is_ok();
                if delivered {
                    tracing::debug!(%key, "pending request resolved");
                }
                delivered
            }
            None => {
                tracing::trace!(%key, "response without pending request dropped");
                false
            }
        }
    }

    /// Returns the number of requests currently waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.table().len()
    }

    /// Removes the entry for `key` if it still belongs to `ticket`.
    fn take_if(&self, key: &CorrelationKey, ticket: u64) -> bool {
        let mut table = self.table();
        if table.get(key).is_some_and(|entry| entry.ticket == ticket) {
            table.remove(key);
            true
        } else {
            false
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<CorrelationKey, PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A single in-flight wait for a correlated response.
///
/// Consumed by [`PendingRequest::await_response`]. Dropping it without
/// awaiting (caller cancelled) deregisters the entry, after which a late
/// response is dropped by the resolve rule.
#[derive(Debug)]
pub struct PendingRequest {
    key: CorrelationKey,
    ticket: u64,
    rx: oneshot::Receiver<Command>,
    correlator: Arc<RequestCorrelator>,
    armed: bool,
}

impl PendingRequest {
    /// Returns the correlation key this request waits on.
    #[must_use]
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// Suspends until the correlated response arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Timeout`] if no matching response arrived in
    /// time; the pending entry is removed before returning so a later
    /// response is dropped.
    pub async fn await_response(mut self, timeout: Duration) -> Result<Command, BrokerError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(response)) => {
                self.armed = false;
                Ok(response)
            }
            Ok(Err(_closed)) => {
                self.armed = false;
                Err(BrokerError::Internal(
                    "pending request channel closed without a response".to_string(),
                ))
            }
            Err(_elapsed) => {
                let removed = self.correlator.take_if(&self.key, self.ticket);
                self.armed = false;
                if !removed {
                    // Resolution won the race at the deadline; the response
                    // is already in the channel.
                    if let Ok(response) = self.rx.try_recv() {
                        return Ok(response);
                    }
                }
                tracing::debug!(key = %self.key, "pending request timed out");
                Err(BrokerError::Timeout {
                    key: self.key.clone(),
                    waited_ms: timeout.as_millis(),
                })
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.armed && self.correlator.take_if(&self.key, self.ticket) {
            tracing::debug!(key = %self.key, "pending request cancelled");
        }
    }
}
