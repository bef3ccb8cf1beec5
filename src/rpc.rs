//! Request/response correlation over the shared connection.
//!
//! Each outbound request registers a pending entry keyed by its identifier.
//! The first inbound envelope carrying that identifier (as `id` or
//! `request_id`) completes it; a timeout or cancellation completes it with an
//! error. Whichever happens first removes the entry, so later duplicates fall
//! through to normal message processing.

use crate::error::RpcError;
use crate::protocol::{value_text, Envelope};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where outbound frames go. Returns `false` when the frame was not sent.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: String) -> bool;
}

type ReplyTx = oneshot::Sender<Result<Value, RpcError>>;

struct PendingEntry {
    token: u64,
    reply: ReplyTx,
}

#[derive(Default)]
struct PendingTable {
    entries: Mutex<HashMap<String, PendingEntry>>,
    next_token: AtomicU64,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its entry when the awaiting future finishes or is dropped, unless
/// a newer registration has taken the id.
struct PendingGuard {
    table: Arc<PendingTable>,
    id: String,
    token: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut entries = self.table.lock();
        if entries.get(&self.id).is_some_and(|entry| entry.token == self.token) {
            entries.remove(&self.id);
        }
    }
}

pub struct RpcCorrelator<S> {
    sink: S,
    pending: Arc<PendingTable>,
}

impl<S: FrameSink> RpcCorrelator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pending: Arc::new(PendingTable::default()),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Send `kind` with `fields` under a fresh id and await the reply.
    pub fn request(
        &self,
        kind: &str,
        fields: Map<String, Value>,
        timeout: Duration,
    ) -> Result<impl Future<Output = Result<Value, RpcError>> + Send + 'static, RpcError> {
        let id = Uuid::new_v4().to_string();
        let envelope = fields
            .into_iter()
            .fold(Envelope::outbound(kind), |env, (key, value)| env.with_field(&key, value))
            .with_field("id", id.as_str());
        self.request_with_id(id, &envelope, timeout)
    }

    /// Send a prebuilt envelope whose reply is correlated by `id`.
    ///
    /// Registration and send happen before this returns; the returned future
    /// only waits. Fails with [`RpcError::NotConnected`], leaving nothing
    /// registered, when the sink refuses the frame. Registering an id that is
    /// already pending cancels the older entry.
    pub fn request_with_id(
        &self,
        id: String,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<impl Future<Output = Result<Value, RpcError>> + Send + 'static, RpcError> {
        let (tx, rx) = oneshot::channel();
        let token = self.pending.next_token.fetch_add(1, Ordering::Relaxed);
        let superseded = self
            .pending
            .lock()
            .insert(id.clone(), PendingEntry { token, reply: tx });
        let guard = PendingGuard {
            table: Arc::clone(&self.pending),
            id: id.clone(),
            token,
        };
        if !self.sink.send_frame(envelope.to_frame()) {
            debug!(id = %id, "rpc request not sent; transport is down");
            drop(guard);
            if let Some(old) = superseded {
                // Put the older waiter back; nothing replaced it on the wire.
                self.pending.lock().insert(id, old);
            }
            return Err(RpcError::NotConnected);
        }
        if let Some(old) = superseded {
            let _ = old.reply.send(Err(RpcError::Cancelled {
                id: id.clone(),
                reason: "superseded by a newer request".to_string(),
            }));
        }
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        Ok(async move {
            let _guard = guard;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(RpcError::Cancelled {
                    id,
                    reason: "correlator dropped".to_string(),
                }),
                Err(_) => {
                    warn!(id = %id, timeout_ms, "rpc request timed out");
                    Err(RpcError::Timeout { id, timeout_ms })
                }
            }
        })
    }

    /// Complete the pending entry this envelope answers.
    ///
    /// Returns `false` when nothing was waiting for it.
    pub fn resolve(&self, envelope: &Envelope) -> bool {
        let request_id = envelope.get("request_id").and_then(Value::as_str);
        let entry = {
            let mut entries = self.pending.lock();
            [envelope.id(), request_id]
                .into_iter()
                .flatten()
                .find_map(|id| entries.remove(id).map(|entry| (id.to_string(), entry)))
        };
        let Some((id, entry)) = entry else {
            return false;
        };
        let outcome = match envelope.get("error") {
            Some(error) if !error.is_null() => {
                let message = match error {
                    Value::Object(map) => map.get("message").map(value_text).unwrap_or_else(|| error.to_string()),
                    other => value_text(other),
                };
                Err(RpcError::Remote { id: id.clone(), message })
            }
            _ => Ok(envelope.to_value()),
        };
        debug!(id = %id, kind = envelope.kind(), "rpc reply correlated");
        // The waiter may have given up already; that's fine.
        let _ = entry.reply.send(outcome);
        true
    }

    /// Reject every pending entry with [`RpcError::Cancelled`].
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            let _ = entry.reply.send(Err(RpcError::Cancelled {
                id,
                reason: reason.to_string(),
            }));
        }
        if count > 0 {
            debug!(count, reason, "cancelled pending rpc requests");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }
}
