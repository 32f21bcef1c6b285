use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ptybroker_protocol::Reply;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::ClientError;

type Outcome = Result<Reply, ClientError>;

struct PendingEntry {
    kind: &'static str,
    created_at: Instant,
    tx: oneshot::Sender<Outcome>,
}

/// In-flight requests keyed by request id.
///
/// An entry leaves the map exactly once: on its reply, on its timeout
/// (through [`PendingRequest`]'s drop) or when the connection fails.
#[derive(Default)]
pub(crate) struct PendingRequests {
    next_id: AtomicU64,
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new request and return the guard that owns its entry.
    pub fn register(self: &Arc<Self>, kind: &'static str) -> PendingRequest {
        let id = format!("req-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            id.clone(),
            PendingEntry {
                kind,
                created_at: Instant::now(),
                tx,
            },
        );
        PendingRequest {
            id,
            kind,
            rx: Some(rx),
            pending: Arc::clone(self),
        }
    }

    /// Complete the request `request_id` with `reply`.
    ///
    /// Error replies reject the waiting caller. Returns `false` when no
    /// request is waiting, e.g. a late reply after a timeout.
    pub fn resolve(&self, request_id: &str, reply: Reply) -> bool {
        let Some(entry) = self.lock().remove(request_id) else {
            debug!(
                event = "client.correlator.reply_unmatched",
                request_id = request_id,
                reply = reply.kind(),
            );
            return false;
        };

        debug!(
            event = "client.correlator.reply_matched",
            request_id = request_id,
            kind = entry.kind,
            reply = reply.kind(),
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
        );
        let outcome = match reply {
            Reply::Error(message) => Err(ClientError::Daemon { message }),
            reply => Ok(reply),
        };
        // The caller may have been dropped in the meantime.
        let _ = entry.tx.send(outcome);
        true
    }

    /// Fail the request `request_id` with `error`. Returns `false` when no
    /// request is waiting.
    pub fn reject(&self, request_id: &str, error: ClientError) -> bool {
        let Some(entry) = self.lock().remove(request_id) else {
            debug!(
                event = "client.correlator.rejection_unmatched",
                request_id = request_id,
                error = %error,
            );
            return false;
        };
        warn!(
            event = "client.correlator.request_rejected",
            request_id = request_id,
            kind = entry.kind,
            error = %error,
        );
        let _ = entry.tx.send(Err(error));
        true
    }

    /// Reject every pending request with `error`. Returns how many were failed.
    pub fn fail_all(&self, error: ClientError) -> usize {
        let drained: Vec<(String, PendingEntry)> = self.lock().drain().collect();
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(error.clone()));
        }
        if count > 0 {
            warn!(
                event = "client.correlator.pending_failed",
                count = count,
                error = %error,
            );
        }
        count
    }

    fn remove(&self, request_id: &str) -> bool {
        self.lock().remove(request_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Owns one map entry. Dropping it (after a reply, a timeout or a cancelled
/// caller) removes whatever is left of the entry.
pub(crate) struct PendingRequest {
    id: String,
    kind: &'static str,
    rx: Option<oneshot::Receiver<Outcome>>,
    pending: Arc<PendingRequests>,
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply, failing with `RequestTimeout` after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Reply, ClientError> {
        let Some(rx) = self.rx.take() else {
            return Err(ClientError::ConnectionClosed);
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without an answer.
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.pending.remove(&self.id);
                warn!(
                    event = "client.correlator.request_timed_out",
                    request_id = %self.id,
                    kind = self.kind,
                    timeout_ms = timeout.as_millis() as u64,
                );
                Err(ClientError::RequestTimeout {
                    request_id: self.id.clone(),
                    kind: self.kind,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
