//! Response routing for pending requests.
//!
//! Before sending a request, register it via `register(id)` to get a oneshot
//! receiver. The reader task calls `route(response)` when a response arrives
//! and the requester awaits the receiver without holding any lock.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::LockResultExt;
use crate::lsp::protocol::RequestId;

/// JSON-RPC InternalError, used to fail requests that will never be answered.
const INTERNAL_ERROR: i64 = -32603;

/// Routes responses to pending requests via oneshot channels.
#[derive(Debug, Default)]
pub(crate) struct ResponseRouter {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<serde_json::Value>>>,
}

impl ResponseRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a pending request and return a receiver for the response.
    ///
    /// Returns `None` if a request with this ID is already pending.
    pub(crate) fn register(&self, id: RequestId) -> Option<oneshot::Receiver<serde_json::Value>> {
        let mut pending = self.pending.lock().recover_poison("ResponseRouter::register");
        if pending.contains_key(&id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Some(rx)
    }

    /// Route a response to its pending request.
    ///
    /// Returns `true` if the response was delivered, `false` for unknown ids
    /// and for messages without a numeric id.
    pub(crate) fn route(&self, response: serde_json::Value) -> bool {
        let Some(id) = RequestId::from_json(&response) else {
            return false;
        };
        let sender = self
            .pending
            .lock()
            .recover_poison("ResponseRouter::route")
            .remove(&id);
        match sender {
            Some(sender) => sender.send(response).is_ok(),
            None => false,
        }
    }

    /// Remove a pending request without sending a response.
    pub(crate) fn remove(&self, id: RequestId) -> bool {
        self.pending
            .lock()
            .recover_poison("ResponseRouter::remove")
            .remove(&id)
            .is_some()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .recover_poison("ResponseRouter::pending_count")
            .len()
    }

    /// Fail all pending requests with an internal error response.
    ///
    /// Called when the connection closes so every waiter gets an answer.
    pub(crate) fn fail_all(&self, error_message: &str) {
        let entries: Vec<_> = self
            .pending
            .lock()
            .recover_poison("ResponseRouter::fail_all")
            .drain()
            .collect();

        for (id, tx) in entries {
            let error_response = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id.as_i64(),
                "error": {
                    "code": INTERNAL_ERROR,
                    "message": error_message
                }
            });
            let _ = tx.send(error_response);
        }
    }
}
