//! Generic JSON-RPC envelopes and classification of incoming messages.

use serde_json::Value;

use super::request_id::RequestId;

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

pub fn build_request(request_id: RequestId, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": request_id.as_i64(),
        "method": method,
        "params": params
    })
}

pub fn build_notification(method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
}

/// Successful answer to a server-initiated request. `id` is echoed verbatim.
pub fn build_response(id: Value, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn build_error_response(id: Value, code: i64, message: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

/// A message received from a server.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests
    Response { id: Option<RequestId>, message: Value },
    /// Server-initiated request expecting an answer
    Request { id: Value, method: String, params: Value },
    Notification { method: String, params: Value },
    /// Neither of the above
    Invalid(Value),
}

impl Incoming {
    pub fn classify(message: Value) -> Self {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = message.get("id").filter(|id| !id.is_null()).cloned();

        match (method, id) {
            (Some(method), Some(id)) => Incoming::Request {
                id,
                method,
                params: message.get("params").cloned().unwrap_or(Value::Null),
            },
            (Some(method), None) => Incoming::Notification {
                method,
                params: message.get("params").cloned().unwrap_or(Value::Null),
            },
            (None, _) if message.get("result").is_some() || message.get("error").is_some() => {
                Incoming::Response {
                    id: RequestId::from_json(&message),
                    message,
                }
            }
            (None, _) => Incoming::Invalid(message),
        }
    }
}
