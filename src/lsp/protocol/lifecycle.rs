//! LSP lifecycle message builders.
//!
//! Provides builders for initialize, shutdown, and exit messages
//! used during connection lifecycle management.

use super::request_id::RequestId;

/// Build an LSP initialize request.
///
/// # Arguments
/// * `request_id` - The JSON-RPC request ID
/// * `root_uri` - Workspace root the documents are addressed against
/// * `capabilities` - Merged client capabilities of every registered feature
/// * `initialization_options` - Server-specific initialization options
pub fn build_initialize_request(
    request_id: RequestId,
    root_uri: &str,
    capabilities: serde_json::Value,
    initialization_options: Option<serde_json::Value>,
) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": request_id.as_i64(),
        "method": "initialize",
        "params": {
            "processId": std::process::id(),
            "rootUri": root_uri,
            "capabilities": capabilities,
            "initializationOptions": initialization_options,
            "trace": "off",
            "workspaceFolders": [{ "uri": root_uri, "name": "root" }]
        }
    })
}

/// Build an LSP initialized notification.
///
/// Sent after receiving the initialize response to signal
/// that the client is ready to receive requests.
pub fn build_initialized_notification() -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "initialized",
        "params": {}
    })
}

/// Build an LSP shutdown request.
pub fn build_shutdown_request(request_id: RequestId) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": request_id.as_i64(),
        "method": "shutdown",
        "params": null
    })
}

/// Build an LSP exit notification.
///
/// Sent after receiving the shutdown response to terminate the server.
pub fn build_exit_notification() -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "exit",
        "params": null
    })
}

/// Validates a JSON-RPC initialize response.
///
/// Uses lenient interpretation to maximize compatibility with non-conformant servers:
/// - Prioritizes error field if present and non-null
/// - Accepts result with null error field (`{"result": {...}, "error": null}`)
/// - Rejects null or missing result field
///
/// Returns the advertised server capabilities (an empty object when the
/// result carries none).
pub fn validate_initialize_response(
    response: &serde_json::Value,
) -> std::io::Result<serde_json::Value> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");

        return Err(std::io::Error::other(format!(
            "initialize failed (code {}): {}",
            code, message
        )));
    }

    let Some(result) = response.get("result").filter(|r| !r.is_null()) else {
        return Err(std::io::Error::other(
            "initialize response missing valid result",
        ));
    };

    Ok(result
        .get("capabilities")
        .filter(|c| c.is_object())
        .cloned()
        .unwrap_or_else(|| serde_json::json!({})))
}
