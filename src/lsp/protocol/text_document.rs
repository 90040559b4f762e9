//! textDocument/* and workspace notification builders.

use serde_json::Value;
use tower_lsp_server::ls_types::TextDocumentContentChangeEvent;

pub fn build_did_open_notification(
    uri: &str,
    language_id: &str,
    version: i32,
    text: &str,
) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didOpen",
        "params": {
            "textDocument": {
                "uri": uri,
                "languageId": language_id,
                "version": version,
                "text": text
            }
        }
    })
}

/// Build a textDocument/didChange notification.
///
/// A full-text change is a single event carrying only `text`.
pub fn build_did_change_notification(
    uri: &str,
    version: i32,
    changes: &[TextDocumentContentChangeEvent],
) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didChange",
        "params": {
            "textDocument": {
                "uri": uri,
                "version": version
            },
            "contentChanges": changes
        }
    })
}

pub fn build_did_save_notification(uri: &str, text: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didSave",
        "params": {
            "textDocument": { "uri": uri },
            "text": text
        }
    })
}

pub fn build_did_close_notification(uri: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didClose",
        "params": {
            "textDocument": { "uri": uri }
        }
    })
}

pub fn build_did_change_configuration(settings: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "workspace/didChangeConfiguration",
        "params": { "settings": settings }
    })
}
