//! What an adapter needs to know about the widget it serves.

use serde_json::Value;

use crate::document::CodeBlock;

/// A document widget composed of one or more editors.
///
/// Implemented by the host editor. Every call reflects the widget's state
/// at the time of the call.
pub trait DocumentWidget: Send + Sync {
    /// Path of the document relative to the workspace root.
    fn path(&self) -> String;

    /// Host language of the document, e.g. `python` for a notebook.
    fn language(&self) -> String;

    /// Extension of the host document without the dot.
    fn file_extension(&self) -> String;

    /// Current content of every live editor, in document order.
    fn code_blocks(&self) -> Vec<CodeBlock>;
}

/// Notification a server addressed to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerMessage {
    pub server_id: String,
    pub method: String,
    pub params: Value,
}

/// Methods forwarded as [`ServerMessage`]s.
pub(crate) const USER_FACING_METHODS: [&str; 2] = ["window/showMessage", "window/logMessage"];
