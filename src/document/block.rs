//! Code blocks submitted by editors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque handle of one editor widget (one notebook cell, or a whole buffer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditorId(String);

impl EditorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classifier attached to each code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

impl CellType {
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
        }
    }
}

impl FromStr for CellType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "code" => Ok(CellType::Code),
            "markdown" => Ok(CellType::Markdown),
            "raw" => Ok(CellType::Raw),
            other => Err(format!("unknown cell type: {other}")),
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous unit of host text from one editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub editor: EditorId,
    pub text: String,
    pub cell_type: CellType,
}

impl CodeBlock {
    pub fn new(editor: EditorId, text: impl Into<String>, cell_type: CellType) -> Self {
        Self {
            editor,
            text: text.into(),
            cell_type,
        }
    }

    /// Shorthand for a code cell.
    pub fn code(editor: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(EditorId::new(editor), text, CellType::Code)
    }
}
