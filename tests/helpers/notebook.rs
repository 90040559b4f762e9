//! In-memory document widget standing in for an editor notebook.

use std::sync::{Arc, Mutex};

use polylsp::document::CodeBlock;
use polylsp::DocumentWidget;

pub struct Notebook {
    path: Mutex<String>,
    cells: Mutex<Vec<CodeBlock>>,
}

impl Notebook {
    pub fn new(path: &str, cells: &[(&str, &str)]) -> Arc<Self> {
        let notebook = Arc::new(Self {
            path: Mutex::new(path.to_string()),
            cells: Mutex::new(Vec::new()),
        });
        notebook.set_cells(cells);
        notebook
    }

    /// Replace every cell, as `(editor id, text)` pairs.
    pub fn set_cells(&self, cells: &[(&str, &str)]) {
        *self.cells.lock().unwrap() = cells
            .iter()
            .map(|(editor, text)| CodeBlock::code(*editor, *text))
            .collect();
    }
}

impl DocumentWidget for Notebook {
    fn path(&self) -> String {
        self.path.lock().unwrap().clone()
    }

    fn language(&self) -> String {
        "python".to_string()
    }

    fn file_extension(&self) -> String {
        "py".to_string()
    }

    fn code_blocks(&self) -> Vec<CodeBlock> {
        self.cells.lock().unwrap().clone()
    }
}
