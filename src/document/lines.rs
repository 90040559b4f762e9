//! Per-document line tables.
//!
//! A document keeps one [`SourceLine`] per line it was fed and one
//! [`VirtualLine`] per line of its synthesized text. Column runs tie a piece
//! of a source line to the piece of a virtual line holding the same
//! characters, so mapping stays exact when an extractor removes text from
//! the middle of a line.

use super::EditorId;
use crate::position::{Editor, Position, Range, Source, Space, Virtual};

/// Characters shared verbatim between a source line and a virtual line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ColumnRun<To> {
    pub start: u32,
    pub len: u32,
    pub target: To,
}

impl<To> ColumnRun<To> {
    pub fn new(start: u32, len: u32, target: To) -> Self {
        Self { start, len, target }
    }

    fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// Run on a source line pointing into virtual space.
pub(crate) type SourceRun = ColumnRun<Position<Virtual>>;
/// Run on a virtual line pointing into source space.
pub(crate) type VirtualRun = ColumnRun<Position<Source>>;

/// Find the run holding `column`.
///
/// A run strictly containing the column wins; otherwise a run ending right
/// at the column does, so end-of-line positions still resolve.
pub(crate) fn find_run<To>(runs: &[ColumnRun<To>], column: u32) -> Option<&ColumnRun<To>> {
    runs.iter()
        .find(|run| run.start <= column && column < run.end())
        .or_else(|| runs.iter().find(|run| run.end() == column))
}

/// Map `column` through `run`, landing on the same line as its target.
pub(crate) fn apply_run<S: Space>(run: &ColumnRun<Position<S>>, column: u32) -> Position<S> {
    Position::new(run.target.line, run.target.column + (column - run.start))
}

/// A foreign span recorded on every source line it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ForeignSpanRef {
    pub range: Range<Source>,
    /// Where the child's text begins
    pub origin: Position<Source>,
    pub child_id: String,
    /// First source line of the block the span became in the child
    pub child_source_line: u32,
}

impl ForeignSpanRef {
    /// The child's source position for `position` in this document.
    pub fn child_position(&self, position: Position<Source>) -> Position<Source> {
        let local = self.origin.localize(position).unwrap_or_default();
        Position::new(self.child_source_line, 0).translate(local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceLine {
    pub editor: EditorId,
    /// Line within the appended block
    pub block_line: u32,
    /// Editor position of the block's first character
    pub editor_shift: Position<Editor>,
    pub runs: Vec<SourceRun>,
    pub foreign: Vec<ForeignSpanRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VirtualLine {
    /// `None` for padding between blocks and for synthesized host text
    pub editor: Option<EditorId>,
    pub runs: Vec<VirtualRun>,
}

impl VirtualLine {
    pub fn padding() -> Self {
        Self {
            editor: None,
            runs: Vec::new(),
        }
    }

    pub fn source_line(&self) -> Option<u32> {
        self.runs.first().map(|run| run.target.line)
    }
}

/// Lines of one editor inside a document's source space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EditorBlock {
    pub first_source_line: u32,
    pub line_count: u32,
}
