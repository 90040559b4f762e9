//! Transforms between coordinate spaces of a [`VirtualDocument`].
//!
//! Every transform is a pure lookup in the line tables of the last rebuild.
//! A position without a counterpart yields `None`: padding lines, text an
//! extractor moved into a child, or an editor that left the document.

use super::lines::{ForeignSpanRef, apply_run, find_run};
use super::{EditorId, VirtualDocument};
use crate::position::{Editor, Position, Root, Source, Virtual, is_within_range};

impl VirtualDocument {
    /// Editor holding a source position, and the position inside it.
    pub fn transform_source_to_editor(
        &self,
        position: Position<Source>,
    ) -> Option<(&EditorId, Position<Editor>)> {
        let line = self.source_lines.get(position.line as usize)?;
        let local = Position::new(line.block_line, position.column);
        Some((&line.editor, line.editor_shift.translate(local)))
    }

    /// Root position of a position inside `editor`.
    ///
    /// `None` when this is not a root document or when `editor` did not
    /// contribute to the last rebuild, which happens transiently while
    /// editors are added or removed.
    pub fn transform_editor_to_root(
        &self,
        editor: &EditorId,
        position: Position<Editor>,
    ) -> Option<Position<Root>> {
        if !self.is_root() {
            return None;
        }
        let block = self.editors.get(editor)?;
        if position.line >= block.line_count {
            return None;
        }
        Some(Position::new(
            block.first_source_line + position.line,
            position.column,
        ))
    }

    /// Source position of a root position; only a root document has one.
    pub fn transform_root_to_source(&self, position: Position<Root>) -> Option<Position<Source>> {
        (self.is_root() && (position.line as usize) < self.source_lines.len())
            .then(|| Position::new(position.line, position.column))
    }

    /// Where a source position of this document sits in its text.
    ///
    /// `None` for text moved into a child document, and for positions whose
    /// virtual counterpart would map back elsewhere.
    pub fn transform_source_to_virtual(
        &self,
        position: Position<Source>,
    ) -> Option<Position<Virtual>> {
        let line = self.source_lines.get(position.line as usize)?;
        let run = find_run(&line.runs, position.column)?;
        let virtual_position = apply_run(run, position.column);
        (self.transform_virtual_to_source(virtual_position) == Some(position))
            .then_some(virtual_position)
    }

    pub fn transform_virtual_to_source(
        &self,
        position: Position<Virtual>,
    ) -> Option<Position<Source>> {
        let line = self.virtual_lines.get(position.line as usize)?;
        let run = find_run(&line.runs, position.column)?;
        Some(apply_run(run, position.column))
    }

    /// Editor owning a virtual line; `None` for padding.
    pub fn editor_at_virtual_line(&self, line: u32) -> Option<&EditorId> {
        self.virtual_lines.get(line as usize)?.editor.as_ref()
    }

    /// Source line a virtual line came from; `None` for padding.
    pub fn source_line_of_virtual_line(&self, line: u32) -> Option<u32> {
        self.virtual_lines.get(line as usize)?.source_line()
    }

    fn foreign_span_at(
        &self,
        position: Position<Source>,
    ) -> Option<(&ForeignSpanRef, &VirtualDocument)> {
        let line = self.source_lines.get(position.line as usize)?;
        line.foreign.iter().find_map(|span| {
            if !is_within_range(position, span.range) {
                return None;
            }
            let child = self.children.get(&span.child_id)?;
            Some((span, &child.document))
        })
    }

    /// Whether a source position lies inside foreign code.
    pub fn is_within_foreign(&self, position: Position<Source>) -> bool {
        self.foreign_span_at(position).is_some()
    }

    /// Innermost document holding a source position.
    pub fn document_at_source_position(&self, position: Position<Source>) -> &VirtualDocument {
        match self.foreign_span_at(position) {
            Some((span, child)) => child.document_at_source_position(span.child_position(position)),
            None => self,
        }
    }

    /// Virtual position of a source position inside the document returned by
    /// [`VirtualDocument::document_at_source_position`].
    pub fn virtual_position_at_document(
        &self,
        position: Position<Source>,
    ) -> Option<Position<Virtual>> {
        match self.foreign_span_at(position) {
            Some((span, child)) => child.virtual_position_at_document(span.child_position(position)),
            None => self.transform_source_to_virtual(position),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use crate::document::{
        CodeBlock, DocumentOptions, EditorId, VirtualDocument, document_events, update_documents,
    };
    use crate::extractor::defaults::default_registry;
    use crate::position::{Editor, Position, Root, Source, Virtual};

    fn notebook(blocks: &[CodeBlock]) -> VirtualDocument {
        let (sender, _receiver) = document_events();
        let mut root = VirtualDocument::new(
            DocumentOptions {
                language: "python".to_string(),
                path: "nb.ipynb".to_string(),
                file_extension: "py".to_string(),
                registry: Arc::new(default_registry()),
            },
            sender,
        );
        update_documents(&mut root, blocks);
        root
    }

    fn two_cells() -> VirtualDocument {
        notebook(&[
            CodeBlock::code("cell-1", "x=1\n%%R\ny<-1"),
            CodeBlock::code("cell-2", "z=2"),
        ])
    }

    fn s(line: u32, column: u32) -> Position<Source> {
        Position::new(line, column)
    }

    fn v(line: u32, column: u32) -> Position<Virtual> {
        Position::new(line, column)
    }

    #[rstest]
    #[case(s(0, 0), Some(v(0, 0)))]
    #[case(s(0, 3), Some(v(0, 3)))]
    #[case(s(3, 1), Some(v(3, 1)))]
    #[case(s(1, 0), None)]
    #[case(s(2, 2), None)]
    #[case(s(9, 0), None)]
    fn source_to_virtual(#[case] source: Position<Source>, #[case] expected: Option<Position<Virtual>>) {
        assert_eq!(two_cells().transform_source_to_virtual(source), expected);
    }

    #[rstest]
    #[case(v(0, 2), Some(s(0, 2)))]
    #[case(v(1, 0), None)]
    #[case(v(2, 0), None)]
    #[case(v(3, 3), Some(s(3, 3)))]
    fn virtual_to_source(#[case] virtual_position: Position<Virtual>, #[case] expected: Option<Position<Source>>) {
        assert_eq!(two_cells().transform_virtual_to_source(virtual_position), expected);
    }

    #[test]
    fn padding_lines_have_no_editor() {
        let root = two_cells();
        assert_eq!(root.editor_at_virtual_line(0), Some(&EditorId::new("cell-1")));
        assert_eq!(root.editor_at_virtual_line(1), None);
        assert_eq!(root.source_line_of_virtual_line(2), None);
        assert_eq!(root.source_line_of_virtual_line(3), Some(3));
    }

    #[test]
    fn source_to_editor_resolves_cells() {
        let root = two_cells();
        let (editor, position) = root.transform_source_to_editor(s(3, 1)).expect("mapped");
        assert_eq!(editor.as_str(), "cell-2");
        assert_eq!(position, Position::<Editor>::new(0, 1));

        let (editor, position) = root.transform_source_to_editor(s(2, 1)).expect("mapped");
        assert_eq!(editor.as_str(), "cell-1");
        assert_eq!(position, Position::<Editor>::new(2, 1));
    }

    #[test]
    fn editor_to_root_requires_an_active_editor() {
        let root = two_cells();
        let cell_2 = EditorId::new("cell-2");
        assert_eq!(
            root.transform_editor_to_root(&cell_2, Position::new(0, 2)),
            Some(Position::<Root>::new(3, 2))
        );
        assert_eq!(root.transform_editor_to_root(&cell_2, Position::new(1, 0)), None);
        assert_eq!(
            root.transform_editor_to_root(&EditorId::new("gone"), Position::new(0, 0)),
            None
        );
    }

    #[test]
    fn root_to_source_is_the_identity_on_roots() {
        let root = two_cells();
        assert_eq!(root.transform_root_to_source(Position::new(3, 2)), Some(s(3, 2)));
        assert_eq!(root.transform_root_to_source(Position::new(4, 0)), None);
        let child = root.child("r").expect("r document");
        assert_eq!(child.transform_root_to_source(Position::new(0, 0)), None);
        assert_eq!(
            child.transform_editor_to_root(&EditorId::new("cell-1"), Position::new(2, 0)),
            None
        );
    }

    #[test]
    fn foreign_positions_resolve_to_the_child() {
        let root = two_cells();

        assert!(root.is_within_foreign(s(2, 1)));
        assert!(!root.is_within_foreign(s(1, 0)));
        assert!(!root.is_within_foreign(s(0, 1)));

        assert_eq!(root.document_at_source_position(s(2, 1)).language(), "r");
        assert_eq!(root.document_at_source_position(s(0, 1)).language(), "python");
        assert_eq!(root.virtual_position_at_document(s(2, 1)), Some(v(0, 1)));
        assert_eq!(root.virtual_position_at_document(s(3, 1)), Some(v(3, 1)));
    }

    #[test]
    fn child_source_maps_back_into_the_editor() {
        let root = two_cells();
        let child = root.child("r").expect("r document");
        let (editor, position) = child.transform_source_to_editor(s(0, 3)).expect("mapped");
        assert_eq!(editor.as_str(), "cell-1");
        assert_eq!(position, Position::<Editor>::new(2, 3));
    }

    #[test]
    fn line_magic_columns_map_into_the_child() {
        let root = notebook(&[CodeBlock::code("cell", "a = 1\n%R x <- a\nb = 2")]);
        let child_id = root.foreign_document_ids().pop().expect("standalone child");
        let child = root.child(&child_id).expect("child");

        assert_eq!(child.value(), "x <- a");
        // 'a' at column 8 of the magic line is column 5 of the R text
        assert_eq!(root.document_at_source_position(s(1, 8)).id_path(), child.id_path());
        assert_eq!(root.virtual_position_at_document(s(1, 8)), Some(v(0, 5)));
        let (_, editor_position) = child.transform_source_to_editor(s(0, 5)).expect("mapped");
        assert_eq!(editor_position, Position::<Editor>::new(1, 8));

        // Host lines around the magic keep their places
        assert_eq!(root.transform_source_to_virtual(s(2, 4)), Some(v(2, 4)));
        assert_eq!(root.value(), "a = 1\n\nb = 2");
    }

    #[test]
    fn unicode_columns_count_utf16_units() {
        let root = notebook(&[CodeBlock::code("cell", "s = '😀é'\n%R 'é'")]);
        assert_eq!(root.transform_source_to_virtual(s(0, 8)), Some(v(0, 8)));
        assert_eq!(root.transform_virtual_to_source(v(0, 9)), Some(s(0, 9)));
        assert_eq!(root.virtual_position_at_document(s(1, 4)), Some(v(0, 1)));
    }
}
