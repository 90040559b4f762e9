use crate::document::CellType;
use crate::position::{Editor, Position, Range, position_at_offset};

use super::{ExtractedSpan, ForeignCodeExtractor};

/// Treats the whole block as foreign code, leaving nothing in the host.
///
/// Used when an entire cell is already written in another language, such
/// as markdown cells of a Python notebook.
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    language: String,
    file_extension: String,
    cell_types: Vec<CellType>,
}

impl IdentityExtractor {
    pub fn new(
        language: impl Into<String>,
        file_extension: impl Into<String>,
        cell_types: Vec<CellType>,
    ) -> Self {
        Self {
            language: language.into(),
            file_extension: file_extension.into(),
            cell_types,
        }
    }
}

impl ForeignCodeExtractor for IdentityExtractor {
    fn language(&self) -> &str {
        &self.language
    }

    fn is_standalone(&self) -> bool {
        false
    }

    fn file_extension(&self) -> &str {
        &self.file_extension
    }

    fn cell_types(&self) -> &[CellType] {
        &self.cell_types
    }

    fn has_foreign_code(&self, _code: &str, cell_type: CellType) -> bool {
        self.cell_types.contains(&cell_type)
    }

    fn extract_foreign_code(&self, code: &str) -> Vec<ExtractedSpan> {
        let lines: Vec<&str> = code.split('\n').collect();
        let end: Position<Editor> = position_at_offset(code.len(), &lines);
        vec![ExtractedSpan {
            foreign_code: Some(code.to_string()),
            range: Some(Range::new(Position::zero(), end)),
            virtual_shift: Some(Position::zero()),
            host_code: Some(String::new()),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_the_whole_block() {
        let extractor = IdentityExtractor::new("markdown", "md", vec![CellType::Markdown]);
        let spans = extractor.extract_foreign_code("# Title\nsome *text*");

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].foreign_code.as_deref(), Some("# Title\nsome *text*"));
        assert_eq!(spans[0].host_code.as_deref(), Some(""));
        assert_eq!(
            spans[0].range,
            Some(Range::new(Position::new(0, 0), Position::new(1, 11)))
        );
    }

    #[test]
    fn applies_only_to_declared_cell_types() {
        let extractor = IdentityExtractor::new("markdown", "md", vec![CellType::Markdown]);
        assert!(extractor.has_foreign_code("anything", CellType::Markdown));
        assert!(!extractor.has_foreign_code("anything", CellType::Code));
    }
}
