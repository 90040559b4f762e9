use regex::Regex;

use crate::document::CellType;
use crate::position::{Editor, Position, Range, position_at_offset};

use super::{ExtractedSpan, ForeignCodeExtractor};

/// Settings for a [`PatternExtractor`].
#[derive(Debug, Clone)]
pub struct PatternExtractorOptions {
    pub language: String,
    /// Regular expression matching one foreign occurrence
    pub pattern: String,
    /// Capture groups whose text forms the foreign code, in order
    pub foreign_capture_groups: Vec<usize>,
    pub is_standalone: bool,
    pub file_extension: String,
    pub cell_types: Vec<CellType>,
    /// Leave the matched text in the host as well
    pub keep_in_host: bool,
}

/// Extractor driven by a regular expression.
///
/// Every match becomes one foreign span; the text between matches stays in
/// the host. The foreign range covers the first through the last capture
/// group listed in `foreign_capture_groups`.
#[derive(Debug)]
pub struct PatternExtractor {
    options: PatternExtractorOptions,
    regex: Regex,
}

impl PatternExtractor {
    pub fn new(options: PatternExtractorOptions) -> Result<Self, regex::Error> {
        let regex = Regex::new(&options.pattern)?;
        Ok(Self { options, regex })
    }
}

impl ForeignCodeExtractor for PatternExtractor {
    fn language(&self) -> &str {
        &self.options.language
    }

    fn is_standalone(&self) -> bool {
        self.options.is_standalone
    }

    fn file_extension(&self) -> &str {
        &self.options.file_extension
    }

    fn cell_types(&self) -> &[CellType] {
        &self.options.cell_types
    }

    fn has_foreign_code(&self, code: &str, cell_type: CellType) -> bool {
        self.options.cell_types.contains(&cell_type) && self.regex.is_match(code)
    }

    fn extract_foreign_code(&self, code: &str) -> Vec<ExtractedSpan> {
        let lines: Vec<&str> = code.split('\n').collect();
        let mut spans = Vec::new();
        let mut searched_from = 0;

        for captures in self.regex.captures_iter(code) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let groups: Vec<_> = self
                .options
                .foreign_capture_groups
                .iter()
                .filter_map(|&index| captures.get(index))
                .collect();
            let (Some(first), Some(last)) = (groups.first(), groups.last()) else {
                // The foreign groups did not participate in this match
                continue;
            };

            let foreign_code: String = groups.iter().map(|m| m.as_str()).collect();
            let start: Position<Editor> = position_at_offset(first.start(), &lines);
            let end: Position<Editor> = position_at_offset(last.end(), &lines);

            let mut host_code = code[searched_from..whole.start()].to_string();
            if self.options.keep_in_host {
                host_code.push_str(whole.as_str());
            }

            spans.push(ExtractedSpan {
                foreign_code: Some(foreign_code),
                range: Some(Range::new(start, end)),
                virtual_shift: Some(start),
                host_code: Some(host_code),
            });
            searched_from = whole.end();
        }

        if searched_from < code.len() || spans.is_empty() {
            spans.push(ExtractedSpan::host_only(&code[searched_from..]));
        }
        spans
    }
}
