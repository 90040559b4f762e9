//! Foreign code extraction.
//!
//! An extractor scans one code block and splits it into host code that
//! stays in the parent document and foreign spans that move into a child
//! document of another language. Extractors are pluggable and registered
//! per host language in an [`ExtractorRegistry`].

pub mod defaults;
mod identity;
mod pattern;
mod registry;

pub use identity::IdentityExtractor;
pub use pattern::{PatternExtractor, PatternExtractorOptions};
pub use registry::{ANY_HOST_LANGUAGE, ExtractorRegistry};

use std::fmt;

use crate::document::CellType;
use crate::position::{Editor, Position, Range};

/// One result of [`ForeignCodeExtractor::extract_foreign_code`].
///
/// Results come in block order. `host_code` is the host text that precedes
/// the foreign span (or trails the last one); it is appended to the host
/// remainder verbatim. A result with `range: None` carries host code only
/// and must have `foreign_code: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSpan {
    /// Code moved into the foreign document
    pub foreign_code: Option<String>,
    /// Where the foreign code sits in the scanned block
    pub range: Option<Range<Editor>>,
    /// Where the foreign document's text begins in the scanned block;
    /// defaults to `range.start`
    pub virtual_shift: Option<Position<Editor>>,
    /// Host code kept in the parent document
    pub host_code: Option<String>,
}

impl ExtractedSpan {
    /// A leftover host fragment with no foreign counterpart.
    pub fn host_only(host_code: impl Into<String>) -> Self {
        Self {
            foreign_code: None,
            range: None,
            virtual_shift: None,
            host_code: Some(host_code.into()),
        }
    }

    /// Returns true when foreign code is reported without a range.
    pub fn violates_contract(&self) -> bool {
        self.range.is_none() && self.foreign_code.is_some()
    }
}

/// Rule that recognizes one embedded language inside host code.
pub trait ForeignCodeExtractor: Send + Sync + fmt::Debug {
    /// Language of the extracted code.
    fn language(&self) -> &str;

    /// Whether each occurrence gets its own isolated document.
    fn is_standalone(&self) -> bool;

    /// Extension appended to the virtual document's URI.
    fn file_extension(&self) -> &str;

    /// Cell types the extractor applies to.
    fn cell_types(&self) -> &[CellType];

    fn has_foreign_code(&self, code: &str, cell_type: CellType) -> bool;

    fn extract_foreign_code(&self, code: &str) -> Vec<ExtractedSpan>;
}
