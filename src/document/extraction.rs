//! Folding a block through the registered extractors.
//!
//! Each extractor sees the host remainder left by the previous one. A
//! [`SegmentMap`] follows the remainder through the fold, so foreign ranges
//! reported against an intermediate remainder can be mapped back onto the
//! block that was submitted.

use std::sync::Arc;

use super::CellType;
use crate::extractor::ForeignCodeExtractor;
use crate::position::{Editor, Position, Range, offset_at_position, position_at_offset};

/// A byte range of the remainder and where it came from in the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub start: usize,
    pub len: usize,
    /// Byte offset in the block, or `None` for text an extractor synthesized
    pub origin: Option<usize>,
}

impl Segment {
    fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SegmentMap {
    segments: Vec<Segment>,
}

impl SegmentMap {
    /// Map of a remainder that is the block itself.
    pub fn identity(len: usize) -> Self {
        Self {
            segments: vec![Segment {
                start: 0,
                len,
                origin: Some(0),
            }],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Block offset of a remainder offset.
    ///
    /// An offset right at the end of a segment resolves to the end of that
    /// segment's origin when no segment strictly contains it.
    pub fn origin_of(&self, offset: usize) -> Option<usize> {
        let mut ending_here = None;
        for segment in &self.segments {
            let Some(origin) = segment.origin else {
                continue;
            };
            if segment.start <= offset && offset < segment.end() {
                return Some(origin + (offset - segment.start));
            }
            if offset == segment.end() && ending_here.is_none() {
                ending_here = Some(origin + segment.len);
            }
        }
        ending_here
    }

    /// Segments covering `from..to`, rebased so that `from` becomes 0.
    fn slice(&self, from: usize, to: usize) -> Vec<Segment> {
        self.segments
            .iter()
            .filter_map(|segment| {
                let start = segment.start.max(from);
                let end = segment.end().min(to);
                (start < end).then(|| Segment {
                    start: start - from,
                    len: end - start,
                    origin: segment.origin.map(|origin| origin + (start - segment.start)),
                })
            })
            .collect()
    }

    /// Append `other` (rebased to 0) at remainder offset `at`.
    fn extend_at(&mut self, other: Vec<Segment>, at: usize) {
        self.segments
            .extend(other.into_iter().map(|segment| Segment {
                start: segment.start + at,
                ..segment
            }));
    }

    fn push_synthetic(&mut self, at: usize, len: usize) {
        self.segments.push(Segment {
            start: at,
            len,
            origin: None,
        });
    }

    /// Drop everything at or past `len`.
    fn truncate(&mut self, len: usize) {
        self.segments.retain(|segment| segment.start < len || segment.len == 0);
        for segment in &mut self.segments {
            if segment.end() > len {
                segment.len = len.saturating_sub(segment.start);
            }
        }
    }
}

/// Foreign code found in a block, with block coordinates.
#[derive(Debug, Clone)]
pub(crate) struct ForeignPiece {
    pub extractor: Arc<dyn ForeignCodeExtractor>,
    pub code: String,
    pub range: Range<Editor>,
    /// Where `code` begins in the block
    pub origin: Position<Editor>,
}

#[derive(Debug, Clone)]
pub(crate) struct Extraction {
    pub remainder: String,
    pub segments: SegmentMap,
    pub foreign: Vec<ForeignPiece>,
}

/// Run `extractors` over `text` in order, threading the host remainder.
///
/// Extractors targeting `own_language` are skipped, so a document never
/// extracts itself. A result carrying foreign code without a range breaks
/// the extractor contract: its foreign part is dropped with a warning and
/// its host code is kept.
pub(crate) fn extract(
    text: &str,
    cell_type: CellType,
    extractors: &[Arc<dyn ForeignCodeExtractor>],
    own_language: &str,
) -> Extraction {
    let block_lines: Vec<&str> = text.split('\n').collect();
    let mut remainder = text.to_string();
    let mut segments = SegmentMap::identity(text.len());
    let mut foreign = Vec::new();

    for extractor in extractors {
        if extractor.language() == own_language
            || !extractor.has_foreign_code(&remainder, cell_type)
        {
            continue;
        }

        let spans = extractor.extract_foreign_code(&remainder);
        let remainder_lines: Vec<&str> = remainder.split('\n').collect();
        let mut next = String::new();
        let mut next_segments = SegmentMap::default();
        let mut cursor = 0;

        for span in spans {
            if span.violates_contract() {
                log::warn!(
                    target: "polylsp::extractor",
                    "{} extractor returned foreign code without a range; skipping it",
                    extractor.language()
                );
            }

            if let Some(host) = span.host_code.as_deref().filter(|host| !host.is_empty()) {
                match remainder.get(cursor..).and_then(|rest| rest.find(host)) {
                    Some(found) => {
                        let at = cursor + found;
                        next_segments.extend_at(segments.slice(at, at + host.len()), next.len());
                        cursor = at + host.len();
                    }
                    None => next_segments.push_synthetic(next.len(), host.len()),
                }
                next.push_str(host);
            }

            let (Some(code), Some(range)) = (span.foreign_code, span.range) else {
                continue;
            };
            let start = offset_at_position(range.start, &remainder_lines, true);
            let end = offset_at_position(range.end, &remainder_lines, true);
            let shift = span
                .virtual_shift
                .map_or(start, |shift| offset_at_position(shift, &remainder_lines, true));
            cursor = cursor.max(end);

            let mapped = (
                segments.origin_of(start),
                segments.origin_of(end),
                segments.origin_of(shift),
            );
            let (Some(start), Some(end), Some(origin)) = mapped else {
                log::warn!(
                    target: "polylsp::extractor",
                    "{} code lies outside the submitted block; skipping it",
                    extractor.language()
                );
                continue;
            };
            foreign.push(ForeignPiece {
                extractor: Arc::clone(extractor),
                code,
                range: Range::new(
                    position_at_offset(start, &block_lines),
                    position_at_offset(end, &block_lines),
                ),
                origin: position_at_offset(origin, &block_lines),
            });
        }

        remainder = next;
        segments = next_segments;
    }

    // Removing a trailing foreign region leaves the newline that preceded it
    if !text.ends_with('\n') && remainder.ends_with('\n') {
        remainder.pop();
        segments.truncate(remainder.len());
    }

    Extraction {
        remainder,
        segments,
        foreign,
    }
}
