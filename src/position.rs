//! Tagged positions and the pure parts of the coordinate algebra.
//!
//! Every position belongs to exactly one coordinate space:
//!
//! - [`Source`]: a line in the text a virtual document was fed with
//! - [`Editor`]: a line inside one physical editor (one notebook cell)
//! - [`Root`]: a source position of the top-level document, which spans
//!   every editor of a notebook
//! - [`Virtual`]: a line inside the synthesized text sent to a server
//!
//! The tag is a zero-sized type parameter, so a `Position<Editor>` cannot be
//! passed where a `Position<Virtual>` is expected. Moving between spaces
//! goes through the named transforms on [`crate::VirtualDocument`].
//!
//! Lines are zero-based. Columns count UTF-16 code units, as the Language
//! Server Protocol does. Offsets are byte offsets into Rust strings.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait implemented by the four coordinate spaces.
pub trait Space: sealed::Sealed + Copy + Eq + Hash + fmt::Debug + 'static {
    const NAME: &'static str;
}

macro_rules! coordinate_space {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl Space for $name {
            const NAME: &'static str = stringify!($name);
        }
    };
}

coordinate_space!(
    /// Text a virtual document received, numbered by its own running line counter.
    Source
);
coordinate_space!(
    /// Inside one editor widget.
    Editor
);
coordinate_space!(
    /// Source space of the top-level document.
    Root
);
coordinate_space!(
    /// Inside a virtual document's synthesized text.
    Virtual
);

/// A (line, column) pair tagged with its coordinate space.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position<S: Space> {
    pub line: u32,
    pub column: u32,
    space: PhantomData<S>,
}

impl<S: Space> Position<S> {
    pub const fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            space: PhantomData,
        }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Position of `local` when its origin (0, 0) sits at `self`.
    ///
    /// Only the first line of `local` is shifted horizontally.
    pub fn translate(self, local: Position<S>) -> Position<S> {
        let column = if local.line == 0 {
            self.column + local.column
        } else {
            local.column
        };
        Position::new(self.line + local.line, column)
    }

    /// Inverse of [`Position::translate`]. `None` if `absolute` lies before `self`.
    pub fn localize(self, absolute: Position<S>) -> Option<Position<S>> {
        if absolute < self {
            return None;
        }
        let line = absolute.line - self.line;
        let column = if line == 0 {
            absolute.column - self.column
        } else {
            absolute.column
        };
        Some(Position::new(line, column))
    }
}

impl<S: Space> Default for Position<S> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<S: Space> PartialOrd for Position<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Space> Ord for Position<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.line, self.column).cmp(&(other.line, other.column))
    }
}

impl<S: Space> fmt::Debug for Position<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{})", S::NAME, self.line, self.column)
    }
}

impl Position<Virtual> {
    /// Wire representation sent to a language server.
    pub fn to_lsp(self) -> tower_lsp_server::ls_types::Position {
        tower_lsp_server::ls_types::Position {
            line: self.line,
            character: self.column,
        }
    }

    pub fn from_lsp(position: tower_lsp_server::ls_types::Position) -> Self {
        Self::new(position.line, position.character)
    }
}

/// A range with both ends in the same coordinate space.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range<S: Space> {
    pub start: Position<S>,
    pub end: Position<S>,
}

impl<S: Space> Range<S> {
    pub fn new(start: Position<S>, end: Position<S>) -> Self {
        Self { start, end }
    }
}

impl<S: Space> fmt::Debug for Range<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

/// Check whether `position` falls inside `range`.
///
/// A single-line range contains columns `start..=end` of that line. A range
/// spanning lines contains everything from `start` through `end`, including
/// both boundary positions.
pub fn is_within_range<S: Space>(position: Position<S>, range: Range<S>) -> bool {
    if range.start.line == range.end.line {
        return position.line == range.start.line
            && position.column >= range.start.column
            && position.column <= range.end.column;
    }

    let after_start = position.line > range.start.line
        || (position.line == range.start.line && position.column >= range.start.column);
    let before_end = position.line < range.end.line
        || (position.line == range.end.line && position.column <= range.end.column);
    after_start && before_end
}

/// Convert a byte offset into a position over `lines` (text split on `'\n'`).
///
/// Offsets past the end clamp to the end of the last line. Offsets inside a
/// multi-byte character snap back to its start.
pub fn position_at_offset<S: Space>(offset: usize, lines: &[&str]) -> Position<S> {
    let mut remaining = offset;
    for (index, line) in lines.iter().enumerate() {
        if remaining <= line.len() {
            return Position::new(index as u32, byte_to_utf16(line, remaining));
        }
        remaining -= line.len() + 1;
    }

    match lines.last() {
        Some(last) => Position::new(
            (lines.len() - 1) as u32,
            byte_to_utf16(last, last.len()),
        ),
        None => Position::zero(),
    }
}

/// Convert a position over `lines` into a byte offset.
///
/// With `includes_breaks` every preceding line contributes its `'\n'` too.
/// Lines past the end clamp to the total length; columns past the end of a
/// line clamp to that line's end.
pub fn offset_at_position<S: Space>(
    position: Position<S>,
    lines: &[&str],
    includes_breaks: bool,
) -> usize {
    let break_len = usize::from(includes_breaks);
    let mut offset = 0;
    for (index, line) in lines.iter().enumerate() {
        if index as u32 == position.line {
            return offset + utf16_to_byte(line, position.column);
        }
        offset += line.len() + break_len;
    }
    offset.saturating_sub(break_len)
}

/// Byte offset of a UTF-16 column within one line, clamped to the line end.
pub fn utf16_to_byte(line: &str, column: u32) -> usize {
    let mut utf16 = 0u32;
    for (byte, ch) in line.char_indices() {
        if utf16 >= column {
            return byte;
        }
        utf16 += ch.len_utf16() as u32;
    }
    line.len()
}

/// UTF-16 column of a byte offset within one line.
pub fn byte_to_utf16(line: &str, byte: usize) -> u32 {
    let mut utf16 = 0u32;
    for (index, ch) in line.char_indices() {
        if index + ch.len_utf8() > byte {
            break;
        }
        utf16 += ch.len_utf16() as u32;
    }
    utf16
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn p<S: Space>(line: u32, column: u32) -> Position<S> {
        Position::new(line, column)
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(3, 0, 3)]
    #[case(4, 1, 0)]
    #[case(6, 1, 2)]
    #[case(7, 2, 0)]
    #[case(100, 2, 3)]
    fn position_at_offset_walks_lines(#[case] offset: usize, #[case] line: u32, #[case] column: u32) {
        let lines = ["x=1", "ab", "z=2"];
        assert_eq!(position_at_offset::<Source>(offset, &lines), p(line, column));
    }

    #[test]
    fn position_at_offset_counts_utf16_columns() {
        // 'é' is two bytes but one UTF-16 unit; '😀' is four bytes, two units
        let lines = ["é😀x"];
        assert_eq!(position_at_offset::<Editor>(2, &lines), p(0, 1));
        assert_eq!(position_at_offset::<Editor>(6, &lines), p(0, 3));
        assert_eq!(position_at_offset::<Editor>(4, &lines), p(0, 1));
    }

    #[test]
    fn offset_at_position_inverts_position_at_offset() {
        let text = "fn main() {\n    let é = 1;\n}";
        let lines: Vec<&str> = text.split('\n').collect();
        for (offset, _) in text.char_indices() {
            let position = position_at_offset::<Source>(offset, &lines);
            assert_eq!(offset_at_position(position, &lines, true), offset);
        }
    }

    #[test]
    fn offset_at_position_without_breaks() {
        let lines = ["ab", "cd"];
        assert_eq!(offset_at_position(p::<Source>(1, 1), &lines, false), 3);
        assert_eq!(offset_at_position(p::<Source>(1, 1), &lines, true), 4);
    }

    #[test]
    fn offset_at_position_clamps_past_end() {
        let lines = ["ab", "cd"];
        assert_eq!(offset_at_position(p::<Source>(9, 0), &lines, true), 5);
        assert_eq!(offset_at_position(p::<Source>(0, 40), &lines, true), 2);
    }

    #[rstest]
    #[case(p(1, 2), true)]
    #[case(p(1, 5), true)]
    #[case(p(1, 6), false)]
    #[case(p(1, 1), false)]
    #[case(p(2, 3), false)]
    fn single_line_range_is_inclusive(#[case] position: Position<Editor>, #[case] inside: bool) {
        let range = Range::new(p(1, 2), p(1, 5));
        assert_eq!(is_within_range(position, range), inside);
    }

    #[rstest]
    #[case(p(1, 4), true)]
    #[case(p(1, 3), false)]
    #[case(p(2, 0), true)]
    #[case(p(2, 99), true)]
    #[case(p(3, 1), true)]
    #[case(p(3, 2), false)]
    #[case(p(0, 10), false)]
    fn multi_line_range_boundaries(#[case] position: Position<Editor>, #[case] inside: bool) {
        let range = Range::new(p(1, 4), p(3, 1));
        assert_eq!(is_within_range(position, range), inside);
    }

    #[test]
    fn translate_and_localize_are_inverse() {
        let origin: Position<Editor> = p(3, 7);
        for local in [p(0, 0), p(0, 4), p(2, 1)] {
            let absolute = origin.translate(local);
            assert_eq!(origin.localize(absolute), Some(local));
        }
        assert_eq!(origin.translate(p(0, 4)), p(3, 11));
        assert_eq!(origin.translate(p(2, 1)), p(5, 1));
        assert_eq!(origin.localize(p(2, 0)), None);
    }

    #[test]
    fn debug_output_names_the_space() {
        assert_eq!(format!("{:?}", p::<Virtual>(1, 2)), "Virtual(1:2)");
    }
}
