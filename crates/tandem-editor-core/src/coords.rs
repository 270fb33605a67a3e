//! Offset <-> (line, column) conversion over text snapshots.
//!
//! Lines are delimited by `\n` only. Out-of-range positions and offsets clamp
//! to the end of the document instead of failing. Callers normalize CRLF with
//! [`normalize_line_endings`] before doing any offset math.

use std::borrow::Cow;

use crate::types::Position;

/// Convert a 1-indexed position into a char offset.
///
/// Walks the snapshot until `line - 1` newlines have been seen, then advances
/// `column - 1` chars. A column past the end of its line runs on into the
/// following lines; anything past the end of the snapshot clamps to its length.
pub fn to_offset(snapshot: &str, position: Position) -> usize {
    let line = position.line.max(1);
    let column = position.column.max(1);

    let mut offset = 0;
    let mut chars = snapshot.chars();
    let mut newlines_seen = 0;
    while newlines_seen < line - 1 {
        match chars.next() {
            Some('\n') => {
                newlines_seen += 1;
                offset += 1;
            }
            Some(_) => offset += 1,
            None => return offset,
        }
    }

    let remaining = chars.count();
    offset + (column - 1).min(remaining)
}

/// Convert a char offset into a 1-indexed position.
///
/// Offsets beyond the snapshot clamp to its end.
pub fn to_position(snapshot: &str, offset: usize) -> Position {
    let mut line = 1;
    let mut line_start = 0;
    let mut consumed = 0;
    for c in snapshot.chars().take(offset) {
        consumed += 1;
        if c == '\n' {
            line += 1;
            line_start = consumed;
        }
    }
    Position {
        line,
        column: consumed - line_start + 1,
    }
}

/// Replace every `\r\n` with `\n`. Lone `\r` is kept as an ordinary char.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains("\r\n") {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Memoized line starts for one snapshot.
///
/// Same clamping semantics as [`to_offset`] and [`to_position`], but each
/// lookup is a binary search instead of a walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineIndex {
    /// Char offset of the first char of each line. Always starts with 0.
    line_starts: Vec<usize>,
    len_chars: usize,
}

impl LineIndex {
    pub fn new(snapshot: &str) -> Self {
        let mut line_starts = vec![0];
        let mut len_chars = 0;
        for c in snapshot.chars() {
            len_chars += 1;
            if c == '\n' {
                line_starts.push(len_chars);
            }
        }
        Self {
            line_starts,
            len_chars,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn len_chars(&self) -> usize {
        self.len_chars
    }

    /// Char offset where `line` (1-indexed) begins, if the line exists.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line.checked_sub(1)?).copied()
    }

    pub fn to_offset(&self, position: Position) -> usize {
        let line = position.line.max(1);
        let column = position.column.max(1);
        match self.line_start(line) {
            Some(start) => (start + column - 1).min(self.len_chars),
            None => self.len_chars,
        }
    }

    pub fn to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len_chars);
        // Number of line starts <= offset; never zero since line_starts[0] == 0.
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        Position {
            line,
            column: offset - line_start + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_to_position_basic() {
        let text = "ab\ncd\n\nef";
        assert_eq!(to_position(text, 0), Position::new(1, 1));
        assert_eq!(to_position(text, 2), Position::new(1, 3));
        assert_eq!(to_position(text, 3), Position::new(2, 1));
        assert_eq!(to_position(text, 6), Position::new(3, 1));
        assert_eq!(to_position(text, 7), Position::new(4, 1));
        assert_eq!(to_position(text, 9), Position::new(4, 3));
    }

    #[test]
    fn test_to_offset_basic() {
        let text = "ab\ncd\n\nef";
        assert_eq!(to_offset(text, Position::new(1, 1)), 0);
        assert_eq!(to_offset(text, Position::new(2, 2)), 4);
        assert_eq!(to_offset(text, Position::new(3, 1)), 6);
        assert_eq!(to_offset(text, Position::new(4, 3)), 9);
    }

    #[test]
    fn test_out_of_range_clamps() {
        let text = "ab\ncd";
        assert_eq!(to_offset(text, Position::new(10, 1)), 5);
        assert_eq!(to_offset(text, Position::new(2, 40)), 5);
        assert_eq!(to_position(text, 99), Position::new(2, 3));
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(to_position("", 0), Position::start());
        assert_eq!(to_offset("", Position::new(3, 3)), 0);
        let index = LineIndex::new("");
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.to_position(5), Position::start());
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let text = "héllo\n日本";
        assert_eq!(to_position(text, 7), Position::new(2, 2));
        assert_eq!(to_offset(text, Position::new(2, 2)), 7);
    }

    #[test]
    fn test_carriage_return_is_not_a_line_break() {
        let text = "a\rb";
        assert_eq!(to_position(text, 2), Position::new(1, 3));
    }

    #[test]
    fn test_normalize_line_endings() {
        assert!(matches!(normalize_line_endings("a\nb"), Cow::Borrowed(_)));
        assert_eq!(normalize_line_endings("a\r\nb\r\n"), "a\nb\n");
        assert_eq!(normalize_line_endings("a\rb"), "a\rb");
    }

    #[test]
    fn test_line_index_line_start() {
        let index = LineIndex::new("one\ntwo\n");
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.line_start(1), Some(0));
        assert_eq!(index.line_start(2), Some(4));
        assert_eq!(index.line_start(3), Some(8));
        assert_eq!(index.line_start(4), None);
        assert_eq!(index.line_start(0), None);
    }

    proptest! {
        #[test]
        fn offset_position_round_trip(s in "[a-c\n日]{0,40}", raw in 0usize..64) {
            let len = s.chars().count();
            let offset = raw.min(len);
            prop_assert_eq!(to_offset(&s, to_position(&s, offset)), offset);
        }

        #[test]
        fn line_index_agrees_with_walkers(s in "[a-c\n]{0,40}", raw in 0usize..64, line in 1usize..10, column in 1usize..10) {
            let index = LineIndex::new(&s);
            prop_assert_eq!(index.to_position(raw), to_position(&s, raw));
            let len = s.chars().count();
            let offset = raw.min(len);
            prop_assert_eq!(index.to_offset(index.to_position(offset)), offset);
            let pos = Position::new(line, column);
            prop_assert_eq!(index.to_offset(pos), to_offset(&s, pos));
        }
    }
}
