//! Row-start table mapping `(line, column)` pairs to byte offsets and back.
//!
//! `\n`, `\r\n` and a lone `\r` each end a line; a `\r\n` pair counts once.
//! Columns count characters, so for non-ASCII text the column part of a
//! lookup walks the row's characters. ASCII-only text takes the arithmetic
//! path.

use crate::ast::Position;

#[derive(Debug, Clone)]
pub struct PositionIndex {
    row_starts: Vec<usize>,
    ascii: bool,
    len: usize,
}

impl PositionIndex {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut row_starts = vec![0];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => row_starts.push(i + 1),
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        i += 1;
                    }
                    row_starts.push(i + 1);
                }
                _ => {}
            }
            i += 1;
        }
        Self {
            row_starts,
            ascii: text.is_ascii(),
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.row_starts.len()
    }

    /// Byte offset of `pos` in `text`. One past the last character is a valid
    /// answer (exclusive ends point there); anything further is `None`.
    ///
    /// `text` must be the string the index was built from.
    pub fn offset(&self, text: &str, pos: Position) -> Option<usize> {
        if pos.line == 0 || pos.column == 0 {
            return None;
        }
        let row_start = *self.row_starts.get(pos.line - 1)?;
        let skip = pos.column - 1;
        if self.ascii {
            let offset = row_start + skip;
            return (offset <= self.len).then_some(offset);
        }
        let rest = text.get(row_start..)?;
        let mut chars = rest.char_indices();
        match chars.nth(skip) {
            Some((i, _)) => Some(row_start + i),
            None if rest.chars().count() == skip => Some(self.len),
            None => None,
        }
    }

    /// The inverse of [`PositionIndex::offset`].
    pub fn position_of(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let row = self.row_starts.partition_point(|&start| start <= offset) - 1;
        let row_start = self.row_starts[row];
        let column = if self.ascii {
            offset - row_start
        } else {
            text.get(row_start..offset)
                .map_or(offset - row_start, |s| s.chars().count())
        };
        Position::new(row + 1, column + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_is_one_line_break() {
        let text = "ab\r\ncd\nef\rg";
        let index = PositionIndex::new(text);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.offset(text, Position::new(2, 1)), Some(4));
        assert_eq!(index.offset(text, Position::new(3, 2)), Some(8));
        assert_eq!(index.offset(text, Position::new(4, 1)), Some(10));
    }

    #[test]
    fn one_past_end_is_valid_but_further_is_not() {
        let text = "abc";
        let index = PositionIndex::new(text);
        assert_eq!(index.offset(text, Position::new(1, 4)), Some(3));
        assert_eq!(index.offset(text, Position::new(1, 5)), None);
        assert_eq!(index.offset(text, Position::new(2, 1)), None);
        assert_eq!(index.offset(text, Position::new(0, 1)), None);
    }

    #[test]
    fn columns_count_characters() {
        let text = "ő${x}\nű";
        let index = PositionIndex::new(text);
        assert_eq!(index.offset(text, Position::new(1, 2)), Some(2));
        assert_eq!(index.offset(text, Position::new(2, 2)), Some(text.len()));
        assert_eq!(index.position_of(text, 2), Position::new(1, 2));
        assert_eq!(index.position_of(text, 7), Position::new(2, 1));
    }

    #[test]
    fn position_of_round_trips() {
        let text = "x\r\n  ${a}\n";
        let index = PositionIndex::new(text);
        for offset in [0, 3, 5, 8] {
            let pos = index.position_of(text, offset);
            assert_eq!(index.offset(text, pos), Some(offset));
        }
    }
}
