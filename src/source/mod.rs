//! The source document a conversion reads from: the original text, its tag
//! delimiters, and the position index built over it.
//!
//! Node spans in the parse tree are inclusive on both ends. Every slice taken
//! here is end-exclusive, so callers convert explicitly ("one past the last
//! consumed character") with [`Position::next_column`].

use miette::{NamedSource, SourceSpan};
use std::sync::Arc;

use crate::ast::{Position, TagSyntax};
use crate::errors::{to_source_span, ConvertError, ErrorKind, ErrorReporting};

pub mod position;
pub mod scanner;

pub use position::PositionIndex;
pub use scanner::{EndTag, ScanError, TagEnd};

#[derive(Debug, Clone)]
pub struct SourceDocument<'a> {
    name: &'a str,
    text: &'a str,
    tag_syntax: TagSyntax,
    index: PositionIndex,
}

impl<'a> SourceDocument<'a> {
    pub fn new(name: &'a str, text: &'a str, tag_syntax: TagSyntax) -> Self {
        Self {
            name,
            text,
            tag_syntax,
            index: PositionIndex::new(text),
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn tag_syntax(&self) -> TagSyntax {
        self.tag_syntax
    }

    pub fn open_char(&self) -> char {
        self.tag_syntax.open_char()
    }

    pub fn close_char(&self) -> char {
        self.tag_syntax.close_char()
    }

    /// Byte offset of `pos`. A position past the end of input means the tree
    /// and the text disagree, which is reported as an internal error.
    pub fn offset(&self, pos: Position) -> Result<usize, ConvertError> {
        self.index.offset(self.text, pos).ok_or_else(|| {
            ConvertError::new(ErrorKind::Internal {
                message: format!(
                    "Position {} is outside of the source ({} lines)",
                    pos,
                    self.index.line_count()
                ),
            })
            .at(None, pos)
        })
    }

    pub fn position_of(&self, offset: usize) -> Position {
        self.index.position_of(self.text, offset)
    }

    /// The text from `start` up to, but not including, `end_exclusive`.
    pub fn slice(&self, start: Position, end_exclusive: Position) -> Result<&'a str, ConvertError> {
        let from = self.offset(start)?;
        let to = self.offset(end_exclusive)?;
        self.slice_offsets(from, to)
    }

    pub fn slice_offsets(&self, from: usize, to: usize) -> Result<&'a str, ConvertError> {
        self.text.get(from..to).ok_or_else(|| {
            self.internal_error(
                format!("Invalid source range {}..{}", from, to),
                to_source_span(from.min(self.len()), to.min(self.len())),
            )
        })
    }

    /// Position of the last character before `end_exclusive`, i.e. the
    /// inclusive end of a span that stops there.
    pub fn last_char_position(&self, end_exclusive: usize) -> Position {
        let head = self.text.get(..end_exclusive).unwrap_or(self.text);
        let last = head.char_indices().next_back().map_or(0, |(i, _)| i);
        self.position_of(last)
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.text.get(offset..).and_then(|rest| rest.chars().next())
    }

    pub fn starts_with_at(&self, offset: usize, pattern: &str) -> bool {
        self.text
            .get(offset..)
            .is_some_and(|rest| rest.starts_with(pattern))
    }

    pub fn named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name, self.text.to_string()))
    }

    /// Span covering the characters of a node, for diagnostics.
    pub fn span_of(&self, begin: Position, end_inclusive: Position) -> SourceSpan {
        let from = self.index.offset(self.text, begin).unwrap_or(0);
        let to = self
            .index
            .offset(self.text, end_inclusive.next_column())
            .unwrap_or(self.len());
        to_source_span(from, to.max(from))
    }
}

impl ErrorReporting for SourceDocument<'_> {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> ConvertError {
        let position = self.position_of(span.offset());
        ConvertError::new(kind)
            .at(None, position)
            .with_source(self.named_source(), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_is_end_exclusive() {
        let doc = SourceDocument::new("t", "${ x }", TagSyntax::AngleBracket);
        assert_eq!(doc.slice(Position::new(1, 3), Position::new(1, 4)).unwrap(), " ");
        assert_eq!(doc.slice(Position::new(1, 1), Position::new(1, 7)).unwrap(), "${ x }");
    }

    #[test]
    fn last_char_position_is_inclusive_end() {
        let doc = SourceDocument::new("t", "ab\ncd", TagSyntax::AngleBracket);
        assert_eq!(doc.last_char_position(3), Position::new(1, 3));
        assert_eq!(doc.last_char_position(5), Position::new(2, 2));
    }

    #[test]
    fn past_end_is_internal_error() {
        let doc = SourceDocument::new("t", "ab", TagSyntax::AngleBracket);
        let err = doc.offset(Position::new(3, 1)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Internal { .. }));
    }

    #[test]
    fn delimiters_follow_tag_syntax() {
        let doc = SourceDocument::new("t", "", TagSyntax::SquareBracket);
        assert_eq!((doc.open_char(), doc.close_char()), ('[', ']'));
    }
}
