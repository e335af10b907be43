//! Skipped-token scanning.
//!
//! The parse tree records where parameters are, but not the whitespace,
//! comments and self-closing slashes between them and around tag delimiters.
//! These scans recover that material from the text. They accept exactly
//! whitespace and `<#-- -->` style comments; anything else is an error, never
//! a guess.

use thiserror::Error;

use super::SourceDocument;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Can't find the end of the comment started at offset {start}")]
    UnterminatedComment { start: usize },
    #[error("Expected {expected} at offset {offset}, found {found:?}")]
    Unexpected {
        expected: String,
        found: char,
        offset: usize,
    },
    #[error("End of source reached when scanning for {expected}")]
    UnexpectedEof { expected: String },
}

impl ScanError {
    /// Where scanning stopped, clamped to `len`.
    pub fn offset(&self, len: usize) -> usize {
        match self {
            ScanError::UnterminatedComment { start } => *start,
            ScanError::Unexpected { offset, .. } => *offset,
            ScanError::UnexpectedEof { .. } => len,
        }
    }

    fn unexpected(expected: impl Into<String>, found: char, offset: usize) -> Self {
        ScanError::Unexpected {
            expected: expected.into(),
            found,
            offset,
        }
    }

    fn eof(expected: impl Into<String>) -> Self {
        ScanError::UnexpectedEof {
            expected: expected.into(),
        }
    }
}

/// The end of a start tag, as found by [`SourceDocument::scan_tag_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEnd<'a> {
    /// Whitespace and comments between the scan start and the `/` or the
    /// closing delimiter.
    pub skipped: &'a str,
    pub self_closing: bool,
    /// Offset of the closing delimiter character.
    pub close_offset: usize,
}

/// The name part of an end tag such as `</#if  >`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndTag<'a> {
    pub name: &'a str,
    /// Offset right after the name; the text from here to the closing
    /// delimiter is whitespace.
    pub name_end: usize,
}

/// Characters of directive names: letters, digits and `_`.
pub fn is_core_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$' || c == '@'
}

pub fn is_identifier_part(c: char) -> bool {
    is_identifier_start(c) || c.is_numeric()
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

impl<'a> SourceDocument<'a> {
    /// FM2 lets a tag that started with `<` end with an unpaired `]`.
    pub fn is_tag_end_char(&self, c: char) -> bool {
        c == self.close_char() || c == ']'
    }

    /// `<#--`, `<!--`, `[#--` or `[!--` at `pos`.
    pub fn is_comment_start(&self, pos: usize) -> bool {
        matches!(self.char_at(pos), Some('<') | Some('['))
            && (self.starts_with_at(pos + 1, "#--") || self.starts_with_at(pos + 1, "!--"))
    }

    /// Skips whitespace and comments.
    pub fn position_after_ws_and_comments(&self, pos: usize) -> Result<usize, ScanError> {
        let text = self.text();
        let mut pos = pos;
        loop {
            if self.is_comment_start(pos) {
                let body = pos + 4;
                let rest = &text[body..];
                let close = [rest.find("-->"), rest.find("--]")]
                    .into_iter()
                    .flatten()
                    .min()
                    .ok_or(ScanError::UnterminatedComment { start: pos })?;
                pos = body + close + 3;
            } else {
                match self.char_at(pos) {
                    Some(c) if c.is_whitespace() => pos += c.len_utf8(),
                    _ => return Ok(pos),
                }
            }
        }
    }

    pub fn read_ws_and_comments(&self, pos: usize) -> Result<&'a str, ScanError> {
        let end = self.position_after_ws_and_comments(pos)?;
        Ok(&self.text()[pos..end])
    }

    /// Whitespace/comments, `separator`, whitespace/comments. When the
    /// separator is optional and missing, only the leading part is returned.
    pub fn read_separator(
        &self,
        pos: usize,
        separator: &str,
        optional: bool,
    ) -> Result<&'a str, ScanError> {
        let mut end = self.position_after_ws_and_comments(pos)?;
        if !self.starts_with_at(end, separator) {
            if optional {
                return Ok(&self.text()[pos..end]);
            }
            return Err(match self.char_at(end) {
                Some(c) => ScanError::unexpected(format!("separator {:?}", separator), c, end),
                None => ScanError::eof(format!("separator {:?}", separator)),
            });
        }
        end += separator.len();
        end = self.position_after_ws_and_comments(end)?;
        Ok(&self.text()[pos..end])
    }

    /// Skips `<#name` starting at the tag's open character.
    pub fn position_after_tag_name(&self, pos: usize) -> Result<usize, ScanError> {
        let open = self.open_char();
        match self.char_at(pos) {
            Some(c) if c == open => {}
            Some(c) => return Err(ScanError::unexpected(format!("{:?}", open), c, pos)),
            None => return Err(ScanError::eof("tag start")),
        }
        match self.char_at(pos + 1) {
            Some('#') => {}
            Some(c) => return Err(ScanError::unexpected("'#'", c, pos + 1)),
            None => return Err(ScanError::eof("'#'")),
        }
        let rest = &self.text()[pos + 2..];
        match rest.find(|c: char| !is_core_name_char(c)) {
            Some(len) => Ok(pos + 2 + len),
            None => Err(ScanError::eof("end of tag name")),
        }
    }

    /// From `pos` (right after the last known token of a start tag), skips
    /// whitespace and comments up to an optional `/` and the closing
    /// delimiter.
    pub fn scan_tag_end(&self, pos: usize) -> Result<TagEnd<'a>, ScanError> {
        let end = self.position_after_ws_and_comments(pos)?;
        let skipped = &self.text()[pos..end];
        match self.char_at(end) {
            None => Err(ScanError::eof("tag end")),
            Some('/')
                if self
                    .char_at(end + 1)
                    .is_some_and(|c| self.is_tag_end_char(c)) =>
            {
                Ok(TagEnd {
                    skipped,
                    self_closing: true,
                    close_offset: end + 1,
                })
            }
            Some(c) if self.is_tag_end_char(c) => Ok(TagEnd {
                skipped,
                self_closing: false,
                close_offset: end,
            }),
            Some(c) => Err(ScanError::unexpected("tag end", c, end)),
        }
    }

    /// Scans backward from the closing delimiter of an end tag (the last
    /// character of a node span) to find the tag's name.
    pub fn end_tag_name(&self, close_offset: usize) -> Result<EndTag<'a>, ScanError> {
        match self.char_at(close_offset) {
            Some(c) if self.is_tag_end_char(c) => {}
            Some(c) => return Err(ScanError::unexpected("tag end character", c, close_offset)),
            None => return Err(ScanError::eof("tag end character")),
        }
        let before = &self.text()[..close_offset];
        let name_end = before.trim_end().len();
        let name_start = before[..name_end]
            .char_indices()
            .rev()
            .find(|&(_, c)| !is_core_name_char(c))
            .map_or(0, |(i, c)| i + c.len_utf8());
        if name_start == name_end {
            let found = before[..name_end].chars().next_back().unwrap_or(' ');
            return Err(ScanError::unexpected("end tag name", found, name_end));
        }
        let hash = name_start.checked_sub(1);
        if hash.and_then(|i| self.char_at(i)) != Some('#') {
            let found = hash.and_then(|i| self.char_at(i)).unwrap_or(' ');
            return Err(ScanError::unexpected("'#'", found, hash.unwrap_or(0)));
        }
        let slash = name_start.checked_sub(2);
        if slash.and_then(|i| self.char_at(i)) != Some('/') {
            let found = slash.and_then(|i| self.char_at(i)).unwrap_or(' ');
            return Err(ScanError::unexpected("'/'", found, slash.unwrap_or(0)));
        }
        Ok(EndTag {
            name: &before[name_start..name_end],
            name_end,
        })
    }

    /// Skips an FTL identifier, honouring `\`-escapes like `foo\-bar`.
    pub fn position_after_identifier(&self, start: usize) -> Result<usize, ScanError> {
        let text = self.text();
        let mut pos = start;
        while let Some(c) = self.char_at(pos) {
            if c == '\\' {
                match self.char_at(pos + 1) {
                    Some(escaped) => pos += 1 + escaped.len_utf8(),
                    None => return Err(ScanError::eof("escaped identifier character")),
                }
            } else if (pos == start && is_identifier_start(c)) || (pos > start && is_identifier_part(c)) {
                pos += c.len_utf8();
            } else {
                break;
            }
        }
        if pos == start {
            return Err(match text[start..].chars().next() {
                Some(c) => ScanError::unexpected("an identifier", c, start),
                None => ScanError::eof("an identifier"),
            });
        }
        Ok(pos)
    }

    /// Like [`SourceDocument::position_after_identifier`], but assignment
    /// targets may also be string literals (`<#assign "x y" = 1>`).
    pub fn position_after_assignment_target(&self, start: usize) -> Result<usize, ScanError> {
        if self.looks_like_string_literal_start(start) {
            self.position_after_string_literal(start)
        } else {
            self.position_after_identifier(start)
        }
    }

    fn looks_like_string_literal_start(&self, pos: usize) -> bool {
        match self.char_at(pos) {
            Some(c) if is_quote(c) => true,
            Some('r') => self.char_at(pos + 1).is_some_and(is_quote),
            _ => false,
        }
    }

    pub fn position_after_string_literal(&self, start: usize) -> Result<usize, ScanError> {
        let mut pos = start;
        let raw = self.char_at(pos) == Some('r');
        if raw {
            pos += 1;
        }
        let quote = match self.char_at(pos) {
            Some(c) if is_quote(c) => c,
            Some(c) => return Err(ScanError::unexpected("string literal", c, pos)),
            None => return Err(ScanError::eof("string literal")),
        };
        pos += 1;
        let mut escaped = false;
        while let Some(c) = self.char_at(pos) {
            pos += c.len_utf8();
            if c == quote && !escaped {
                return Ok(pos);
            }
            escaped = c == '\\' && !escaped && !raw;
        }
        Err(ScanError::eof("string literal end"))
    }

    /// Characters from `start` up to the first whitespace or comment, but not
    /// past `end`.
    pub fn read_until_ws_or_comment(&self, start: usize, end: usize) -> &'a str {
        let mut pos = start;
        while pos < end {
            match self.char_at(pos) {
                Some(c) if !c.is_whitespace() && !self.is_comment_start(pos) => pos += c.len_utf8(),
                _ => break,
            }
        }
        &self.text()[start..pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TagSyntax;

    fn doc(text: &str) -> SourceDocument<'_> {
        SourceDocument::new("t", text, TagSyntax::AngleBracket)
    }

    #[test]
    fn skips_whitespace_and_all_comment_forms() {
        let d = doc(" <#-- a --> \t[#-- b --]<!-- c -->x");
        assert_eq!(d.position_after_ws_and_comments(0), Ok(d.len() - 1));
    }

    #[test]
    fn comment_may_end_at_end_of_input() {
        let d = doc("<#-- a -->");
        assert_eq!(d.position_after_ws_and_comments(0), Ok(d.len()));
    }

    #[test]
    fn unterminated_comment_fails() {
        let d = doc("  <#-- a ");
        assert_eq!(
            d.position_after_ws_and_comments(0),
            Err(ScanError::UnterminatedComment { start: 2 })
        );
    }

    #[test]
    fn tag_end_with_and_without_slash() {
        let d = doc("<#else <#-- c --> />");
        let end = d.scan_tag_end(6).unwrap();
        assert_eq!(end.skipped, " <#-- c --> ");
        assert!(end.self_closing);
        assert_eq!(end.close_offset, d.len() - 1);

        let d = doc("<#if x\n>");
        let end = d.scan_tag_end(6).unwrap();
        assert_eq!(end.skipped, "\n");
        assert!(!end.self_closing);
    }

    #[test]
    fn tag_end_rejects_stray_characters() {
        let d = doc("<#if x y>");
        assert_eq!(
            d.scan_tag_end(6),
            Err(ScanError::Unexpected {
                expected: "tag end".into(),
                found: 'y',
                offset: 7
            })
        );
        assert_eq!(
            doc("<#if x ").scan_tag_end(6),
            Err(ScanError::UnexpectedEof {
                expected: "tag end".into()
            })
        );
    }

    #[test]
    fn finds_end_tag_name_backwards() {
        let d = doc("x</#if\n >");
        let tag = d.end_tag_name(d.len() - 1).unwrap();
        assert_eq!(tag.name, "if");
        assert_eq!(&d.text()[tag.name_end..d.len() - 1], "\n ");
    }

    #[test]
    fn end_tag_requires_slash() {
        let d = doc("<#if>");
        assert!(matches!(
            d.end_tag_name(4),
            Err(ScanError::Unexpected { .. })
        ));
    }

    #[test]
    fn tag_name_and_separators() {
        let d = doc("<#list xs <#--1--> as <#--2--> x>");
        assert_eq!(d.position_after_tag_name(0), Ok(6));
        assert_eq!(d.read_separator(9, "as", false), Ok(" <#--1--> as <#--2--> "));
        assert_eq!(d.read_separator(9, ",", true), Ok(" <#--1--> "));
        assert!(d.read_separator(9, ",", false).is_err());
    }

    #[test]
    fn identifiers_and_string_targets() {
        let d = doc(r#"foo\-bar = 1"#);
        assert_eq!(d.position_after_identifier(0), Ok(8));
        let d = doc(r#""x \" y" = 1"#);
        assert_eq!(d.position_after_assignment_target(0), Ok(8));
        let d = doc("= 1");
        assert!(d.position_after_identifier(0).is_err());
    }

    #[test]
    fn operator_token_stops_at_comment() {
        let d = doc("a&lt;<#--x-->b");
        assert_eq!(d.read_until_ws_or_comment(1, 13), "&lt;");
    }
}
