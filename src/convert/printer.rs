//! # Node Printer
//!
//! Walks the FM2 tree and appends FM3 text to an output buffer. Nothing is
//! pretty-printed: every character of the output is either a fixed FM3
//! token, a name mapped to its FM3 spelling, or a slice of the source
//! recovered between two known positions (whitespace, comments,
//! separators).
//!
//! The printer trusts the tree's shape only as far as it checks it. Every
//! node kind consumes its parameters through [`Printer::get_param`] and
//! friends, which fail on a wrong count, role or value type instead of
//! guessing.

use crate::ast::{Node, NodeId, NodeKind, ParamValue, ParameterRole, Position, Template};
use crate::errors::{to_source_span, ConvertError, ErrorKind};
use crate::source::{ScanError, SourceDocument};
use crate::target::TargetDialect;

use super::ConversionWarning;

pub(crate) type PrintResult = Result<(), ConvertError>;

pub(crate) struct Printer<'t> {
    pub(super) template: &'t Template,
    pub(super) doc: SourceDocument<'t>,
    pub(super) target: &'t dyn TargetDialect,
    out: String,
    warnings: Vec<ConversionWarning>,
}

impl<'t> Printer<'t> {
    pub(crate) fn new(template: &'t Template, target: &'t dyn TargetDialect) -> Self {
        Self {
            template,
            doc: SourceDocument::new(template.name(), template.source(), template.tag_syntax()),
            target,
            out: String::with_capacity(template.source().len()),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn print(mut self) -> Result<(String, Vec<ConversionWarning>), ConvertError> {
        self.print_node(self.template.root())?;
        Ok((self.out, self.warnings))
    }

    pub(super) fn print_node(&mut self, id: NodeId) -> PrintResult {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Element(kind) => self.print_element(node, kind),
            NodeKind::Expression(kind) => self.print_expression(node, kind),
        }
    }

    pub(super) fn print_children(&mut self, node: &'t Node) -> PrintResult {
        for &child in &node.children {
            self.print_node(child)?;
        }
        Ok(())
    }

    // ========================================================================
    // OUTPUT AND POSITIONS
    // ========================================================================

    pub(super) fn write(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub(super) fn write_char(&mut self, c: char) {
        self.out.push(c);
    }

    /// Records a change the output doesn't show, such as a dropped
    /// parameter.
    pub(super) fn warn(&mut self, position: Position, message: impl Into<String>) {
        self.warnings.push(ConversionWarning {
            position,
            message: message.into(),
        });
    }

    pub(super) fn node(&self, id: NodeId) -> &'t Node {
        self.template.node(id)
    }

    pub(super) fn parent(&self, node: &Node) -> Option<&'t Node> {
        node.parent.map(|id| self.node(id))
    }

    pub(super) fn begin(&self, node: &Node) -> Result<usize, ConvertError> {
        self.doc.offset(node.begin)
    }

    /// Offset of the node's last character.
    pub(super) fn last(&self, node: &Node) -> Result<usize, ConvertError> {
        self.doc.offset(node.end)
    }

    /// Offset right after the node.
    pub(super) fn end(&self, node: &Node) -> Result<usize, ConvertError> {
        let last = self.last(node)?;
        Ok(last + self.doc.char_at(last).map_or(1, char::len_utf8))
    }

    pub(super) fn expect_at(&self, node: &Node, offset: usize, expected: &str) -> PrintResult {
        if self.doc.starts_with_at(offset, expected) {
            return Ok(());
        }
        let found = self
            .doc
            .char_at(offset)
            .map_or_else(|| "end of input".to_string(), |c| format!("{:?}", c));
        Err(self.scan_failure_at(
            node,
            offset,
            format!("Expected {:?}, found {}", expected, found),
        ))
    }

    // ========================================================================
    // PARAMETER CONTRACT
    // ========================================================================

    pub(super) fn assert_param_count(&self, node: &Node, count: usize) -> PrintResult {
        if node.params.len() != count {
            return Err(self.mismatch(
                node,
                format!("Unexpected parameter count, {}.", node.params.len()),
            ));
        }
        Ok(())
    }

    pub(super) fn assert_param_count_between(
        &self,
        node: &Node,
        min: usize,
        max: usize,
    ) -> PrintResult {
        let count = node.params.len();
        if count < min || count > max {
            return Err(self.mismatch(node, format!("Unexpected parameter count, {}.", count)));
        }
        Ok(())
    }

    pub(super) fn assert_param_role(
        &self,
        node: &Node,
        index: usize,
        role: ParameterRole,
    ) -> PrintResult {
        match node.params.get(index) {
            Some(param) if param.role == role => Ok(()),
            Some(param) => Err(self.mismatch(
                node,
                format!(
                    "Unexpected role for parameter {}: expected {}, found {}.",
                    index, role, param.role
                ),
            )),
            None => Err(self.mismatch(
                node,
                format!("Missing parameter {} ({}).", index, role),
            )),
        }
    }

    pub(super) fn get_param(
        &self,
        node: &'t Node,
        index: usize,
        role: ParameterRole,
    ) -> Result<&'t ParamValue, ConvertError> {
        self.assert_param_role(node, index, role)?;
        Ok(&node.params[index].value)
    }

    /// The node's single parameter, after checking there is exactly one.
    pub(super) fn get_only_param(
        &self,
        node: &'t Node,
        role: ParameterRole,
    ) -> Result<&'t ParamValue, ConvertError> {
        self.assert_param_count(node, 1)?;
        self.get_param(node, 0, role)
    }

    pub(super) fn node_param(
        &self,
        node: &'t Node,
        index: usize,
        role: ParameterRole,
    ) -> Result<NodeId, ConvertError> {
        match self.get_param(node, index, role)? {
            ParamValue::Node(id) => Ok(*id),
            other => Err(self.wrong_type(node, index, "node", other)),
        }
    }

    pub(super) fn optional_node_param(
        &self,
        node: &'t Node,
        index: usize,
        role: ParameterRole,
    ) -> Result<Option<NodeId>, ConvertError> {
        match self.get_param(node, index, role)? {
            ParamValue::Node(id) => Ok(Some(*id)),
            ParamValue::Null => Ok(None),
            other => Err(self.wrong_type(node, index, "node or null", other)),
        }
    }

    pub(super) fn str_param(
        &self,
        node: &'t Node,
        index: usize,
        role: ParameterRole,
    ) -> Result<&'t str, ConvertError> {
        match self.get_param(node, index, role)? {
            ParamValue::Str(value) => Ok(value),
            other => Err(self.wrong_type(node, index, "string", other)),
        }
    }

    pub(super) fn int_param(
        &self,
        node: &'t Node,
        index: usize,
        role: ParameterRole,
    ) -> Result<i64, ConvertError> {
        match self.get_param(node, index, role)? {
            ParamValue::Int(value) => Ok(*value),
            other => Err(self.wrong_type(node, index, "integer", other)),
        }
    }

    /// String parameters from `from` on, all with `role`.
    pub(super) fn trailing_str_params(
        &self,
        node: &'t Node,
        from: usize,
        role: ParameterRole,
    ) -> Result<Vec<&'t str>, ConvertError> {
        (from..node.params.len())
            .map(|index| self.str_param(node, index, role))
            .collect()
    }

    // ========================================================================
    // SKIPPED TOKENS
    // ========================================================================

    /// Copies the whitespace and comments between `from` and `to`. Anything
    /// else in that range is a scan failure.
    pub(super) fn print_skipped(&mut self, node: &Node, from: usize, to: usize) -> PrintResult {
        let skipped = self
            .doc
            .read_ws_and_comments(from)
            .map_err(|e| self.scan_failure(node, e))?;
        if from + skipped.len() != to {
            return Err(self.unexpected_content(node, from + skipped.len(), to));
        }
        self.write(skipped);
        Ok(())
    }

    /// Offset after the whitespace and comments at `from`.
    pub(super) fn skip_ws(&self, node: &Node, from: usize) -> Result<usize, ConvertError> {
        self.doc
            .position_after_ws_and_comments(from)
            .map_err(|e| self.scan_failure(node, e))
    }

    /// Copies an optional `separator` with the whitespace and comments
    /// around it; returns the offset after them.
    pub(super) fn print_optional_separator(
        &mut self,
        node: &Node,
        from: usize,
        separator: &str,
    ) -> Result<usize, ConvertError> {
        let text = self
            .doc
            .read_separator(from, separator, true)
            .map_err(|e| self.scan_failure(node, e))?;
        self.write(text);
        Ok(from + text.len())
    }

    /// Copies `separator` and the whitespace and comments around it, which
    /// must reach exactly `to`.
    pub(super) fn print_separator(
        &mut self,
        node: &Node,
        from: usize,
        separator: &str,
        to: usize,
    ) -> PrintResult {
        let text = self
            .doc
            .read_separator(from, separator, false)
            .map_err(|e| self.scan_failure(node, e))?;
        if from + text.len() != to {
            return Err(self.unexpected_content(node, from + text.len(), to));
        }
        self.write(text);
        Ok(())
    }

    /// Copies what lies between a tag's last parameter and its closing
    /// delimiter, then prints the delimiter. Returns the offset after it.
    pub(super) fn print_tag_end(
        &mut self,
        node: &Node,
        from: usize,
        remove_slash: bool,
    ) -> Result<usize, ConvertError> {
        let end = self
            .doc
            .scan_tag_end(from)
            .map_err(|e| self.scan_failure(node, e))?;
        self.write(end.skipped);
        if end.self_closing {
            if !remove_slash {
                self.write_char('/');
            } else if self.out.ends_with(' ') {
                // `<#else />` becomes `<#else>`
                self.out.pop();
            }
        }
        self.write_char(self.doc.close_char());
        Ok(end.close_offset + 1)
    }

    /// Checks the directive name at the node's start and returns the offset
    /// right after it.
    pub(super) fn tag_name_end(&self, node: &Node, names: &[&str]) -> Result<usize, ConvertError> {
        let begin = self.begin(node)?;
        let name_end = self
            .doc
            .position_after_tag_name(begin)
            .map_err(|e| self.scan_failure(node, e))?;
        let name = &self.doc.text()[begin + 2..name_end];
        if !names.contains(&name) {
            return Err(self.mismatch(
                node,
                format!("Expected a tag named {}, found \"{}\".", names.join(" or "), name),
            ));
        }
        Ok(name_end)
    }

    /// Prints `<#name` with the FM3 spelling of the checked directive name.
    pub(super) fn print_start_tag(
        &mut self,
        node: &Node,
        names: &[&str],
        fm3_name: &str,
    ) -> Result<usize, ConvertError> {
        let name_end = self.tag_name_end(node, names)?;
        self.write_char(self.doc.open_char());
        self.write_char('#');
        self.write(fm3_name);
        Ok(name_end)
    }

    /// Prints the end tag that closes `node`; its closing delimiter is the
    /// node's last character.
    pub(super) fn print_end_tag(
        &mut self,
        node: &Node,
        names: &[&str],
        fm3_name: &str,
    ) -> PrintResult {
        let close = self.last(node)?;
        let tag = self
            .doc
            .end_tag_name(close)
            .map_err(|e| self.scan_failure(node, e))?;
        if !names.contains(&tag.name) {
            return Err(self.mismatch(
                node,
                format!(
                    "Expected end tag {}, found \"{}\".",
                    names.join(" or "),
                    tag.name
                ),
            ));
        }
        self.write_char(self.doc.open_char());
        self.write("/#");
        self.write(fm3_name);
        self.write(&self.doc.text()[tag.name_end..close]);
        self.write_char(self.doc.close_char());
        Ok(())
    }

    /// Whether the node ends with one of the given end tags, for directives
    /// whose end tag is optional.
    pub(super) fn has_end_tag(&self, node: &Node, names: &[&str]) -> Result<bool, ConvertError> {
        let begin = self.begin(node)?;
        let close = self.last(node)?;
        Ok(match self.doc.end_tag_name(close) {
            Ok(tag) => names.contains(&tag.name) && tag.name_end - tag.name.len() > begin + 3,
            Err(_) => false,
        })
    }

    // ========================================================================
    // ERRORS
    // ========================================================================

    fn locate(&self, error: ConvertError, node: &Node) -> ConvertError {
        error
            .at(Some(node.label()), node.begin)
            .with_source(self.doc.named_source(), self.doc.span_of(node.begin, node.end))
    }

    pub(super) fn node_error(&self, node: &Node, kind: ErrorKind) -> ConvertError {
        self.locate(ConvertError::new(kind), node)
    }

    pub(super) fn mismatch(&self, node: &Node, message: impl Into<String>) -> ConvertError {
        self.node_error(
            node,
            ErrorKind::StructuralMismatch {
                node: node.label().to_string(),
                message: message.into(),
            },
        )
    }

    pub(super) fn unhandled(&self, node: &Node, expected: &str) -> ConvertError {
        self.node_error(
            node,
            ErrorKind::UnhandledNodeKind {
                node: node.label().to_string(),
                expected: expected.to_string(),
            },
        )
    }

    pub(super) fn unconvertible(&self, node: &Node, message: impl Into<String>) -> ConvertError {
        self.node_error(
            node,
            ErrorKind::UnconvertibleFeature {
                message: message.into(),
            },
        )
    }

    fn wrong_type(
        &self,
        node: &Node,
        index: usize,
        expected: &str,
        found: &ParamValue,
    ) -> ConvertError {
        self.mismatch(
            node,
            format!(
                "Parameter {} should be a {}, found {}.",
                index,
                expected,
                found.type_name()
            ),
        )
    }

    pub(super) fn scan_failure(&self, node: &Node, error: ScanError) -> ConvertError {
        let offset = error.offset(self.doc.len());
        self.scan_failure_at(node, offset, error.to_string())
    }

    fn scan_failure_at(&self, node: &Node, offset: usize, message: String) -> ConvertError {
        let len = self.doc.len();
        ConvertError::new(ErrorKind::ScanFailure { message })
            .at(Some(node.label()), self.doc.position_of(offset))
            .with_source(
                self.doc.named_source(),
                to_source_span(offset.min(len), (offset + 1).min(len)),
            )
    }

    fn unexpected_content(&self, node: &Node, at: usize, to: usize) -> ConvertError {
        let message = match self.doc.char_at(at) {
            Some(c) if at < to => format!(
                "Expected only whitespace and comments before offset {}, found {:?}",
                to, c
            ),
            _ => format!("Skipped tokens overrun offset {} (stopped at {})", to, at),
        };
        self.scan_failure_at(node, at, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ElementKind, Position, TagSyntax, TreeBuilder};
    use crate::target::Fm3Dialect;

    fn template_with(node: Node, source: &str) -> (Template, NodeId) {
        let mut builder = TreeBuilder::new();
        let id = builder.push(node);
        let template = builder.finish("t", source, id, TagSyntax::AngleBracket, false);
        (template, id)
    }

    #[test]
    fn param_count_mismatch_is_reported() {
        let node = Node::new(
            NodeKind::Element(ElementKind::BreakInstruction),
            Position::new(1, 1),
            Position::new(1, 8),
        )
        .with_param(ParameterRole::Content, ParamValue::Null);
        let (template, id) = template_with(node, "<#break>");
        let printer = Printer::new(&template, &Fm3Dialect);
        let err = printer.assert_param_count(template.node(id), 0).unwrap_err();
        assert!(err.to_string().contains("Unexpected parameter count, 1."));
    }

    #[test]
    fn role_and_type_are_checked() {
        let node = Node::new(
            NodeKind::Element(ElementKind::Comment),
            Position::new(1, 1),
            Position::new(1, 8),
        )
        .with_param(ParameterRole::Content, ParamValue::Int(3));
        let (template, id) = template_with(node, "<#--x-->");
        let printer = Printer::new(&template, &Fm3Dialect);
        let node = template.node(id);
        assert!(printer.get_param(node, 0, ParameterRole::Message).is_err());
        assert!(printer.str_param(node, 0, ParameterRole::Content).is_err());
        assert_eq!(printer.int_param(node, 0, ParameterRole::Content).unwrap(), 3);
    }

    #[test]
    fn skipped_region_must_reach_target() {
        let node = Node::new(
            NodeKind::Element(ElementKind::MixedContent),
            Position::new(1, 1),
            Position::new(1, 9),
        );
        let (template, id) = template_with(node, "a <#--c-->x b");
        let mut printer = Printer::new(&template, &Fm3Dialect);
        let node = template.node(id);
        printer.print_skipped(node, 1, 10).unwrap();
        assert_eq!(printer.out, " <#--c-->");
        let err = printer.print_skipped(node, 1, 12).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ScanFailure { .. }));
    }
}
