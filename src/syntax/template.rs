//! Template scanner: text, interpolations, comments and directive tags.
//!
//! Block directives are collected on a stack of open frames. A frame turns
//! into a node when its end tag (or, for `#sep` and `#case`, the next
//! sibling or the parent's end tag) arrives, so every node is pushed after
//! its children and the builder can wire parent links in one go.

use crate::ast::{
    ElementKind, IteratorStyle, Node, NodeId, NodeKind, ParamValue, Parameter, ParameterRole,
    Position, TagSyntax, Template, TreeBuilder,
};
use crate::errors::{to_source_span, ConvertError, ErrorReporting};
use crate::source::scanner::{is_core_name_char, is_identifier_part, is_identifier_start};
use crate::source::{ScanError, SourceDocument, TagEnd};

use super::dialect::{Dialect, Directive, DirectiveLookup, EndTagKey};
use super::expression::{parse_callee, parse_expression, Built};

const ASSIGNMENT_OPERATORS: &[&str] = &["+=", "-=", "*=", "/=", "%=", "++", "--", "="];

/// Upper bound for `m`/`M` in `#{x; mXMY}`.
pub const MAX_FRACTION_DIGITS: i64 = 50;

#[derive(Debug)]
enum Markup {
    Interpolation,
    NumericalOutput,
    Comment,
    StartTag,
    EndTag,
    UserDirectiveStart,
    UserDirectiveEnd,
}

#[derive(Debug)]
enum Block {
    /// Umbrella of an `#if` chain; the open branch is the frame above it.
    IfChain {
        branches: Vec<NodeId>,
        seen_else: bool,
    },
    Branch,
    Iterator(IteratorStyle),
    /// A `#list` that reached its `#else`; the `ElseOfList` frame is above.
    ListElse {
        iterator: NodeId,
    },
    ElseOfList,
    Items,
    Sep,
    Attempt {
        content_start: usize,
        attempted: Option<NodeId>,
    },
    Recover,
    Plain(ElementKind, EndTagKey),
    BlockAssignment(EndTagKey),
    Switch,
    Case,
    /// `<@name ...>` with a body; `callee` is the name as written, which a
    /// named end tag must repeat.
    UserDirective {
        callee: String,
    },
}

impl Block {
    fn describe(&self) -> &'static str {
        match self {
            Block::IfChain { .. } | Block::Branch => "#if",
            Block::Iterator(IteratorStyle::List) | Block::ListElse { .. } | Block::ElseOfList => {
                "#list"
            }
            Block::Iterator(IteratorStyle::ForEach) => "#foreach",
            Block::Items => "#items",
            Block::Sep => "#sep",
            Block::Attempt { .. } | Block::Recover => "#attempt",
            Block::Plain(ElementKind::CompressedBlock, _) => "#compress",
            Block::Plain(ElementKind::AutoEscBlock, _) => "#autoEsc",
            Block::Plain(ElementKind::NoAutoEscBlock, _) => "#noAutoEsc",
            Block::Plain(ElementKind::Macro, EndTagKey::Function) => "#function",
            Block::Plain(ElementKind::Macro, _) => "#macro",
            Block::Plain(ElementKind::EscapeBlock, _) => "#escape",
            Block::Plain(ElementKind::NoEscapeBlock, _) => "#noEscape",
            Block::Plain(ElementKind::OutputFormatBlock, _) => "#outputFormat",
            Block::Plain(_, _) => "block",
            Block::UserDirective { .. } => "user-defined",
            Block::BlockAssignment(_) => "block assignment",
            Block::Switch | Block::Case => "#switch",
        }
    }
}

#[derive(Debug)]
struct Frame {
    block: Block,
    /// Offset of the start tag's open character.
    start: usize,
    params: Vec<Parameter>,
    children: Vec<NodeId>,
}

impl Frame {
    fn new(block: Block, start: usize, params: Vec<Parameter>) -> Self {
        Self {
            block,
            start,
            params,
            children: Vec::new(),
        }
    }
}

pub(crate) struct TemplateParser<'a> {
    doc: SourceDocument<'a>,
    dialect: Dialect,
    whitespace_stripping: bool,
    tree: TreeBuilder,
    root_children: Vec<NodeId>,
    stack: Vec<Frame>,
    pos: usize,
}

impl<'a> TemplateParser<'a> {
    pub(crate) fn new(
        name: &'a str,
        text: &'a str,
        tag_syntax: TagSyntax,
        dialect: Dialect,
        whitespace_stripping: bool,
    ) -> Self {
        Self {
            doc: SourceDocument::new(name, text, tag_syntax),
            dialect,
            whitespace_stripping,
            tree: TreeBuilder::new(),
            root_children: Vec::new(),
            stack: Vec::new(),
            pos: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Template, ConvertError> {
        while self.pos < self.doc.len() {
            let (text_end, markup) = self.find_markup(self.pos);
            if text_end > self.pos {
                self.text_block(self.pos, text_end)?;
                self.pos = text_end;
            }
            match markup {
                None => break,
                Some(Markup::Interpolation) => self.interpolation()?,
                Some(Markup::NumericalOutput) => self.numerical_output()?,
                Some(Markup::Comment) => self.comment()?,
                Some(Markup::StartTag) => self.start_tag()?,
                Some(Markup::EndTag) => self.end_tag()?,
                Some(Markup::UserDirectiveStart) => self.user_directive_call()?,
                Some(Markup::UserDirectiveEnd) => self.user_directive_end()?,
            }
        }
        self.finish()
    }

    fn finish(mut self) -> Result<Template, ConvertError> {
        if let Some(frame) = self.stack.pop() {
            return Err(self.doc.syntax_error(
                format!("Unclosed {} directive", frame.block.describe()),
                to_source_span(frame.start, frame.start + 1),
            ));
        }
        let mut root = Node::new(
            NodeKind::Element(ElementKind::MixedContent),
            Position::new(1, 1),
            self.doc.last_char_position(self.doc.len()),
        );
        root.children = std::mem::take(&mut self.root_children);
        let root = self.tree.push(root);
        let doc = &self.doc;
        Ok(self.tree.finish(
            doc.name(),
            doc.text(),
            root,
            doc.tag_syntax(),
            self.whitespace_stripping,
        ))
    }

    // ========================================================================
    // TEXT LEVEL
    // ========================================================================

    fn find_markup(&self, from: usize) -> (usize, Option<Markup>) {
        let bytes = self.doc.text().as_bytes();
        let open = self.doc.open_char() as u8;
        let mut i = from;
        while i < bytes.len() {
            let markup = match bytes[i] {
                b'$' if bytes.get(i + 1) == Some(&b'{') => Some(Markup::Interpolation),
                b'#' if bytes.get(i + 1) == Some(&b'{') && self.dialect.has_numerical_output() => {
                    Some(Markup::NumericalOutput)
                }
                b if b == open => self.markup_after_open(i),
                _ => None,
            };
            if markup.is_some() {
                return (i, markup);
            }
            i += 1;
        }
        (bytes.len(), None)
    }

    fn markup_after_open(&self, i: usize) -> Option<Markup> {
        let doc = &self.doc;
        if doc.starts_with_at(i + 1, "#--") {
            Some(Markup::Comment)
        } else if doc.starts_with_at(i + 1, "/#") {
            Some(Markup::EndTag)
        } else if doc.starts_with_at(i + 1, "@")
            && doc.char_at(i + 2).is_some_and(is_identifier_start)
        {
            Some(Markup::UserDirectiveStart)
        } else if doc.starts_with_at(i + 1, "/@") {
            Some(Markup::UserDirectiveEnd)
        } else if doc.starts_with_at(i + 1, "#")
            && doc.char_at(i + 2).is_some_and(|c| c.is_ascii_alphabetic())
        {
            Some(Markup::StartTag)
        } else {
            None
        }
    }

    fn text_block(&mut self, start: usize, end: usize) -> Result<(), ConvertError> {
        let text = self.doc.slice_offsets(start, end)?;
        let node = Node::new(
            NodeKind::Element(ElementKind::TextBlock),
            self.doc.position_of(start),
            self.doc.last_char_position(end),
        )
        .with_param(ParameterRole::Content, ParamValue::Str(text.to_string()));
        let ignorable = text.trim().is_empty();
        self.attach(node, start, ignorable)
    }

    fn interpolation(&mut self) -> Result<(), ConvertError> {
        let start = self.pos;
        let expr = self.expression(start + 2, false)?;
        let close = self.skip_ws(expr.end)?;
        self.expect_char(close, '}')?;
        let node = Node::new(
            NodeKind::Element(ElementKind::DollarVariable),
            self.doc.position_of(start),
            self.doc.position_of(close),
        )
        .with_param(ParameterRole::Content, ParamValue::Node(expr.id));
        self.pos = close + 1;
        self.attach(node, start, false)
    }

    /// `#{expr}` or `#{expr; m1M3}`
    fn numerical_output(&mut self) -> Result<(), ConvertError> {
        let start = self.pos;
        let expr = self.expression(start + 2, false)?;
        let mut p = self.skip_ws(expr.end)?;
        let (min, max) = if self.doc.char_at(p) == Some(';') {
            p = self.skip_ws(p + 1)?;
            let (min, max, after) = self.format_spec(p)?;
            p = self.skip_ws(after)?;
            (ParamValue::Int(min), ParamValue::Int(max))
        } else {
            (ParamValue::Null, ParamValue::Null)
        };
        self.expect_char(p, '}')?;
        let node = Node::new(
            NodeKind::Element(ElementKind::NumericalOutput),
            self.doc.position_of(start),
            self.doc.position_of(p),
        )
        .with_param(ParameterRole::Content, ParamValue::Node(expr.id))
        .with_param(ParameterRole::MinimumDecimals, min)
        .with_param(ParameterRole::MaximumDecimals, max);
        self.pos = p + 1;
        self.attach(node, start, false)
    }

    fn format_spec(&self, start: usize) -> Result<(i64, i64, usize), ConvertError> {
        let text = self.doc.text();
        let mut min = None;
        let mut max = None;
        let mut p = start;
        while let Some(letter @ ('m' | 'M')) = self.doc.char_at(p) {
            let digits_start = p + 1;
            let digits_end = text[digits_start..]
                .find(|c: char| !c.is_ascii_digit())
                .map_or(text.len(), |i| digits_start + i);
            let digits = &text[digits_start..digits_end];
            if digits.is_empty() {
                return Err(self.doc.syntax_error(
                    format!("Expected a number after \"{}\"", letter),
                    to_source_span(p, p + 1),
                ));
            }
            let value = digits
                .parse::<i64>()
                .ok()
                .filter(|v| *v <= MAX_FRACTION_DIGITS)
                .ok_or_else(|| {
                    self.doc.syntax_error(
                        format!(
                            "Cannot specify more than {} fraction digits",
                            MAX_FRACTION_DIGITS
                        ),
                        to_source_span(p, digits_end),
                    )
                })?;
            let slot = if letter == 'm' { &mut min } else { &mut max };
            if slot.replace(value).is_some() {
                return Err(self.doc.syntax_error(
                    format!("Duplicate \"{}\" in number format", letter),
                    to_source_span(p, digits_end),
                ));
            }
            p = digits_end;
        }
        let (min, max) = match (min, max) {
            (None, None) => {
                return Err(self.doc.syntax_error(
                    "Expected a number format like m2M5",
                    to_source_span(start, start + 1),
                ))
            }
            (Some(min), None) => (min, min),
            (None, Some(max)) => (0, max),
            (Some(min), Some(max)) => (min, max),
        };
        if max < min {
            return Err(self.doc.syntax_error(
                "Maximum decimals can't be less than minimum decimals",
                to_source_span(start, p),
            ));
        }
        Ok((min, max, p))
    }

    fn comment(&mut self) -> Result<(), ConvertError> {
        let start = self.pos;
        let body = start + 4;
        let rest = &self.doc.text()[body..];
        let close = [rest.find("-->"), rest.find("--]")]
            .into_iter()
            .flatten()
            .min()
            .map(|i| body + i)
            .ok_or_else(|| {
                self.doc.syntax_error(
                    "Unterminated comment",
                    to_source_span(start, start + 4),
                )
            })?;
        let content = self.doc.slice_offsets(body, close)?;
        let node = Node::new(
            NodeKind::Element(ElementKind::Comment),
            self.doc.position_of(start),
            self.doc.position_of(close + 2),
        )
        .with_param(ParameterRole::Content, ParamValue::Str(content.to_string()));
        self.pos = close + 3;
        self.attach(node, start, true)
    }

    // ========================================================================
    // START TAGS
    // ========================================================================

    fn start_tag(&mut self) -> Result<(), ConvertError> {
        let tag_start = self.pos;
        let name_end = self.name_end(tag_start + 2);
        let name = &self.doc.text()[tag_start + 2..name_end];
        match self.dialect.directive(name) {
            DirectiveLookup::Known(directive) => self.directive(directive, tag_start, name_end),
            DirectiveLookup::Unsupported => Err(self.doc.syntax_error(
                format!("The #{} directive isn't supported by the converter", name),
                to_source_span(tag_start, name_end),
            )),
            DirectiveLookup::Unknown => Err(self.doc.syntax_error(
                format!("Unknown {} directive: #{}", self.dialect, name),
                to_source_span(tag_start, name_end),
            )),
        }
    }

    fn directive(
        &mut self,
        directive: Directive,
        tag_start: usize,
        name_end: usize,
    ) -> Result<(), ConvertError> {
        tracing::trace!(?directive, offset = tag_start, "directive");
        match directive {
            Directive::If => {
                let condition = self.expression(name_end, true)?;
                let end = self.block_tag_end(condition.end, "#if")?;
                self.open(
                    Frame::new(
                        Block::IfChain {
                            branches: Vec::new(),
                            seen_else: false,
                        },
                        tag_start,
                        Vec::new(),
                    ),
                    tag_start,
                )?;
                self.stack.push(Frame::new(
                    Block::Branch,
                    tag_start,
                    vec![
                        Parameter::node(ParameterRole::Condition, condition.id),
                        Parameter::int(ParameterRole::AstNodeSubtype, 0),
                    ],
                ));
                self.pos = end.close_offset + 1;
            }
            Directive::ElseIf => {
                self.close_implicit_sep(tag_start)?;
                self.close_branch(tag_start, "#elseif")?;
                let condition = self.expression(name_end, true)?;
                let end = self.tag_end(condition.end)?;
                self.stack.push(Frame::new(
                    Block::Branch,
                    tag_start,
                    vec![
                        Parameter::node(ParameterRole::Condition, condition.id),
                        Parameter::int(ParameterRole::AstNodeSubtype, 2),
                    ],
                ));
                self.pos = end.close_offset + 1;
            }
            Directive::Else => {
                self.close_implicit_sep(tag_start)?;
                let end = self.tag_end(name_end)?;
                match self.stack.last().map(|f| &f.block) {
                    Some(Block::Branch) => {
                        self.close_branch(tag_start, "#else")?;
                        self.stack.push(Frame::new(
                            Block::Branch,
                            tag_start,
                            vec![
                                Parameter::new(ParameterRole::Condition, ParamValue::Null),
                                Parameter::int(ParameterRole::AstNodeSubtype, 1),
                            ],
                        ));
                    }
                    Some(Block::Iterator(IteratorStyle::List)) => {
                        let frame = self.pop()?;
                        let iterator = self.build_block(
                            ElementKind::IteratorBlock(IteratorStyle::List),
                            frame.start,
                            self.doc.last_char_position(tag_start),
                            frame.params,
                            frame.children,
                        );
                        self.stack.push(Frame::new(
                            Block::ListElse { iterator },
                            frame.start,
                            Vec::new(),
                        ));
                        self.stack
                            .push(Frame::new(Block::ElseOfList, tag_start, Vec::new()));
                    }
                    _ => {
                        return Err(self.doc.syntax_error(
                            "#else must be inside #if or #list",
                            to_source_span(tag_start, name_end),
                        ))
                    }
                }
                self.pos = end.close_offset + 1;
            }
            Directive::Assign => self.assignment(0, EndTagKey::Assign, tag_start, name_end)?,
            Directive::Global => self.assignment(1, EndTagKey::Global, tag_start, name_end)?,
            Directive::Local => self.assignment(2, EndTagKey::Local, tag_start, name_end)?,
            Directive::List => {
                let source = self.expression(name_end, true)?;
                let mut params = vec![Parameter::node(ParameterRole::ListSource, source.id)];
                let mut p = self.skip_ws(source.end)?;
                if self.keyword_at(p, "as") {
                    p = self.loop_variables(p + 2, &mut params)?;
                }
                let end = self.block_tag_end(p, "#list")?;
                self.open(
                    Frame::new(Block::Iterator(IteratorStyle::List), tag_start, params),
                    tag_start,
                )?;
                self.pos = end.close_offset + 1;
            }
            Directive::ForEach => {
                let var_start = self.skip_ws(name_end)?;
                let var_end = self.identifier_end(var_start)?;
                let p = self.skip_ws(var_end)?;
                if !self.keyword_at(p, "in") {
                    return Err(self.unexpected(p, "\"in\""));
                }
                let source = self.expression(p + 2, true)?;
                let end = self.block_tag_end(source.end, "#foreach")?;
                let params = vec![
                    Parameter::node(ParameterRole::ListSource, source.id),
                    Parameter::string(
                        ParameterRole::TargetLoopVariable,
                        &self.doc.text()[var_start..var_end],
                    ),
                ];
                self.open(
                    Frame::new(Block::Iterator(IteratorStyle::ForEach), tag_start, params),
                    tag_start,
                )?;
                self.pos = end.close_offset + 1;
            }
            Directive::Items => {
                if !self.inside(|b| matches!(b, Block::Iterator(IteratorStyle::List))) {
                    return Err(self.doc.syntax_error(
                        "#items must be inside #list",
                        to_source_span(tag_start, name_end),
                    ));
                }
                let p = self.skip_ws(name_end)?;
                if !self.keyword_at(p, "as") {
                    return Err(self.unexpected(p, "\"as\""));
                }
                let mut params = Vec::new();
                let p = self.loop_variables(p + 2, &mut params)?;
                let end = self.block_tag_end(p, "#items")?;
                self.open(Frame::new(Block::Items, tag_start, params), tag_start)?;
                self.pos = end.close_offset + 1;
            }
            Directive::Sep => {
                if !self.inside(|b| matches!(b, Block::Iterator(_) | Block::Items)) {
                    return Err(self.doc.syntax_error(
                        "#sep must be inside #list or #items",
                        to_source_span(tag_start, name_end),
                    ));
                }
                let end = self.block_tag_end(name_end, "#sep")?;
                self.open(Frame::new(Block::Sep, tag_start, Vec::new()), tag_start)?;
                self.pos = end.close_offset + 1;
            }
            Directive::Attempt => {
                let end = self.block_tag_end(name_end, "#attempt")?;
                self.open(
                    Frame::new(
                        Block::Attempt {
                            content_start: end.close_offset + 1,
                            attempted: None,
                        },
                        tag_start,
                        Vec::new(),
                    ),
                    tag_start,
                )?;
                self.pos = end.close_offset + 1;
            }
            Directive::Recover => self.recover(tag_start, name_end)?,
            Directive::Trim | Directive::LeftTrim | Directive::RightTrim | Directive::NoTrim => {
                let code = match directive {
                    Directive::Trim => 0,
                    Directive::LeftTrim => 1,
                    Directive::RightTrim => 2,
                    _ => 3,
                };
                let end = self.tag_end(name_end)?;
                let node = self.leaf(ElementKind::TrimInstruction, tag_start, &end)
                    .with_param(ParameterRole::AstNodeSubtype, ParamValue::Int(code));
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::Break | Directive::Flush => {
                let kind = if directive == Directive::Break {
                    ElementKind::BreakInstruction
                } else {
                    ElementKind::FlushInstruction
                };
                let end = self.tag_end(name_end)?;
                let node = self.leaf(kind, tag_start, &end);
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::Stop => {
                let (message, end) = match self.tag_end(name_end) {
                    Ok(end) => (None, end),
                    Err(_) => {
                        let message = self.expression(name_end, true)?;
                        (Some(message.id), self.tag_end(message.end)?)
                    }
                };
                let node = self
                    .leaf(ElementKind::StopInstruction, tag_start, &end)
                    .with_param(
                        ParameterRole::Message,
                        message.map_or(ParamValue::Null, ParamValue::Node),
                    );
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::Compress | Directive::AutoEsc | Directive::NoAutoEsc => {
                let (kind, key) = match directive {
                    Directive::Compress => (ElementKind::CompressedBlock, EndTagKey::Compress),
                    Directive::AutoEsc => (ElementKind::AutoEscBlock, EndTagKey::AutoEsc),
                    _ => (ElementKind::NoAutoEscBlock, EndTagKey::NoAutoEsc),
                };
                let end = self.block_tag_end(name_end, "block directive")?;
                self.open(Frame::new(Block::Plain(kind, key), tag_start, Vec::new()), tag_start)?;
                self.pos = end.close_offset + 1;
            }
            Directive::Switch => {
                let value = self.expression(name_end, true)?;
                let end = self.block_tag_end(value.end, "#switch")?;
                self.open(
                    Frame::new(
                        Block::Switch,
                        tag_start,
                        vec![Parameter::node(ParameterRole::Value, value.id)],
                    ),
                    tag_start,
                )?;
                self.pos = end.close_offset + 1;
            }
            Directive::Case | Directive::Default => {
                if matches!(self.stack.last().map(|f| &f.block), Some(Block::Case)) {
                    let frame = self.pop()?;
                    self.close_frame_before(frame, tag_start)?;
                }
                if !matches!(self.stack.last().map(|f| &f.block), Some(Block::Switch)) {
                    return Err(self.doc.syntax_error(
                        "#case and #default must be directly inside #switch",
                        to_source_span(tag_start, name_end),
                    ));
                }
                let (condition, subtype, end) = if directive == Directive::Case {
                    let condition = self.expression(name_end, true)?;
                    (Some(condition.id), 0, self.tag_end(condition.end)?)
                } else {
                    (None, 1, self.tag_end(name_end)?)
                };
                self.stack.push(Frame::new(
                    Block::Case,
                    tag_start,
                    vec![
                        Parameter::optional_node(ParameterRole::Condition, condition),
                        Parameter::int(ParameterRole::AstNodeSubtype, subtype),
                    ],
                ));
                self.pos = end.close_offset + 1;
            }
            Directive::Import => {
                let path = self.expression(name_end, true)?;
                let p = self.skip_ws(path.end)?;
                if !self.keyword_at(p, "as") {
                    return Err(self.unexpected(p, "\"as\""));
                }
                let ns_start = self.skip_ws(p + 2)?;
                let ns_end = self.identifier_end(ns_start)?;
                let end = self.tag_end(ns_end)?;
                let namespace = self.doc.text()[ns_start..ns_end].to_string();
                let node = self
                    .leaf(ElementKind::LibraryLoad, tag_start, &end)
                    .with_param(ParameterRole::TemplateName, ParamValue::Node(path.id))
                    .with_param(ParameterRole::Namespace, ParamValue::Str(namespace));
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::NoParse => self.noparse(tag_start, name_end)?,
            Directive::Macro | Directive::Function => {
                self.macro_definition(directive, tag_start, name_end)?
            }
            Directive::Nested => {
                if !self.inside(|b| matches!(b, Block::Plain(ElementKind::Macro, EndTagKey::Macro)))
                {
                    return Err(self.doc.syntax_error(
                        "#nested must be inside #macro",
                        to_source_span(tag_start, name_end),
                    ));
                }
                let mut params = Vec::new();
                let p = self.positional_values(name_end, ParameterRole::PassedValue, &mut params)?;
                let end = self.tag_end(p)?;
                let mut node = self.leaf(ElementKind::BodyInstruction, tag_start, &end);
                node.params = params;
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::Return => {
                if !self.inside(|b| matches!(b, Block::Plain(ElementKind::Macro, _))) {
                    return Err(self.doc.syntax_error(
                        "#return must be inside #macro or #function",
                        to_source_span(tag_start, name_end),
                    ));
                }
                let (value, end) = match self.tag_end(name_end) {
                    Ok(end) => (None, end),
                    Err(_) => {
                        let value = self.expression(name_end, true)?;
                        (Some(value.id), self.tag_end(value.end)?)
                    }
                };
                let node = self
                    .leaf(ElementKind::ReturnInstruction, tag_start, &end)
                    .with_param(
                        ParameterRole::Value,
                        value.map_or(ParamValue::Null, ParamValue::Node),
                    );
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::Include => self.include(tag_start, name_end)?,
            Directive::Setting => {
                let key_start = self.skip_ws(name_end)?;
                let key_end = self.identifier_end(key_start)?;
                let key = &self.doc.text()[key_start..key_end];
                if !self.dialect.is_setting(key) {
                    return Err(self.doc.syntax_error(
                        format!("Unknown setting name: {}", key),
                        to_source_span(key_start, key_end),
                    ));
                }
                let key = key.to_string();
                let eq = self.skip_ws(key_end)?;
                self.expect_char(eq, '=')?;
                let value = self.expression(eq + 1, true)?;
                let end = self.tag_end(value.end)?;
                let node = self
                    .leaf(ElementKind::PropertySetting, tag_start, &end)
                    .with_param(ParameterRole::ItemKey, ParamValue::Str(key))
                    .with_param(ParameterRole::ItemValue, ParamValue::Node(value.id));
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::Escape => {
                let var_start = self.skip_ws(name_end)?;
                let var_end = self.identifier_end(var_start)?;
                let p = self.skip_ws(var_end)?;
                if !self.keyword_at(p, "as") {
                    return Err(self.unexpected(p, "\"as\""));
                }
                let template = self.expression(p + 2, true)?;
                let end = self.block_tag_end(template.end, "#escape")?;
                let params = vec![
                    Parameter::string(
                        ParameterRole::PlaceholderVariable,
                        &self.doc.text()[var_start..var_end],
                    ),
                    Parameter::node(ParameterRole::ExpressionTemplate, template.id),
                ];
                self.open(
                    Frame::new(
                        Block::Plain(ElementKind::EscapeBlock, EndTagKey::Escape),
                        tag_start,
                        params,
                    ),
                    tag_start,
                )?;
                self.pos = end.close_offset + 1;
            }
            Directive::NoEscape => {
                if !self.inside(|b| matches!(b, Block::Plain(ElementKind::EscapeBlock, _))) {
                    return Err(self.doc.syntax_error(
                        "#noEscape must be inside #escape",
                        to_source_span(tag_start, name_end),
                    ));
                }
                let end = self.block_tag_end(name_end, "#noEscape")?;
                self.open(
                    Frame::new(
                        Block::Plain(ElementKind::NoEscapeBlock, EndTagKey::NoEscape),
                        tag_start,
                        Vec::new(),
                    ),
                    tag_start,
                )?;
                self.pos = end.close_offset + 1;
            }
            Directive::Visit | Directive::Recurse => {
                let p = self.skip_ws(name_end)?;
                let target = if directive == Directive::Recurse
                    && (self.keyword_at(p, "using") || self.tag_end(p).is_ok())
                {
                    None
                } else {
                    Some(self.expression(p, true)?)
                };
                let mut p = target.as_ref().map_or(name_end, |t| t.end);
                let q = self.skip_ws(p)?;
                let namespace = if self.keyword_at(q, "using") {
                    let namespace = self.expression(q + 5, true)?;
                    p = namespace.end;
                    Some(namespace.id)
                } else {
                    None
                };
                let end = self.tag_end(p)?;
                let kind = if directive == Directive::Visit {
                    ElementKind::VisitNode
                } else {
                    ElementKind::RecurseNode
                };
                let node = self
                    .leaf(kind, tag_start, &end)
                    .with_param(
                        ParameterRole::Node,
                        target.map_or(ParamValue::Null, |t| ParamValue::Node(t.id)),
                    )
                    .with_param(
                        ParameterRole::Namespace,
                        namespace.map_or(ParamValue::Null, ParamValue::Node),
                    );
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::Fallback => {
                let end = self.tag_end(name_end)?;
                let node = self.leaf(ElementKind::FallbackInstruction, tag_start, &end);
                self.finish_leaf(node, tag_start, &end)?;
            }
            Directive::OutputFormat => {
                let value = self.expression(name_end, true)?;
                let end = self.block_tag_end(value.end, "#outputFormat")?;
                self.open(
                    Frame::new(
                        Block::Plain(ElementKind::OutputFormatBlock, EndTagKey::OutputFormat),
                        tag_start,
                        vec![Parameter::node(ParameterRole::Value, value.id)],
                    ),
                    tag_start,
                )?;
                self.pos = end.close_offset + 1;
            }
            Directive::Ftl => self.ftl_header(tag_start, name_end)?,
        }
        Ok(())
    }

    /// `<#macro name(a, b=1, rest...)>`; the parentheses and the commas are
    /// optional.
    fn macro_definition(
        &mut self,
        directive: Directive,
        tag_start: usize,
        name_end: usize,
    ) -> Result<(), ConvertError> {
        let (key, subtype, what) = if directive == Directive::Macro {
            (EndTagKey::Macro, 0, "#macro")
        } else {
            (EndTagKey::Function, 1, "#function")
        };
        if self.inside(|b| matches!(b, Block::Plain(ElementKind::Macro, _))) {
            return Err(self.doc.syntax_error(
                "Macros and functions can't be defined inside each other",
                to_source_span(tag_start, name_end),
            ));
        }
        let target_start = self.skip_ws(name_end)?;
        let target_end = self
            .doc
            .position_after_assignment_target(target_start)
            .map_err(|e| self.scan_error(e))?;
        let mut params = vec![Parameter::string(
            ParameterRole::AssignmentTarget,
            &self.doc.text()[target_start..target_end],
        )];

        let mut p = self.skip_ws(target_end)?;
        let parenthesized = self.doc.char_at(p) == Some('(');
        if parenthesized {
            p = self.skip_ws(p + 1)?;
        }
        let mut catch_all = None;
        loop {
            if parenthesized && self.doc.char_at(p) == Some(')') {
                p += 1;
                break;
            }
            if !parenthesized && self.doc.scan_tag_end(p).is_ok() {
                break;
            }
            if catch_all.is_some() {
                return Err(self.doc.syntax_error(
                    "The catch-all parameter must be the last one",
                    to_source_span(p, p + 1),
                ));
            }
            let param_end = self.identifier_end(p)?;
            let name = self.doc.text()[p..param_end].to_string();
            let q = self.skip_ws(param_end)?;
            if self.doc.starts_with_at(q, "...") {
                catch_all = Some(name);
                p = self.skip_ws(q + 3)?;
            } else if self.doc.char_at(q) == Some('=') && self.doc.char_at(q + 1) != Some('=') {
                let default = self.expression(q + 1, true)?;
                params.push(Parameter::string(ParameterRole::ParameterName, name));
                params.push(Parameter::node(ParameterRole::ParameterDefault, default.id));
                p = self.skip_ws(default.end)?;
            } else {
                params.push(Parameter::string(ParameterRole::ParameterName, name));
                params.push(Parameter::new(ParameterRole::ParameterDefault, ParamValue::Null));
                p = q;
            }
            if self.doc.char_at(p) == Some(',') {
                p = self.skip_ws(p + 1)?;
            }
        }
        params.push(Parameter::new(
            ParameterRole::CatchAllParameterName,
            catch_all.map_or(ParamValue::Null, ParamValue::Str),
        ));
        params.push(Parameter::int(ParameterRole::AstNodeSubtype, subtype));

        let end = self.block_tag_end(p, what)?;
        self.open(
            Frame::new(Block::Plain(ElementKind::Macro, key), tag_start, params),
            tag_start,
        )?;
        self.pos = end.close_offset + 1;
        Ok(())
    }

    /// Expressions separated by optional commas, up to the tag end or a `;`.
    /// Returns the offset after the last one.
    fn positional_values(
        &mut self,
        from: usize,
        role: ParameterRole,
        params: &mut Vec<Parameter>,
    ) -> Result<usize, ConvertError> {
        let mut p = from;
        let mut first = true;
        loop {
            let q = self.skip_ws(p)?;
            if self.doc.scan_tag_end(p).is_ok() || self.doc.char_at(q) == Some(';') {
                return Ok(p);
            }
            let start = if !first && self.doc.char_at(q) == Some(',') {
                q + 1
            } else {
                q
            };
            let value = self.expression(start, true)?;
            params.push(Parameter::node(role, value.id));
            p = value.end;
            first = false;
        }
    }

    fn include(&mut self, tag_start: usize, name_end: usize) -> Result<(), ConvertError> {
        let path = self.expression(name_end, true)?;
        let option_names = self.dialect.include_options();
        let mut options: [Option<NodeId>; 3] = [None; 3];
        let mut p = path.end;
        let end = loop {
            if let Ok(end) = self.tag_end(p) {
                break end;
            }
            let option_start = self.skip_ws(p)?;
            let option_end = self.identifier_end(option_start)?;
            let option = &self.doc.text()[option_start..option_end];
            let slot = option_names
                .iter()
                .position(|names| names.contains(&option))
                .ok_or_else(|| {
                    self.doc.syntax_error(
                        format!("Unsupported #include parameter: {}", option),
                        to_source_span(option_start, option_end),
                    )
                })?;
            let eq = self.skip_ws(option_end)?;
            self.expect_char(eq, '=')?;
            let value = self.expression(eq + 1, true)?;
            if options[slot].replace(value.id).is_some() {
                return Err(self.doc.syntax_error(
                    format!("Duplicate #include parameter: {}", option),
                    to_source_span(option_start, option_end),
                ));
            }
            p = value.end;
        };
        let [parse, encoding, ignore_missing] = options;
        let node = self
            .leaf(ElementKind::Include, tag_start, &end)
            .with_param(ParameterRole::TemplateName, ParamValue::Node(path.id))
            .with_param(
                ParameterRole::ParseParameter,
                parse.map_or(ParamValue::Null, ParamValue::Node),
            )
            .with_param(
                ParameterRole::EncodingParameter,
                encoding.map_or(ParamValue::Null, ParamValue::Node),
            )
            .with_param(
                ParameterRole::IgnoreMissingParameter,
                ignore_missing.map_or(ParamValue::Null, ParamValue::Node),
            );
        self.finish_leaf(node, tag_start, &end)
    }

    /// `<#ftl name=value ...>`, allowed once, before anything but
    /// whitespace and comments.
    fn ftl_header(&mut self, tag_start: usize, name_end: usize) -> Result<(), ConvertError> {
        let first = self.stack.is_empty()
            && self.root_children.iter().all(|&id| {
                let node = self.tree.node(id);
                match node.element_kind() {
                    Some(ElementKind::Comment) => true,
                    Some(ElementKind::TextBlock) => node
                        .params
                        .first()
                        .is_some_and(|p| matches!(&p.value, ParamValue::Str(t) if t.trim().is_empty())),
                    _ => false,
                }
            });
        if !first {
            return Err(self.doc.syntax_error(
                "#ftl must be the first directive of the template",
                to_source_span(tag_start, name_end),
            ));
        }
        let mut params = Vec::new();
        let mut p = name_end;
        let end = loop {
            if let Ok(end) = self.tag_end(p) {
                break end;
            }
            let arg_start = self.skip_ws(p)?;
            let arg_end = self.identifier_end(arg_start)?;
            let arg = &self.doc.text()[arg_start..arg_end];
            if !self.dialect.is_ftl_parameter(arg) {
                return Err(self.doc.syntax_error(
                    format!("Unknown #ftl parameter: {}", arg),
                    to_source_span(arg_start, arg_end),
                ));
            }
            params.push(Parameter::string(ParameterRole::ArgumentName, arg));
            let eq = self.skip_ws(arg_end)?;
            self.expect_char(eq, '=')?;
            let value = self.expression(eq + 1, true)?;
            params.push(Parameter::node(ParameterRole::ArgumentValue, value.id));
            p = value.end;
        };
        let mut node = self.leaf(ElementKind::FtlHeader, tag_start, &end);
        node.params = params;
        self.finish_leaf(node, tag_start, &end)
    }

    // ========================================================================
    // USER-DEFINED DIRECTIVE CALLS
    // ========================================================================

    /// `<@name args; loopVars>`, self-closing or with a body.
    fn user_directive_call(&mut self) -> Result<(), ConvertError> {
        let tag_start = self.pos;
        let callee = parse_callee(&self.doc, &mut self.tree, self.dialect, tag_start + 2)?;
        let mut params = vec![Parameter::node(ParameterRole::Callee, callee.id)];
        let mut p = callee.end;

        let first = self.skip_ws(p)?;
        if self.named_argument_at(first) {
            loop {
                let mut q = self.skip_ws(p)?;
                if params.len() > 1 && self.doc.char_at(q) == Some(',') {
                    q = self.skip_ws(q + 1)?;
                }
                if !self.named_argument_at(q) {
                    break;
                }
                let name_end = self.identifier_end(q)?;
                params.push(Parameter::string(
                    ParameterRole::ArgumentName,
                    &self.doc.text()[q..name_end],
                ));
                let eq = self.skip_ws(name_end)?;
                let value = self.expression(eq + 1, true)?;
                params.push(Parameter::node(ParameterRole::ArgumentValue, value.id));
                p = value.end;
            }
        } else {
            p = self.positional_values(p, ParameterRole::ArgumentValue, &mut params)?;
        }

        let q = self.skip_ws(p)?;
        if self.doc.char_at(q) == Some(';') {
            let mut var_start = self.skip_ws(q + 1)?;
            loop {
                let var_end = self.identifier_end(var_start)?;
                params.push(Parameter::string(
                    ParameterRole::TargetLoopVariable,
                    &self.doc.text()[var_start..var_end],
                ));
                p = var_end;
                let after = self.skip_ws(var_end)?;
                if self.doc.char_at(after) != Some(',') {
                    break;
                }
                var_start = self.skip_ws(after + 1)?;
            }
        }

        let end = self.tag_end(p)?;
        if end.self_closing {
            let mut node = self.leaf(ElementKind::UnifiedCall, tag_start, &end);
            node.params = params;
            return self.finish_leaf(node, tag_start, &end);
        }
        let callee_text = self.doc.text()[callee.start..callee.end].to_string();
        self.open(
            Frame::new(
                Block::UserDirective {
                    callee: callee_text,
                },
                tag_start,
                params,
            ),
            tag_start,
        )?;
        self.pos = end.close_offset + 1;
        Ok(())
    }

    /// `name =` (but not `name ==`) at `at`.
    fn named_argument_at(&self, at: usize) -> bool {
        let Ok(name_end) = self.doc.position_after_identifier(at) else {
            return false;
        };
        let Ok(eq) = self.doc.position_after_ws_and_comments(name_end) else {
            return false;
        };
        self.doc.char_at(eq) == Some('=') && self.doc.char_at(eq + 1) != Some('=')
    }

    /// `</@>` or `</@name>`, where the name must be the callee of the open
    /// call.
    fn user_directive_end(&mut self) -> Result<(), ConvertError> {
        let tag_start = self.pos;
        let text = self.doc.text();
        let name_start = tag_start + 3;
        let name_end = text[name_start..]
            .find(|c: char| c.is_whitespace() || self.doc.is_tag_end_char(c))
            .map_or(text.len(), |i| name_start + i);
        let name = &text[name_start..name_end];
        let close = text[name_end..]
            .find(|c: char| !c.is_whitespace())
            .map_or(text.len(), |i| name_end + i);
        self.expect_tag_end_char(close)?;
        self.close_implicit_sep(tag_start)?;

        match self.stack.pop() {
            Some(Frame {
                block: Block::UserDirective { callee },
                start,
                params,
                children,
            }) if name.is_empty() || name == callee => {
                let close_pos = self.doc.position_of(close);
                let id = self.build_block(ElementKind::UnifiedCall, start, close_pos, params, children);
                self.pos = close + 1;
                self.children_mut().push(id);
                Ok(())
            }
            open => {
                let message = match open {
                    Some(Frame {
                        block: Block::UserDirective { callee },
                        ..
                    }) => format!("End tag </@{}> doesn't match the open <@{}> call", name, callee),
                    Some(frame) => format!(
                        "End tag </@{}> doesn't match the open {} directive",
                        name,
                        frame.block.describe()
                    ),
                    None => format!("End tag </@{}> has no matching start tag", name),
                };
                Err(self
                    .doc
                    .syntax_error(message, to_source_span(tag_start, close + 1)))
            }
        }
    }

    fn assignment(
        &mut self,
        scope: i64,
        key: EndTagKey,
        tag_start: usize,
        name_end: usize,
    ) -> Result<(), ConvertError> {
        struct Item {
            start: usize,
            end: usize,
            target: String,
            operator: &'static str,
            source: Option<NodeId>,
        }

        let mut items: Vec<Item> = Vec::new();
        let mut namespace = None;
        let mut p = self.skip_ws(name_end)?;
        let block_target = loop {
            let target_start = p;
            let target_end = self
                .doc
                .position_after_assignment_target(p)
                .map_err(|e| self.scan_error(e))?;
            let target = self.doc.text()[target_start..target_end].to_string();
            p = self.skip_ws(target_end)?;
            let operator = ASSIGNMENT_OPERATORS
                .iter()
                .copied()
                .find(|op| self.doc.starts_with_at(p, op));
            let Some(operator) = operator else {
                if items.is_empty() {
                    break Some(target);
                }
                return Err(self.unexpected(p, "an assignment operator"));
            };
            let (source, end) = if operator == "++" || operator == "--" {
                (None, p + operator.len())
            } else {
                let source = self.expression(p + operator.len(), true)?;
                (Some(source.id), source.end)
            };
            items.push(Item {
                start: target_start,
                end,
                target,
                operator,
                source,
            });
            p = self.skip_ws(end)?;
            if self.doc.char_at(p) == Some(',') {
                p = self.skip_ws(p + 1)?;
                continue;
            }
            if self.keyword_at(p, "in") || self.doc.scan_tag_end(p).is_ok() {
                break None;
            }
        };

        if self.keyword_at(p, "in") {
            let ns = self.expression(p + 2, true)?;
            namespace = Some(ns.id);
            p = ns.end;
        }

        if let Some(target) = block_target {
            let end = self.block_tag_end(p, "block assignment")?;
            self.open(
                Frame::new(
                    Block::BlockAssignment(key),
                    tag_start,
                    vec![
                        Parameter::string(ParameterRole::AssignmentTarget, target),
                        Parameter::int(ParameterRole::VariableScope, scope),
                        Parameter::optional_node(ParameterRole::Namespace, namespace),
                    ],
                ),
                tag_start,
            )?;
            self.pos = end.close_offset + 1;
            return Ok(());
        }

        let end = self.tag_end(p)?;
        let assignment_params = |item: &Item, namespace: Option<NodeId>| {
            vec![
                Parameter::string(ParameterRole::AssignmentTarget, item.target.clone()),
                Parameter::string(ParameterRole::AssignmentOperator, item.operator),
                Parameter::optional_node(ParameterRole::AssignmentSource, item.source),
                Parameter::int(ParameterRole::VariableScope, scope),
                Parameter::optional_node(ParameterRole::Namespace, namespace),
            ]
        };
        let node = if let [item] = items.as_slice() {
            let mut node = self.leaf(ElementKind::Assignment, tag_start, &end);
            node.params = assignment_params(item, namespace);
            node
        } else {
            let mut children = Vec::with_capacity(items.len());
            for item in &items {
                let mut child = Node::new(
                    NodeKind::Element(ElementKind::Assignment),
                    self.doc.position_of(item.start),
                    self.doc.last_char_position(item.end),
                );
                child.params = assignment_params(item, None);
                children.push(self.tree.push(child));
            }
            let mut node = self
                .leaf(ElementKind::AssignmentInstruction, tag_start, &end)
                .with_param(ParameterRole::VariableScope, ParamValue::Int(scope))
                .with_param(
                    ParameterRole::Namespace,
                    namespace.map_or(ParamValue::Null, ParamValue::Node),
                );
            node.children = children;
            node
        };
        self.finish_leaf(node, tag_start, &end)
    }

    fn recover(&mut self, tag_start: usize, name_end: usize) -> Result<(), ConvertError> {
        let Some(Frame {
            block:
                Block::Attempt {
                    content_start,
                    attempted: attempted @ None,
                },
            children,
            ..
        }) = self.stack.last_mut()
        else {
            return Err(self.doc.syntax_error(
                "#recover must be directly inside #attempt",
                to_source_span(tag_start, name_end),
            ));
        };
        let content_start = *content_start;
        let children = std::mem::take(children);
        let end = if tag_start > content_start {
            self.doc.last_char_position(tag_start)
        } else {
            self.doc.position_of(content_start)
        };
        let mut content = Node::new(
            NodeKind::Element(ElementKind::MixedContent),
            self.doc.position_of(content_start),
            end,
        );
        content.children = children;
        let content = self.tree.push(content);
        *attempted = Some(content);

        let tag = self.block_tag_end(name_end, "#recover")?;
        self.stack.push(Frame::new(Block::Recover, tag_start, Vec::new()));
        self.pos = tag.close_offset + 1;
        Ok(())
    }

    fn noparse(&mut self, tag_start: usize, name_end: usize) -> Result<(), ConvertError> {
        let start_tag = self.block_tag_end(name_end, "#noparse")?;
        let content_start = start_tag.close_offset + 1;
        let open = self.doc.open_char();
        let text = self.doc.text();
        let found = self
            .dialect
            .noparse_names()
            .iter()
            .filter_map(|name| {
                let marker = format!("{}/#{}", open, name);
                let mut from = content_start;
                while let Some(i) = text[from..].find(&marker) {
                    let at = from + i;
                    let after = at + marker.len();
                    let close = text[after..]
                        .find(|c: char| !c.is_whitespace())
                        .map(|j| after + j);
                    if let Some(close) = close.filter(|&c| self.doc.char_at(c) == Some(self.doc.close_char())) {
                        return Some((at, close));
                    }
                    from = after;
                }
                None
            })
            .min();
        let Some((end_tag_start, close)) = found else {
            return Err(self.doc.syntax_error(
                "Unclosed #noparse directive",
                to_source_span(tag_start, name_end),
            ));
        };
        let content = self.doc.slice_offsets(content_start, end_tag_start)?;
        let node = Node::new(
            NodeKind::Element(ElementKind::TextBlock),
            self.doc.position_of(tag_start),
            self.doc.position_of(close),
        )
        .with_param(ParameterRole::Content, ParamValue::Str(content.to_string()));
        self.pos = close + 1;
        self.attach(node, tag_start, false)
    }

    fn loop_variables(
        &mut self,
        from: usize,
        params: &mut Vec<Parameter>,
    ) -> Result<usize, ConvertError> {
        let mut p = self.skip_ws(from)?;
        loop {
            let end = self.identifier_end(p)?;
            params.push(Parameter::string(
                ParameterRole::TargetLoopVariable,
                &self.doc.text()[p..end],
            ));
            let after = self.skip_ws(end)?;
            let declared = params
                .iter()
                .filter(|p| p.role == ParameterRole::TargetLoopVariable)
                .count();
            if self.doc.char_at(after) == Some(',') && declared < 2 {
                p = self.skip_ws(after + 1)?;
            } else {
                return Ok(end);
            }
        }
    }

    // ========================================================================
    // END TAGS
    // ========================================================================

    fn end_tag(&mut self) -> Result<(), ConvertError> {
        let tag_start = self.pos;
        let name_end = self.name_end(tag_start + 3);
        let name = &self.doc.text()[tag_start + 3..name_end];
        let close = self.doc.text()[name_end..]
            .find(|c: char| !c.is_whitespace())
            .map_or(self.doc.len(), |i| name_end + i);
        self.expect_tag_end_char(close)?;
        let key = self.dialect.end_tag(name).ok_or_else(|| {
            self.doc.syntax_error(
                format!("Unknown {} end tag: </#{}>", self.dialect, name),
                to_source_span(tag_start, close + 1),
            )
        })?;
        tracing::trace!(?key, offset = tag_start, "end tag");

        // #sep and #case have optional end tags; their parent's end tag
        // closes them.
        loop {
            match self.stack.last().map(|f| &f.block) {
                Some(Block::Sep) if key != EndTagKey::Sep => self.close_implicit_sep(tag_start)?,
                Some(Block::Case) if key == EndTagKey::Switch => {
                    let frame = self.pop()?;
                    self.close_frame_before(frame, tag_start)?;
                }
                _ => break,
            }
        }

        let close_pos = self.doc.position_of(close);
        let mismatch = |this: &Self, open: Option<&Block>| {
            let message = match open {
                Some(block) => format!(
                    "End tag </#{}> doesn't match the open {} directive",
                    name,
                    block.describe()
                ),
                None => format!("End tag </#{}> has no matching start tag", name),
            };
            this.doc
                .syntax_error(message, to_source_span(tag_start, close + 1))
        };

        let frame = match self.stack.pop() {
            Some(frame) => frame,
            None => return Err(mismatch(self, None)),
        };
        let id = match (frame.block, key) {
            (Block::Branch, EndTagKey::If) => {
                let Some(Frame {
                    block: Block::IfChain { mut branches, .. },
                    start: chain_start,
                    ..
                }) = self.stack.pop()
                else {
                    return Err(self.doc.internal_error(
                        "#if branch without its chain",
                        to_source_span(tag_start, close + 1),
                    ));
                };
                if branches.is_empty() {
                    self.build_block(
                        ElementKind::ConditionalBlock,
                        frame.start,
                        close_pos,
                        frame.params,
                        frame.children,
                    )
                } else {
                    let last = self.build_block(
                        ElementKind::ConditionalBlock,
                        frame.start,
                        self.doc.last_char_position(tag_start),
                        frame.params,
                        frame.children,
                    );
                    branches.push(last);
                    self.build_block(
                        ElementKind::IfBlock,
                        chain_start,
                        close_pos,
                        Vec::new(),
                        branches,
                    )
                }
            }
            (Block::Iterator(style), EndTagKey::List) => self.build_block(
                ElementKind::IteratorBlock(style),
                frame.start,
                close_pos,
                frame.params,
                frame.children,
            ),
            (Block::ElseOfList, EndTagKey::List) => {
                let else_of_list = self.build_block(
                    ElementKind::ElseOfList,
                    frame.start,
                    self.doc.last_char_position(tag_start),
                    frame.params,
                    frame.children,
                );
                let Some(Frame {
                    block: Block::ListElse { iterator },
                    start: list_start,
                    ..
                }) = self.stack.pop()
                else {
                    return Err(self.doc.internal_error(
                        "#else of #list without its list",
                        to_source_span(tag_start, close + 1),
                    ));
                };
                self.build_block(
                    ElementKind::ListElseContainer,
                    list_start,
                    close_pos,
                    Vec::new(),
                    vec![iterator, else_of_list],
                )
            }
            (Block::Items, EndTagKey::Items) => self.build_block(
                ElementKind::Items,
                frame.start,
                close_pos,
                frame.params,
                frame.children,
            ),
            (Block::Sep, EndTagKey::Sep) => self.build_block(
                ElementKind::Sep,
                frame.start,
                close_pos,
                frame.params,
                frame.children,
            ),
            (Block::Recover, EndTagKey::Attempt) => {
                let recovery = self.build_block(
                    ElementKind::RecoveryBlock,
                    frame.start,
                    self.doc.last_char_position(tag_start),
                    Vec::new(),
                    frame.children,
                );
                let Some(Frame {
                    block:
                        Block::Attempt {
                            attempted: Some(attempted),
                            ..
                        },
                    start: attempt_start,
                    ..
                }) = self.stack.pop()
                else {
                    return Err(self.doc.internal_error(
                        "#recover without its #attempt",
                        to_source_span(tag_start, close + 1),
                    ));
                };
                self.build_block(
                    ElementKind::AttemptBlock,
                    attempt_start,
                    close_pos,
                    vec![Parameter::node(ParameterRole::ErrorHandler, recovery)],
                    vec![attempted, recovery],
                )
            }
            (Block::Attempt { .. }, EndTagKey::Attempt) => {
                return Err(self.doc.syntax_error(
                    "#attempt needs a #recover",
                    to_source_span(frame.start, frame.start + 1),
                ))
            }
            (Block::Plain(kind, expected), key) if expected == key => {
                self.build_block(kind, frame.start, close_pos, frame.params, frame.children)
            }
            (Block::BlockAssignment(expected), key) if expected == key => self.build_block(
                ElementKind::BlockAssignment,
                frame.start,
                close_pos,
                frame.params,
                frame.children,
            ),
            (Block::Switch, EndTagKey::Switch) => self.build_block(
                ElementKind::SwitchBlock,
                frame.start,
                close_pos,
                frame.params,
                frame.children,
            ),
            (block, _) => return Err(mismatch(self, Some(&block))),
        };
        self.pos = close + 1;
        self.children_mut().push(id);
        Ok(())
    }

    // ========================================================================
    // FRAMES
    // ========================================================================

    fn open(&mut self, frame: Frame, at: usize) -> Result<(), ConvertError> {
        self.check_switch_content(at, false)?;
        self.stack.push(frame);
        Ok(())
    }

    fn pop(&mut self) -> Result<Frame, ConvertError> {
        let at = self.pos;
        self.stack.pop().ok_or_else(|| {
            self.doc
                .internal_error("No open directive", to_source_span(at, at))
        })
    }

    /// Closes the current `#if` branch right before the tag at `tag_start`
    /// and hands it to its chain.
    fn close_branch(&mut self, tag_start: usize, what: &str) -> Result<(), ConvertError> {
        let in_branch = matches!(self.stack.last().map(|f| &f.block), Some(Block::Branch));
        let chain_has_else = matches!(
            self.stack.iter().rev().nth(1).map(|f| &f.block),
            Some(Block::IfChain {
                seen_else: true,
                ..
            })
        );
        if !in_branch || chain_has_else {
            let message = if in_branch {
                format!("{} can't follow #else", what)
            } else {
                format!("{} must be inside #if", what)
            };
            return Err(self
                .doc
                .syntax_error(message, to_source_span(tag_start, tag_start + 1)));
        }
        let frame = self.pop()?;
        let branch = self.build_block(
            ElementKind::ConditionalBlock,
            frame.start,
            self.doc.last_char_position(tag_start),
            frame.params,
            frame.children,
        );
        if let Some(Frame {
            block: Block::IfChain {
                branches,
                seen_else,
            },
            ..
        }) = self.stack.last_mut()
        {
            branches.push(branch);
            *seen_else = what == "#else";
        }
        Ok(())
    }

    fn close_implicit_sep(&mut self, before: usize) -> Result<(), ConvertError> {
        if matches!(self.stack.last().map(|f| &f.block), Some(Block::Sep)) {
            let frame = self.pop()?;
            self.close_frame_before(frame, before)?;
        }
        Ok(())
    }

    /// Turns a frame whose end tag is optional into a node ending right
    /// before `before`.
    fn close_frame_before(&mut self, frame: Frame, before: usize) -> Result<(), ConvertError> {
        let kind = match frame.block {
            Block::Sep => ElementKind::Sep,
            Block::Case => ElementKind::Case,
            other => {
                return Err(self.doc.internal_error(
                    format!("{} has a mandatory end tag", other.describe()),
                    to_source_span(frame.start, frame.start + 1),
                ))
            }
        };
        let id = self.build_block(
            kind,
            frame.start,
            self.doc.last_char_position(before),
            frame.params,
            frame.children,
        );
        self.children_mut().push(id);
        Ok(())
    }

    fn build_block(
        &mut self,
        kind: ElementKind,
        start: usize,
        end: Position,
        params: Vec<Parameter>,
        children: Vec<NodeId>,
    ) -> NodeId {
        let mut node = Node::new(NodeKind::Element(kind), self.doc.position_of(start), end);
        node.params = params;
        node.children = children;
        self.tree.push(node)
    }

    fn children_mut(&mut self) -> &mut Vec<NodeId> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.children,
            None => &mut self.root_children,
        }
    }

    fn inside(&self, predicate: impl Fn(&Block) -> bool) -> bool {
        self.stack.iter().any(|frame| predicate(&frame.block))
    }

    /// Directly inside `#switch`, only whitespace and comments may precede
    /// the first `#case`.
    fn check_switch_content(&self, at: usize, ignorable: bool) -> Result<(), ConvertError> {
        if !ignorable && matches!(self.stack.last().map(|f| &f.block), Some(Block::Switch)) {
            return Err(self.doc.syntax_error(
                "Only #case and #default can appear directly inside #switch",
                to_source_span(at, at + 1),
            ));
        }
        Ok(())
    }

    fn attach(&mut self, node: Node, at: usize, ignorable: bool) -> Result<(), ConvertError> {
        self.check_switch_content(at, ignorable)?;
        let id = self.tree.push(node);
        self.children_mut().push(id);
        Ok(())
    }

    fn leaf(&self, kind: ElementKind, tag_start: usize, end: &TagEnd<'_>) -> Node {
        Node::new(
            NodeKind::Element(kind),
            self.doc.position_of(tag_start),
            self.doc.position_of(end.close_offset),
        )
    }

    fn finish_leaf(
        &mut self,
        node: Node,
        tag_start: usize,
        end: &TagEnd<'_>,
    ) -> Result<(), ConvertError> {
        self.pos = end.close_offset + 1;
        self.attach(node, tag_start, false)
    }

    // ========================================================================
    // SCANNING UTILITIES
    // ========================================================================

    fn expression(&mut self, from: usize, in_tag: bool) -> Result<Built, ConvertError> {
        let start = self.skip_ws(from)?;
        let in_angle_tag = in_tag && self.doc.tag_syntax() == TagSyntax::AngleBracket;
        parse_expression(&self.doc, &mut self.tree, self.dialect, start, in_angle_tag)
    }

    fn skip_ws(&self, from: usize) -> Result<usize, ConvertError> {
        self.doc
            .position_after_ws_and_comments(from)
            .map_err(|e| self.scan_error(e))
    }

    fn tag_end(&self, from: usize) -> Result<TagEnd<'a>, ConvertError> {
        let end = self
            .doc
            .scan_tag_end(from)
            .map_err(|e| self.scan_error(e))?;
        self.expect_tag_end_char(end.close_offset)?;
        Ok(end)
    }

    /// Like [`Self::tag_end`], for directives that must have an end tag.
    fn block_tag_end(&self, from: usize, what: &str) -> Result<TagEnd<'a>, ConvertError> {
        let end = self.tag_end(from)?;
        if end.self_closing {
            return Err(self.doc.syntax_error(
                format!("A {} start tag can't be self-closing", what),
                to_source_span(end.close_offset - 1, end.close_offset + 1),
            ));
        }
        Ok(end)
    }

    fn expect_tag_end_char(&self, at: usize) -> Result<(), ConvertError> {
        let close = self.doc.close_char();
        match self.doc.char_at(at) {
            Some(c) if c == close => Ok(()),
            Some(']') if self.dialect.allows_bracket_tag_end() => Ok(()),
            _ => Err(self.unexpected(at, &format!("{:?}", close))),
        }
    }

    fn expect_char(&self, at: usize, expected: char) -> Result<(), ConvertError> {
        if self.doc.char_at(at) == Some(expected) {
            Ok(())
        } else {
            Err(self.unexpected(at, &format!("{:?}", expected)))
        }
    }

    fn keyword_at(&self, at: usize, keyword: &str) -> bool {
        self.doc.starts_with_at(at, keyword)
            && !self
                .doc
                .char_at(at + keyword.len())
                .is_some_and(is_identifier_part)
    }

    fn identifier_end(&self, start: usize) -> Result<usize, ConvertError> {
        self.doc
            .position_after_identifier(start)
            .map_err(|e| self.scan_error(e))
    }

    fn name_end(&self, from: usize) -> usize {
        self.doc.text()[from..]
            .find(|c: char| !is_core_name_char(c))
            .map_or(self.doc.len(), |i| from + i)
    }

    fn unexpected(&self, at: usize, expected: &str) -> ConvertError {
        let found = self
            .doc
            .char_at(at)
            .map_or_else(|| "end of input".to_string(), |c| format!("{:?}", c));
        self.doc.syntax_error(
            format!("Expected {}, found {}", expected, found),
            to_source_span(at, (at + 1).min(self.doc.len())),
        )
    }

    fn scan_error(&self, error: ScanError) -> ConvertError {
        let at = error.offset(self.doc.len());
        self.doc.syntax_error(
            error.to_string(),
            to_source_span(at, (at + 1).min(self.doc.len())),
        )
    }
}
