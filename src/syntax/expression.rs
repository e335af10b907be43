//! Expression front-end.
//!
//! Runs the pest grammar over the text starting at one expression and turns
//! the resulting pairs into arena nodes. Spans are computed bottom-up from
//! token pairs, so they never include the whitespace pest skips after the
//! last token.

use pest::error::{ErrorVariant, InputLocation};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{
    ArithmeticOperator, ExpressionKind, Node, NodeId, NodeKind, Parameter, ParameterRole, Sign,
    TreeBuilder,
};
use crate::errors::{to_source_span, ConvertError, ErrorReporting};
use crate::source::SourceDocument;

use super::dialect::Dialect;

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct ExpressionParser;

/// A freshly built expression node and its byte span (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Built {
    pub id: NodeId,
    pub start: usize,
    pub end: usize,
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses the expression starting exactly at `start`.
///
/// `in_angle_tag` selects the variant where a top-level `>` ends the tag
/// instead of comparing.
pub fn parse_expression(
    doc: &SourceDocument<'_>,
    tree: &mut TreeBuilder,
    dialect: Dialect,
    start: usize,
    in_angle_tag: bool,
) -> Result<Built, ConvertError> {
    let rule = if in_angle_tag {
        Rule::tag_expression
    } else {
        Rule::expression
    };
    parse_rule(doc, tree, dialect, start, rule)
}

/// The name of a user-defined directive call, as in `<@my.macro x=1/>`.
pub fn parse_callee(
    doc: &SourceDocument<'_>,
    tree: &mut TreeBuilder,
    dialect: Dialect,
    start: usize,
) -> Result<Built, ConvertError> {
    parse_rule(doc, tree, dialect, start, Rule::callee)
}

fn parse_rule(
    doc: &SourceDocument<'_>,
    tree: &mut TreeBuilder,
    dialect: Dialect,
    start: usize,
    rule: Rule,
) -> Result<Built, ConvertError> {
    let input = doc.text().get(start..).unwrap_or("");
    let mut pairs = ExpressionParser::parse(rule, input)
        .map_err(|e| convert_parse_error(doc, start, e))?;
    let pair = pairs.next().ok_or_else(|| {
        doc.internal_error(
            "Expression parser produced no result",
            to_source_span(start, start),
        )
    })?;
    let mut builder = ExpressionBuilder {
        doc,
        tree,
        dialect,
        base: start,
    };
    builder.build(pair)
}

/// `foo\-bar` → `foo-bar`
pub fn unescape_identifier(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// AST BUILDERS
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum BinaryLevel {
    Or,
    And,
    Comparison,
    Additive,
    Multiplicative,
}

struct ExpressionBuilder<'t, 'a> {
    doc: &'t SourceDocument<'a>,
    tree: &'t mut TreeBuilder,
    dialect: Dialect,
    base: usize,
}

impl ExpressionBuilder<'_, '_> {
    fn build(&mut self, pair: Pair<'_, Rule>) -> Result<Built, ConvertError> {
        match pair.as_rule() {
            Rule::expression | Rule::tag_expression => {
                let (start, _) = self.span(&pair);
                let inner = self.next(&mut pair.into_inner(), start)?;
                self.build(inner)
            }
            Rule::or_expr | Rule::tag_or_expr => self.build_binary(pair, BinaryLevel::Or),
            Rule::and_expr | Rule::tag_and_expr => self.build_binary(pair, BinaryLevel::And),
            Rule::comparison | Rule::tag_comparison => {
                self.build_binary(pair, BinaryLevel::Comparison)
            }
            Rule::range => self.build_range(pair),
            Rule::additive => self.build_binary(pair, BinaryLevel::Additive),
            Rule::multiplicative => self.build_binary(pair, BinaryLevel::Multiplicative),
            Rule::unary => self.build_unary(pair),
            Rule::default_expr => self.build_default(pair),
            Rule::postfix_expr | Rule::callee => self.build_postfix(pair),
            Rule::parenthetical => {
                let (start, _) = self.span(&pair);
                let mut inner = pair.into_inner();
                let _open = self.next(&mut inner, start)?;
                let enclosed = self.next(&mut inner, start)?;
                let enclosed = self.build(enclosed)?;
                let close = self.next(&mut inner, start)?;
                let end = self.span(&close).1;
                Ok(self.push(
                    ExpressionKind::Parenthetical,
                    start,
                    end,
                    vec![Parameter::node(ParameterRole::EnclosedOperand, enclosed.id)],
                ))
            }
            Rule::list_literal => {
                let (start, _) = self.span(&pair);
                let mut params = Vec::new();
                let mut end = start;
                for item in pair.into_inner() {
                    match item.as_rule() {
                        Rule::lbracket => {}
                        Rule::rbracket => end = self.span(&item).1,
                        _ => {
                            let value = self.build(item)?;
                            params.push(Parameter::node(ParameterRole::ItemValue, value.id));
                        }
                    }
                }
                Ok(self.push(ExpressionKind::ListLiteral, start, end, params))
            }
            Rule::hash_literal => {
                let (start, _) = self.span(&pair);
                let mut params = Vec::new();
                let mut end = start;
                for item in pair.into_inner() {
                    match item.as_rule() {
                        Rule::lbrace => {}
                        Rule::rbrace => end = self.span(&item).1,
                        _ => {
                            let entry_start = self.span(&item).0;
                            let mut entry = item.into_inner();
                            let key = self.next(&mut entry, entry_start)?;
                            let key = self.build(key)?;
                            let value = self.next(&mut entry, entry_start)?;
                            let value = self.build(value)?;
                            params.push(Parameter::node(ParameterRole::ItemKey, key.id));
                            params.push(Parameter::node(ParameterRole::ItemValue, value.id));
                        }
                    }
                }
                Ok(self.push(ExpressionKind::HashLiteral, start, end, params))
            }
            Rule::builtin_variable => {
                let (start, end) = self.span(&pair);
                let mut inner = pair.into_inner();
                let _dot = self.next(&mut inner, start)?;
                let name = self.next(&mut inner, start)?;
                Ok(self.push(
                    ExpressionKind::BuiltinVariable,
                    start,
                    end,
                    vec![Parameter::string(ParameterRole::Content, name.as_str())],
                ))
            }
            Rule::number => {
                let (start, end) = self.span(&pair);
                Ok(self.push(
                    ExpressionKind::NumberLiteral {
                        text: pair.as_str().to_string(),
                    },
                    start,
                    end,
                    Vec::new(),
                ))
            }
            Rule::boolean => {
                let (start, end) = self.span(&pair);
                Ok(self.push(
                    ExpressionKind::BooleanLiteral {
                        value: pair.as_str() == "true",
                    },
                    start,
                    end,
                    Vec::new(),
                ))
            }
            Rule::string_literal => {
                let (start, end) = self.span(&pair);
                Ok(self.push(
                    ExpressionKind::StringLiteral {
                        text: pair.as_str().to_string(),
                    },
                    start,
                    end,
                    Vec::new(),
                ))
            }
            Rule::identifier => {
                let (start, end) = self.span(&pair);
                Ok(self.push(
                    ExpressionKind::Identifier {
                        name: unescape_identifier(pair.as_str()),
                    },
                    start,
                    end,
                    Vec::new(),
                ))
            }
            rule => {
                let (start, end) = self.span(&pair);
                Err(self.doc.internal_error(
                    format!("Unexpected grammar rule {:?} in expression", rule),
                    to_source_span(start, end),
                ))
            }
        }
    }

    fn build_binary(
        &mut self,
        pair: Pair<'_, Rule>,
        level: BinaryLevel,
    ) -> Result<Built, ConvertError> {
        let (start, _) = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = self.next(&mut inner, start)?;
        let mut lhs = self.build(first)?;
        while let Some(op) = inner.next() {
            let operand = self.next(&mut inner, start)?;
            let rhs = self.build(operand)?;
            let (kind, subtype) = self.binary_kind(level, &op)?;
            let mut params = vec![
                Parameter::node(ParameterRole::LeftHandOperand, lhs.id),
                Parameter::node(ParameterRole::RightHandOperand, rhs.id),
            ];
            if let Some(code) = subtype {
                params.push(Parameter::int(ParameterRole::AstNodeSubtype, code));
            }
            lhs = self.push(kind, lhs.start, rhs.end, params);
        }
        Ok(lhs)
    }

    fn binary_kind(
        &self,
        level: BinaryLevel,
        op: &Pair<'_, Rule>,
    ) -> Result<(ExpressionKind, Option<i64>), ConvertError> {
        let text = op.as_str();
        let accepted = match level {
            BinaryLevel::Or => self.dialect.accepts_or(text),
            BinaryLevel::And => self.dialect.accepts_and(text),
            BinaryLevel::Comparison => self.dialect.accepts_comparison(text),
            BinaryLevel::Additive | BinaryLevel::Multiplicative => true,
        };
        if !accepted {
            let (start, end) = self.span(op);
            return Err(self.doc.syntax_error(
                format!("Operator \"{}\" isn't valid in {}", text, self.dialect),
                to_source_span(start, end),
            ));
        }
        let arithmetic = |operator: ArithmeticOperator| {
            (
                ExpressionKind::Arithmetic { operator },
                Some(operator.code()),
            )
        };
        Ok(match (level, text) {
            (BinaryLevel::Or, _) => (ExpressionKind::Or, None),
            (BinaryLevel::And, _) => (ExpressionKind::And, None),
            (BinaryLevel::Comparison, _) => (ExpressionKind::Comparison, None),
            (BinaryLevel::Additive, "+") => (ExpressionKind::AddConcat, None),
            (BinaryLevel::Additive, _) => arithmetic(ArithmeticOperator::Subtract),
            (BinaryLevel::Multiplicative, "*") => arithmetic(ArithmeticOperator::Multiply),
            (BinaryLevel::Multiplicative, "/") => arithmetic(ArithmeticOperator::Divide),
            (BinaryLevel::Multiplicative, _) => arithmetic(ArithmeticOperator::Modulus),
        })
    }

    fn build_range(&mut self, pair: Pair<'_, Rule>) -> Result<Built, ConvertError> {
        let (start, _) = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = self.next(&mut inner, start)?;
        let lhs = self.build(first)?;
        let Some(op) = inner.next() else {
            return Ok(lhs);
        };
        let (end, rhs) = match inner.next() {
            Some(rhs) => {
                let rhs = self.build(rhs)?;
                (rhs.end, Some(rhs.id))
            }
            None => (self.span(&op).1, None),
        };
        Ok(self.push(
            ExpressionKind::Range,
            lhs.start,
            end,
            vec![
                Parameter::node(ParameterRole::LeftHandOperand, lhs.id),
                Parameter::optional_node(ParameterRole::RightHandOperand, rhs),
            ],
        ))
    }

    fn build_unary(&mut self, pair: Pair<'_, Rule>) -> Result<Built, ConvertError> {
        let (start, _) = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = self.next(&mut inner, start)?;
        if first.as_rule() != Rule::prefix_op {
            return self.build(first);
        }
        let operand = self.next(&mut inner, start)?;
        let operand = self.build(operand)?;
        let enclosed = Parameter::node(ParameterRole::EnclosedOperand, operand.id);
        let built = match first.as_str() {
            "!" => self.push(ExpressionKind::Not, start, operand.end, vec![enclosed]),
            symbol => {
                let (sign, code) = if symbol == "-" {
                    (Sign::Minus, 1)
                } else {
                    (Sign::Plus, 0)
                };
                self.push(
                    ExpressionKind::UnaryPlusMinus { sign },
                    start,
                    operand.end,
                    vec![
                        enclosed,
                        Parameter::int(ParameterRole::AstNodeSubtype, code),
                    ],
                )
            }
        };
        Ok(built)
    }

    fn build_default(&mut self, pair: Pair<'_, Rule>) -> Result<Built, ConvertError> {
        let (start, _) = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = self.next(&mut inner, start)?;
        let lhs = self.build(first)?;
        let Some(suffix) = inner.next() else {
            return Ok(lhs);
        };
        let lho = Parameter::node(ParameterRole::LeftHandOperand, lhs.id);
        if suffix.as_rule() == Rule::exists_op {
            let end = self.span(&suffix).1;
            return Ok(self.push(ExpressionKind::Exists, lhs.start, end, vec![lho]));
        }
        let suffix_start = self.span(&suffix).0;
        let mut parts = suffix.into_inner();
        let bang = self.next(&mut parts, suffix_start)?;
        let (end, rhs) = match parts.next() {
            Some(rhs) => {
                let rhs = self.build(rhs)?;
                (rhs.end, Some(rhs.id))
            }
            None => (self.span(&bang).1, None),
        };
        Ok(self.push(
            ExpressionKind::DefaultTo,
            lhs.start,
            end,
            vec![
                lho,
                Parameter::optional_node(ParameterRole::RightHandOperand, rhs),
            ],
        ))
    }

    fn build_postfix(&mut self, pair: Pair<'_, Rule>) -> Result<Built, ConvertError> {
        let (start, _) = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = self.next(&mut inner, start)?;
        let mut target = self.build(first)?;
        for op in inner {
            let op_start = self.span(&op).0;
            let lho = Parameter::node(ParameterRole::LeftHandOperand, target.id);
            let rule = op.as_rule();
            let mut parts = op.into_inner();
            target = match rule {
                Rule::builtin => {
                    let _question = self.next(&mut parts, op_start)?;
                    let name = self.next(&mut parts, op_start)?;
                    let end = self.span(&name).1;
                    self.push(
                        ExpressionKind::BuiltIn,
                        target.start,
                        end,
                        vec![
                            lho,
                            Parameter::string(ParameterRole::RightHandOperand, name.as_str()),
                        ],
                    )
                }
                Rule::dot_key => {
                    let _dot = self.next(&mut parts, op_start)?;
                    let key = self.next(&mut parts, op_start)?;
                    let end = self.span(&key).1;
                    self.push(
                        ExpressionKind::Dot,
                        target.start,
                        end,
                        vec![
                            lho,
                            Parameter::string(
                                ParameterRole::RightHandOperand,
                                unescape_identifier(key.as_str()),
                            ),
                        ],
                    )
                }
                Rule::dynamic_key => {
                    let _open = self.next(&mut parts, op_start)?;
                    let key = self.next(&mut parts, op_start)?;
                    let key = self.build(key)?;
                    let close = self.next(&mut parts, op_start)?;
                    let end = self.span(&close).1;
                    self.push(
                        ExpressionKind::DynamicKeyName,
                        target.start,
                        end,
                        vec![lho, Parameter::node(ParameterRole::RightHandOperand, key.id)],
                    )
                }
                Rule::method_call => {
                    let mut params = vec![Parameter::node(ParameterRole::Callee, target.id)];
                    let mut end = op_start;
                    for part in parts {
                        match part.as_rule() {
                            Rule::lparen => {}
                            Rule::rparen => end = self.span(&part).1,
                            _ => {
                                let argument = self.build(part)?;
                                params.push(Parameter::node(
                                    ParameterRole::ArgumentValue,
                                    argument.id,
                                ));
                            }
                        }
                    }
                    self.push(ExpressionKind::MethodCall, target.start, end, params)
                }
                other => {
                    return Err(self.doc.internal_error(
                        format!("Unexpected postfix rule {:?}", other),
                        to_source_span(op_start, op_start),
                    ))
                }
            };
        }
        Ok(target)
    }

    // ========================================================================
    // UTILITIES
    // ========================================================================

    fn push(
        &mut self,
        kind: ExpressionKind,
        start: usize,
        end: usize,
        params: Vec<Parameter>,
    ) -> Built {
        let mut node = Node::new(
            NodeKind::Expression(kind),
            self.doc.position_of(start),
            self.doc.last_char_position(end),
        );
        node.params = params;
        Built {
            id: self.tree.push(node),
            start,
            end,
        }
    }

    /// Absolute byte span of a pair.
    fn span(&self, pair: &Pair<'_, Rule>) -> (usize, usize) {
        let span = pair.as_span();
        (self.base + span.start(), self.base + span.end())
    }

    fn next<'i>(
        &self,
        pairs: &mut Pairs<'i, Rule>,
        at: usize,
    ) -> Result<Pair<'i, Rule>, ConvertError> {
        pairs.next().ok_or_else(|| {
            self.doc
                .internal_error("Malformed expression parse tree", to_source_span(at, at))
        })
    }
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

fn describe_rule(rule: Rule) -> &'static str {
    match rule {
        Rule::rparen => "\")\"",
        Rule::rbracket => "\"]\"",
        Rule::rbrace => "\"}\"",
        Rule::builtin_name => "a built-in name",
        Rule::key_name => "a key name",
        Rule::variable_name => "a special variable name",
        _ => "an expression",
    }
}

fn convert_parse_error(
    doc: &SourceDocument<'_>,
    base: usize,
    error: pest::error::Error<Rule>,
) -> ConvertError {
    let (start, end) = match error.location {
        InputLocation::Pos(pos) => (base + pos, base + pos),
        InputLocation::Span((from, to)) => (base + from, base + to),
    };
    let expected = match &error.variant {
        ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            let mut names: Vec<&str> = positives.iter().map(|r| describe_rule(*r)).collect();
            names.sort_unstable();
            names.dedup();
            names.join(" or ")
        }
        ErrorVariant::CustomError { message } => message.clone(),
        _ => "an expression".to_string(),
    };
    let found = doc
        .char_at(start)
        .map_or_else(|| "end of input".to_string(), |c| format!("{:?}", c));
    doc.syntax_error(
        format!("Expected {}, found {}", expected, found),
        to_source_span(start, end),
    )
}
