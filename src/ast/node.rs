//! Node kinds.
//!
//! The kinds form two closed families: template elements (text, interpolations,
//! directives) and expressions. Both are plain enums so every consumer has to
//! handle each kind explicitly.

use serde::Serialize;

use super::params::{ParamValue, Parameter, ParameterRole};
use super::{NodeId, Position};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "family", content = "kind")]
pub enum NodeKind {
    Element(ElementKind),
    Expression(ExpressionKind),
}

/// `#list xs as x` vs. the legacy `#foreach x in xs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IteratorStyle {
    List,
    ForEach,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ElementKind {
    MixedContent,
    TextBlock,
    DollarVariable,
    NumericalOutput,
    Comment,
    IfBlock,
    ConditionalBlock,
    Assignment,
    AssignmentInstruction,
    BlockAssignment,
    IteratorBlock(IteratorStyle),
    ListElseContainer,
    ElseOfList,
    Items,
    Sep,
    BreakInstruction,
    AttemptBlock,
    RecoveryBlock,
    TrimInstruction,
    FlushInstruction,
    StopInstruction,
    CompressedBlock,
    AutoEscBlock,
    NoAutoEscBlock,
    SwitchBlock,
    Case,
    LibraryLoad,
    /// `#macro` or `#function`, told apart by the subtype parameter.
    Macro,
    BodyInstruction,
    ReturnInstruction,
    /// `<@callee .../>` or `<@callee ...>...</@callee>`.
    UnifiedCall,
    Include,
    PropertySetting,
    EscapeBlock,
    NoEscapeBlock,
    VisitNode,
    RecurseNode,
    FallbackInstruction,
    OutputFormatBlock,
    /// The `#ftl` header. Only ever the first non-blank element of a
    /// template.
    FtlHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    pub const fn symbol(self) -> char {
        match self {
            Sign::Plus => '+',
            Sign::Minus => '-',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithmeticOperator {
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

impl ArithmeticOperator {
    pub const fn symbol(self) -> char {
        match self {
            ArithmeticOperator::Subtract => '-',
            ArithmeticOperator::Multiply => '*',
            ArithmeticOperator::Divide => '/',
            ArithmeticOperator::Modulus => '%',
        }
    }

    /// Subtype code stored in the node's `AstNodeSubtype` parameter.
    pub const fn code(self) -> i64 {
        match self {
            ArithmeticOperator::Subtract => 0,
            ArithmeticOperator::Multiply => 1,
            ArithmeticOperator::Divide => 2,
            ArithmeticOperator::Modulus => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExpressionKind {
    Identifier { name: String },
    NumberLiteral { text: String },
    BooleanLiteral { value: bool },
    /// String literals keep their exact source form, quotes and escapes
    /// included.
    StringLiteral { text: String },
    ListLiteral,
    HashLiteral,
    /// `a..b`, `a..<b`, `a..!b`, `a..*b`, or `a..` with no right-hand side.
    Range,
    AddConcat,
    Arithmetic { operator: ArithmeticOperator },
    UnaryPlusMinus { sign: Sign },
    Not,
    Comparison,
    And,
    Or,
    Parenthetical,
    MethodCall,
    DynamicKeyName,
    Dot,
    BuiltIn,
    BuiltinVariable,
    DefaultTo,
    Exists,
}

impl NodeKind {
    /// Short name used in diagnostics, e.g. `ConditionalBlock`.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Element(kind) => kind.label(),
            NodeKind::Expression(kind) => kind.label(),
        }
    }
}

impl ElementKind {
    pub fn label(&self) -> &'static str {
        match self {
            ElementKind::MixedContent => "MixedContent",
            ElementKind::TextBlock => "TextBlock",
            ElementKind::DollarVariable => "DollarVariable",
            ElementKind::NumericalOutput => "NumericalOutput",
            ElementKind::Comment => "Comment",
            ElementKind::IfBlock => "IfBlock",
            ElementKind::ConditionalBlock => "ConditionalBlock",
            ElementKind::Assignment => "Assignment",
            ElementKind::AssignmentInstruction => "AssignmentInstruction",
            ElementKind::BlockAssignment => "BlockAssignment",
            ElementKind::IteratorBlock(_) => "IteratorBlock",
            ElementKind::ListElseContainer => "ListElseContainer",
            ElementKind::ElseOfList => "ElseOfList",
            ElementKind::Items => "Items",
            ElementKind::Sep => "Sep",
            ElementKind::BreakInstruction => "BreakInstruction",
            ElementKind::AttemptBlock => "AttemptBlock",
            ElementKind::RecoveryBlock => "RecoveryBlock",
            ElementKind::TrimInstruction => "TrimInstruction",
            ElementKind::FlushInstruction => "FlushInstruction",
            ElementKind::StopInstruction => "StopInstruction",
            ElementKind::CompressedBlock => "CompressedBlock",
            ElementKind::AutoEscBlock => "AutoEscBlock",
            ElementKind::NoAutoEscBlock => "NoAutoEscBlock",
            ElementKind::SwitchBlock => "SwitchBlock",
            ElementKind::Case => "Case",
            ElementKind::LibraryLoad => "LibraryLoad",
            ElementKind::Macro => "Macro",
            ElementKind::BodyInstruction => "BodyInstruction",
            ElementKind::ReturnInstruction => "ReturnInstruction",
            ElementKind::UnifiedCall => "UnifiedCall",
            ElementKind::Include => "Include",
            ElementKind::PropertySetting => "PropertySetting",
            ElementKind::EscapeBlock => "EscapeBlock",
            ElementKind::NoEscapeBlock => "NoEscapeBlock",
            ElementKind::VisitNode => "VisitNode",
            ElementKind::RecurseNode => "RecurseNode",
            ElementKind::FallbackInstruction => "FallbackInstruction",
            ElementKind::OutputFormatBlock => "OutputFormatBlock",
            ElementKind::FtlHeader => "FtlHeader",
        }
    }
}

impl ExpressionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ExpressionKind::Identifier { .. } => "Identifier",
            ExpressionKind::NumberLiteral { .. } => "NumberLiteral",
            ExpressionKind::BooleanLiteral { .. } => "BooleanLiteral",
            ExpressionKind::StringLiteral { .. } => "StringLiteral",
            ExpressionKind::ListLiteral => "ListLiteral",
            ExpressionKind::HashLiteral => "HashLiteral",
            ExpressionKind::Range => "Range",
            ExpressionKind::AddConcat => "AddConcatExpression",
            ExpressionKind::Arithmetic { .. } => "ArithmeticExpression",
            ExpressionKind::UnaryPlusMinus { .. } => "UnaryPlusMinusExpression",
            ExpressionKind::Not => "NotExpression",
            ExpressionKind::Comparison => "ComparisonExpression",
            ExpressionKind::And => "AndExpression",
            ExpressionKind::Or => "OrExpression",
            ExpressionKind::Parenthetical => "ParentheticalExpression",
            ExpressionKind::MethodCall => "MethodCall",
            ExpressionKind::DynamicKeyName => "DynamicKeyName",
            ExpressionKind::Dot => "Dot",
            ExpressionKind::BuiltIn => "BuiltIn",
            ExpressionKind::BuiltinVariable => "BuiltinVariable",
            ExpressionKind::DefaultTo => "DefaultToExpression",
            ExpressionKind::Exists => "ExistsExpression",
        }
    }
}

/// One node of the parse tree.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub begin: Position,
    /// Inclusive: the position of the node's last character.
    pub end: Position,
    pub params: Vec<Parameter>,
    pub children: Vec<NodeId>,
    #[serde(skip)]
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, begin: Position, end: Position) -> Self {
        Self {
            kind,
            begin,
            end,
            params: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_param(mut self, role: ParameterRole, value: ParamValue) -> Self {
        self.params.push(Parameter { role, value });
        self
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    pub fn element_kind(&self) -> Option<&ElementKind> {
        match &self.kind {
            NodeKind::Element(kind) => Some(kind),
            NodeKind::Expression(_) => None,
        }
    }

    pub fn expression_kind(&self) -> Option<&ExpressionKind> {
        match &self.kind {
            NodeKind::Expression(kind) => Some(kind),
            NodeKind::Element(_) => None,
        }
    }
}
