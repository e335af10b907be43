//! Role-tagged node parameters.
//!
//! Parameter order and count are part of each node kind's contract. The
//! printer checks both, so a front-end that starts emitting an extra
//! parameter makes conversion fail instead of silently dropping it.

use serde::Serialize;
use std::fmt;

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParameterRole {
    Content,
    Condition,
    AstNodeSubtype,
    LeftHandOperand,
    RightHandOperand,
    EnclosedOperand,
    Callee,
    ArgumentValue,
    ItemKey,
    ItemValue,
    MinimumDecimals,
    MaximumDecimals,
    AssignmentTarget,
    AssignmentOperator,
    AssignmentSource,
    VariableScope,
    Namespace,
    ListSource,
    TargetLoopVariable,
    ErrorHandler,
    Message,
    Value,
    TemplateName,
    ParameterName,
    ParameterDefault,
    CatchAllParameterName,
    PassedValue,
    ArgumentName,
    Node,
    PlaceholderVariable,
    ExpressionTemplate,
    ParseParameter,
    EncodingParameter,
    IgnoreMissingParameter,
}

impl fmt::Display for ParameterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterRole::Content => "content",
            ParameterRole::Condition => "condition",
            ParameterRole::AstNodeSubtype => "AST-node subtype",
            ParameterRole::LeftHandOperand => "left-hand operand",
            ParameterRole::RightHandOperand => "right-hand operand",
            ParameterRole::EnclosedOperand => "enclosed operand",
            ParameterRole::Callee => "callee",
            ParameterRole::ArgumentValue => "argument value",
            ParameterRole::ItemKey => "item key",
            ParameterRole::ItemValue => "item value",
            ParameterRole::MinimumDecimals => "minimum decimals",
            ParameterRole::MaximumDecimals => "maximum decimals",
            ParameterRole::AssignmentTarget => "assignment target",
            ParameterRole::AssignmentOperator => "assignment operator",
            ParameterRole::AssignmentSource => "assignment source",
            ParameterRole::VariableScope => "variable scope",
            ParameterRole::Namespace => "namespace",
            ParameterRole::ListSource => "list source",
            ParameterRole::TargetLoopVariable => "target loop variable",
            ParameterRole::ErrorHandler => "error handler",
            ParameterRole::Message => "message",
            ParameterRole::Value => "value",
            ParameterRole::TemplateName => "template name",
            ParameterRole::ParameterName => "parameter name",
            ParameterRole::ParameterDefault => "parameter default",
            ParameterRole::CatchAllParameterName => "catch-all parameter name",
            ParameterRole::PassedValue => "passed value",
            ParameterRole::ArgumentName => "argument name",
            ParameterRole::Node => "node",
            ParameterRole::PlaceholderVariable => "placeholder variable",
            ParameterRole::ExpressionTemplate => "expression template",
            ParameterRole::ParseParameter => "\"parse\" parameter",
            ParameterRole::EncodingParameter => "\"encoding\" parameter",
            ParameterRole::IgnoreMissingParameter => "\"ignore_missing\" parameter",
        };
        f.write_str(name)
    }
}

/// A parameter value: a nested node, a string, an integer code, or nothing
/// (an optional parameter that was omitted in the source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Node(NodeId),
    Str(String),
    Int(i64),
    Null,
}

impl ParamValue {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            ParamValue::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Name of the value's type, for "expected X, found Y" messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Node(_) => "node",
            ParamValue::Str(_) => "string",
            ParamValue::Int(_) => "integer",
            ParamValue::Null => "null",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub role: ParameterRole,
    pub value: ParamValue,
}

impl Parameter {
    pub fn new(role: ParameterRole, value: ParamValue) -> Self {
        Self { role, value }
    }

    pub fn node(role: ParameterRole, id: NodeId) -> Self {
        Self::new(role, ParamValue::Node(id))
    }

    pub fn optional_node(role: ParameterRole, id: Option<NodeId>) -> Self {
        Self::new(role, id.map_or(ParamValue::Null, ParamValue::Node))
    }

    pub fn string(role: ParameterRole, value: impl Into<String>) -> Self {
        Self::new(role, ParamValue::Str(value.into()))
    }

    pub fn int(role: ParameterRole, value: i64) -> Self {
        Self::new(role, ParamValue::Int(value))
    }
}
