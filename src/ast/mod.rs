//! Parse tree for FreeMarker templates.
//!
//! The tree is an arena: every [`Node`] lives in [`Template::nodes`] and refers
//! to its parameters, children and parent by [`NodeId`]. Positions are 1-based
//! `(line, column)` pairs and both ends of a node span are inclusive.
//!
//! The tree is built once by the front-end (see [`crate::syntax`]) and is
//! read-only afterwards; the converter never mutates it.

// ============================================================================
// IMPORTS
// ============================================================================

use serde::Serialize;
use std::fmt;

pub mod builder;
pub mod node;
pub mod params;

pub use builder::TreeBuilder;
pub use node::{
    ArithmeticOperator, ElementKind, ExpressionKind, IteratorStyle, Node, NodeKind, Sign,
};
pub use params::{ParamValue, Parameter, ParameterRole};

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// A 1-based `(line, column)` pair. Columns count characters, not bytes.
///
/// # Examples
///
/// ```rust
/// use fmconv::ast::Position;
/// let pos = Position::new(2, 5);
/// assert_eq!(pos.to_string(), "2:5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// The position one column to the right, on the same line.
    pub const fn next_column(self) -> Self {
        Self {
            line: self.line,
            column: self.column + 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Index of a node inside its [`Template`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// The two tag delimiter modes a template can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSyntax {
    /// `<#if x>...</#if>`
    AngleBracket,
    /// `[#if x]...[/#if]`
    SquareBracket,
}

impl TagSyntax {
    pub const fn open_char(self) -> char {
        match self {
            TagSyntax::AngleBracket => '<',
            TagSyntax::SquareBracket => '[',
        }
    }

    pub const fn close_char(self) -> char {
        match self {
            TagSyntax::AngleBracket => '>',
            TagSyntax::SquareBracket => ']',
        }
    }
}

/// A parsed template: the node arena plus the facts the front-end detected
/// while parsing.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    name: String,
    source: String,
    nodes: Vec<Node>,
    root: NodeId,
    tag_syntax: TagSyntax,
    whitespace_stripping: bool,
}

impl Template {
    pub(crate) fn new(
        name: String,
        source: String,
        nodes: Vec<Node>,
        root: NodeId,
        tag_syntax: TagSyntax,
        whitespace_stripping: bool,
    ) -> Self {
        Self {
            name,
            source,
            nodes,
            root,
            tag_syntax,
            whitespace_stripping,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The exact text the template was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tag_syntax(&self) -> TagSyntax {
        self.tag_syntax
    }

    /// Whether the template was parsed with insignificant whitespace stripping
    /// enabled. Such templates can't be converted.
    pub fn whitespace_stripping(&self) -> bool {
        self.whitespace_stripping
    }

    /// Returns the node with the given id.
    ///
    /// Ids are only ever handed out by the builder that produced this
    /// template, so an out-of-range id is a programming error.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first, document-order walk over every node reachable from the
    /// root, including expression nodes held in parameters.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            // An attempt block refers to its recovery block both as a
            // parameter and as a child.
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            order.push(id);
            let node = self.node(id);
            let mut next: Vec<NodeId> = node
                .params
                .iter()
                .filter_map(|p| p.value.as_node())
                .collect();
            next.extend(node.children.iter().copied());
            stack.extend(next.into_iter().rev());
        }
        order
    }
}
