//! # Tree Builder
//!
//! Collects nodes into the arena and keeps the parent back-references in
//! sync. Parameters and children must be pushed before the node that refers
//! to them.

use super::{Node, NodeId, TagSyntax, Template};

#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and claims every node it references as its own child.
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        let owned: Vec<NodeId> = node
            .params
            .iter()
            .filter_map(|p| p.value.as_node())
            .chain(node.children.iter().copied())
            .collect();
        self.nodes.push(node);
        for child in owned {
            self.nodes[child.0].parent = Some(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn finish(
        self,
        name: impl Into<String>,
        source: impl Into<String>,
        root: NodeId,
        tag_syntax: TagSyntax,
        whitespace_stripping: bool,
    ) -> Template {
        Template::new(
            name.into(),
            source.into(),
            self.nodes,
            root,
            tag_syntax,
            whitespace_stripping,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ElementKind, ExpressionKind, NodeKind, Parameter, ParameterRole, Position};

    #[test]
    fn push_wires_parents_of_params_and_children() {
        let mut builder = TreeBuilder::new();
        let ident = builder.push(Node::new(
            NodeKind::Expression(ExpressionKind::Identifier { name: "x".into() }),
            Position::new(1, 3),
            Position::new(1, 3),
        ));
        let mut dollar = Node::new(
            NodeKind::Element(ElementKind::DollarVariable),
            Position::new(1, 1),
            Position::new(1, 4),
        );
        dollar.params.push(Parameter::node(ParameterRole::Content, ident));
        let dollar = builder.push(dollar);
        let mut root = Node::new(
            NodeKind::Element(ElementKind::MixedContent),
            Position::new(1, 1),
            Position::new(1, 4),
        );
        root.children.push(dollar);
        let root = builder.push(root);

        let template = builder.finish("t", "${x}", root, TagSyntax::AngleBracket, false);
        assert_eq!(template.node(ident).parent, Some(dollar));
        assert_eq!(template.node(dollar).parent, Some(root));
        assert_eq!(template.walk(), vec![root, dollar, ident]);
    }
}
