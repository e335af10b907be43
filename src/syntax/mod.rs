//! FreeMarker front-end.
//!
//! Turns template text into a [`Template`] parse tree for either dialect.
//! Tags, text and interpolations are recognised by a hand-written scanner
//! ([`template`]); expressions inside them go through the pest grammar
//! ([`expression`]).

use serde::{Deserialize, Serialize};

use crate::ast::{TagSyntax, Template};
use crate::errors::ConvertError;

pub mod dialect;
pub mod expression;
mod template;

pub use dialect::{Dialect, Directive, DirectiveLookup, EndTagKey};
pub use template::MAX_FRACTION_DIGITS;

use template::TemplateParser;

/// How the front-end decides between `<#...>` and `[#...]` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TagSyntaxMode {
    /// The first directive-like tag in the template decides; angle brackets
    /// if there is none.
    #[default]
    #[serde(rename = "auto")]
    AutoDetect,
    #[serde(rename = "angle")]
    AngleBracket,
    #[serde(rename = "square")]
    SquareBracket,
}

impl TagSyntaxMode {
    pub fn resolve(self, text: &str) -> TagSyntax {
        match self {
            TagSyntaxMode::AutoDetect => detect_tag_syntax(text),
            TagSyntaxMode::AngleBracket => TagSyntax::AngleBracket,
            TagSyntaxMode::SquareBracket => TagSyntax::SquareBracket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ParserConfig {
    pub dialect: Dialect,
    pub tag_syntax: TagSyntaxMode,
    /// Recorded on the tree. The converter refuses trees parsed with
    /// stripping on, since their spans no longer match the text.
    pub whitespace_stripping: bool,
}

impl ParserConfig {
    pub fn fm2() -> Self {
        Self {
            dialect: Dialect::Fm2,
            tag_syntax: TagSyntaxMode::AutoDetect,
            whitespace_stripping: false,
        }
    }

    pub fn fm3() -> Self {
        Self {
            dialect: Dialect::Fm3,
            ..Self::fm2()
        }
    }

    pub fn with_tag_syntax(mut self, tag_syntax: TagSyntaxMode) -> Self {
        self.tag_syntax = tag_syntax;
        self
    }

    pub fn with_whitespace_stripping(mut self, enabled: bool) -> Self {
        self.whitespace_stripping = enabled;
        self
    }
}

/// Parses `text` into a tree. `name` is only used in diagnostics.
pub fn parse_template(
    name: &str,
    text: &str,
    config: &ParserConfig,
) -> Result<Template, ConvertError> {
    let tag_syntax = config.tag_syntax.resolve(text);
    let _span = tracing::debug_span!(
        "parse",
        template = name,
        dialect = %config.dialect,
        ?tag_syntax
    )
    .entered();
    let template = TemplateParser::new(
        name,
        text,
        tag_syntax,
        config.dialect,
        config.whitespace_stripping,
    )
    .parse()?;
    tracing::debug!(nodes = template.len(), "parsed");
    Ok(template)
}

/// Which tag syntax the first directive-like tag uses. Comments count.
pub fn detect_tag_syntax(text: &str) -> TagSyntax {
    let first = |patterns: &[&str]| patterns.iter().filter_map(|p| text.find(p)).min();
    let angle = first(&["<#", "</#", "<@", "</@"]);
    let square = first(&["[#", "[/#", "[@", "[/@"]);
    match (angle, square) {
        (Some(a), Some(s)) if s < a => TagSyntax::SquareBracket,
        (None, Some(_)) => TagSyntax::SquareBracket,
        _ => TagSyntax::AngleBracket,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ElementKind, NodeKind, ParamValue, ParameterRole};
    use crate::errors::ErrorKind;

    fn parse(text: &str) -> Template {
        parse_template("test.ftl", text, &ParserConfig::fm2()).unwrap()
    }

    fn parse_err(text: &str) -> String {
        match parse_template("test.ftl", text, &ParserConfig::fm2()) {
            Err(error) => match error.kind {
                ErrorKind::Syntax { message } => message,
                other => panic!("expected a syntax error, got {:?}", other),
            },
            Ok(_) => panic!("expected {:?} to fail", text),
        }
    }

    fn child_kinds(template: &Template) -> Vec<&'static str> {
        template
            .node(template.root())
            .children
            .iter()
            .map(|&id| template.node(id).label())
            .collect()
    }

    #[test]
    fn detects_square_bracket_syntax() {
        assert_eq!(detect_tag_syntax("a [#if x]b[/#if]"), TagSyntax::SquareBracket);
        assert_eq!(detect_tag_syntax("<#-- c --> [#if x]"), TagSyntax::AngleBracket);
        assert_eq!(detect_tag_syntax("no tags [here]"), TagSyntax::AngleBracket);
    }

    #[test]
    fn text_and_interpolations() {
        let template = parse("Hello ${name}!");
        assert_eq!(
            child_kinds(&template),
            vec!["TextBlock", "DollarVariable", "TextBlock"]
        );
        let dollar = template.node(template.node(template.root()).children[1]);
        assert_eq!(dollar.begin, crate::ast::Position::new(1, 7));
        assert_eq!(dollar.end, crate::ast::Position::new(1, 13));
    }

    #[test]
    fn lone_if_spans_its_end_tag() {
        let template = parse("<#if x>y</#if>");
        let id = template.node(template.root()).children[0];
        let node = template.node(id);
        assert_eq!(node.kind, NodeKind::Element(ElementKind::ConditionalBlock));
        assert_eq!(node.end, crate::ast::Position::new(1, 14));
        assert_eq!(node.params[1].value, ParamValue::Int(0));
    }

    #[test]
    fn if_chain_collects_branches() {
        let template = parse("<#if a>1<#elseif b>2<#else>3</#if>");
        let chain = template.node(template.node(template.root()).children[0]);
        assert_eq!(chain.label(), "IfBlock");
        let subtypes: Vec<_> = chain
            .children
            .iter()
            .map(|&id| template.node(id).params[1].value.clone())
            .collect();
        assert_eq!(
            subtypes,
            vec![ParamValue::Int(0), ParamValue::Int(2), ParamValue::Int(1)]
        );
        // The first branch ends right before `<#elseif`.
        assert_eq!(
            template.node(chain.children[0]).end,
            crate::ast::Position::new(1, 8)
        );
    }

    #[test]
    fn list_with_else() {
        let template = parse("<#list xs as x>${x}<#sep>, <#else>none</#list>");
        let container = template.node(template.node(template.root()).children[0]);
        assert_eq!(container.label(), "ListElseContainer");
        let iterator = template.node(container.children[0]);
        assert_eq!(
            iterator.kind,
            NodeKind::Element(ElementKind::IteratorBlock(crate::ast::IteratorStyle::List))
        );
        // The implicitly closed #sep is the last child of the list body.
        let sep = template.node(*iterator.children.last().unwrap());
        assert_eq!(sep.label(), "Sep");
    }

    #[test]
    fn multiple_assignments_share_one_instruction() {
        let template = parse("<#assign a = 1, b = 2 in ns>");
        let node = template.node(template.node(template.root()).children[0]);
        assert_eq!(node.label(), "AssignmentInstruction");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.params[0].role, ParameterRole::VariableScope);
        assert!(node.params[1].value.as_node().is_some());
    }

    #[test]
    fn attempt_recover_structure() {
        let template = parse("<#attempt>a<#recover>b</#attempt>");
        let node = template.node(template.node(template.root()).children[0]);
        assert_eq!(node.label(), "AttemptBlock");
        let labels: Vec<_> = node
            .children
            .iter()
            .map(|&id| template.node(id).label())
            .collect();
        assert_eq!(labels, vec!["MixedContent", "RecoveryBlock"]);
    }

    #[test]
    fn macro_parameters_and_calls() {
        let template = parse("<#macro m a, b=1 rest...><#nested a></#macro><@m 1; x>${x}</@m>");
        let top = &template.node(template.root()).children;
        let definition = template.node(top[0]);
        assert_eq!(definition.label(), "Macro");
        let roles: Vec<_> = definition.params.iter().map(|p| p.role).collect();
        assert_eq!(
            roles,
            vec![
                ParameterRole::AssignmentTarget,
                ParameterRole::ParameterName,
                ParameterRole::ParameterDefault,
                ParameterRole::ParameterName,
                ParameterRole::ParameterDefault,
                ParameterRole::CatchAllParameterName,
                ParameterRole::AstNodeSubtype,
            ]
        );
        assert_eq!(definition.params[2].value, ParamValue::Null);
        assert_eq!(definition.params[5].value, ParamValue::Str("rest".into()));

        let call = template.node(top[1]);
        assert_eq!(call.label(), "UnifiedCall");
        assert_eq!(call.params[0].role, ParameterRole::Callee);
        assert_eq!(call.params[1].role, ParameterRole::ArgumentValue);
        assert_eq!(call.params[2].value, ParamValue::Str("x".into()));
        assert_eq!(call.children.len(), 1);
    }

    #[test]
    fn directive_placement_rules() {
        assert!(parse_err("<#nested>").contains("#nested must be inside #macro"));
        assert!(parse_err("<#return>").contains("#return must be inside"));
        assert!(parse_err("<#noescape>x</#noescape>").contains("#noEscape must be inside"));
        assert!(parse_err("a<#ftl>").contains("first directive"));
        assert!(parse_err("<@m></@n>").contains("doesn't match the open <@m> call"));
        assert!(parse_err("<#setting foo=1>").contains("Unknown setting name"));
        assert_eq!(child_kinds(&parse(" <#-- c --><#ftl encoding=\"UTF-8\">"))[2], "FtlHeader");
    }

    #[test]
    fn numerical_output_format() {
        let template = parse("#{x; m1M3}");
        let node = template.node(template.node(template.root()).children[0]);
        assert_eq!(node.params[1].value, ParamValue::Int(1));
        assert_eq!(node.params[2].value, ParamValue::Int(3));
        assert!(parse_err("#{x; m3M1}").contains("less than"));
        assert!(parse_err("#{x; m51}").contains("more than 50 fraction digits"));
        assert!(parse_err("#{x; m9000000000000000000}").contains("fraction digits"));
        assert!(parse_err("#{x; M99999999999999999999999}").contains("fraction digits"));
    }

    #[test]
    fn structural_errors() {
        assert!(parse_err("<#if x>").contains("Unclosed #if"));
        assert!(parse_err("</#if>").contains("no matching start tag"));
        assert!(parse_err("<#list xs as x></#if>").contains("doesn't match"));
        assert!(parse_err("<#switch x>text<#case 1></#switch>").contains("#switch"));
        assert!(parse_err("<#transform t></#transform>").contains("isn't supported"));
        assert!(parse_err("<@foo>").contains("Unclosed"));
    }

    #[test]
    fn fm3_rejects_fm2_spellings() {
        let config = ParserConfig::fm3();
        assert!(parse_template("t", "<#if a>1<#elseIf b>2</#if>", &config).is_ok());
        assert!(parse_template("t", "<#if a>1<#elseif b>2</#if>", &config).is_err());
        assert!(parse_template("t", "<#if a = b>x</#if>", &config).is_err());
    }

    #[test]
    fn hash_in_text_is_not_a_tag() {
        let template = parse("a <# b and <#1");
        assert_eq!(child_kinds(&template), vec!["TextBlock"]);
    }
}
