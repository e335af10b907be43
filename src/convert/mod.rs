//! FM2 → FM3 conversion.
//!
//! The converter prints a parse tree back out in FM3 syntax, keeping every
//! byte of whitespace and every comment, then re-parses its own output to
//! prove it is valid FM3. Any doubt about the tree is an error; a template is
//! either converted completely or not at all.

use crate::ast::{Position, Template};
use crate::errors::ConvertError;
use crate::syntax::{parse_template, ParserConfig, TagSyntaxMode};
use crate::target::{Fm3Dialect, RoundTripValidator, TargetDialect};

pub mod builtins;
mod directives;
mod elements;
mod expressions;
mod printer;

use printer::Printer;

/// A change the converted text doesn't make obvious, such as a dropped
/// `#include` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    /// Where in the source template.
    pub position: Position,
    pub message: String,
}

/// Converted text plus the warnings collected while printing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub output: String,
    pub warnings: Vec<ConversionWarning>,
}

/// Converts parsed FM2 templates into the text of a target dialect.
#[derive(Debug, Clone, Default)]
pub struct Converter<T: TargetDialect = Fm3Dialect> {
    target: T,
}

impl<T: TargetDialect> Converter<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    /// Converts `template`, which must have been parsed from exactly
    /// `source` with whitespace stripping off.
    pub fn convert(&self, template: &Template, source: &str) -> Result<String, ConvertError> {
        self.convert_reporting(template, source)
            .map(|conversion| conversion.output)
    }

    /// Like [`Converter::convert`], but also hands back the warnings.
    pub fn convert_reporting(
        &self,
        template: &Template,
        source: &str,
    ) -> Result<Conversion, ConvertError> {
        let _span = tracing::debug_span!("convert", template = template.name()).entered();
        if template.whitespace_stripping() {
            return Err(ConvertError::precondition(
                "The template was parsed with whitespace stripping enabled",
            ));
        }
        if template.source() != source {
            return Err(ConvertError::precondition(
                "The source text differs from the text the template was parsed from",
            ));
        }

        let (output, warnings) = Printer::new(template, &self.target).print()?;
        RoundTripValidator::new(&self.target).validate(
            template.name(),
            &output,
            template.tag_syntax(),
        )?;
        for warning in &warnings {
            tracing::warn!(
                template = template.name(),
                position = %warning.position,
                "{}",
                warning.message
            );
        }
        tracing::debug!(
            target_dialect = self.target.name(),
            bytes = output.len(),
            warnings = warnings.len(),
            "converted"
        );
        Ok(Conversion { output, warnings })
    }
}

/// Converts `template` to FM3.
pub fn convert(template: &Template, source: &str) -> Result<String, ConvertError> {
    Converter::<Fm3Dialect>::default().convert(template, source)
}

/// Parses `source` as FM2 and converts it to FM3.
pub fn convert_source(
    name: &str,
    source: &str,
    tag_syntax: TagSyntaxMode,
) -> Result<String, ConvertError> {
    let config = ParserConfig::fm2().with_tag_syntax(tag_syntax);
    let template = parse_template(name, source, &config)?;
    convert(&template, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCategory, ErrorKind};

    fn fm3(source: &str) -> String {
        convert_source("test.ftl", source, TagSyntaxMode::AutoDetect).unwrap()
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(fm3("Hello\r\n  world"), "Hello\r\n  world");
        assert_eq!(fm3(""), "");
    }

    #[test]
    fn rejects_stripped_trees() {
        let config = ParserConfig::fm2().with_whitespace_stripping(true);
        let template = parse_template("t", "a ${b}", &config).unwrap();
        let err = convert(&template, "a ${b}").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Usage);
    }

    #[test]
    fn rejects_foreign_source_text() {
        let template = parse_template("t", "a ${b}", &ParserConfig::fm2()).unwrap();
        let err = convert(&template, "a ${c}").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::PreconditionViolation { .. }));
    }

    #[test]
    fn dropped_include_parameters_are_reported() {
        let source = "<#include \"a.ftl\" encoding=\"UTF-8\">";
        let template = parse_template("t", source, &ParserConfig::fm2()).unwrap();
        let conversion = Converter::<Fm3Dialect>::default()
            .convert_reporting(&template, source)
            .unwrap();
        assert_eq!(conversion.output, "<#include \"a.ftl\">");
        assert_eq!(conversion.warnings.len(), 1);
        assert_eq!(conversion.warnings[0].position, Position::new(1, 28));
        assert!(conversion.warnings[0].message.contains("\"encoding\" parameter"));
    }

    #[test]
    fn whitespace_and_comments_survive() {
        assert_eq!(
            fm3("<#if  x <#-- why --> = 1 >a<#elseif y>b</#if >"),
            "<#if  x <#-- why --> == 1 >a<#elseIf y>b</#if >"
        );
    }
}
