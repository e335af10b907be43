//! The dialect converted templates must be valid in.
//!
//! The converter only needs two things from it: the names it may emit for
//! built-ins, built-in variables and settings, and a way to check that
//! emitted text parses. [`RoundTripValidator`] turns a failure of the latter into a
//! converter defect.

use once_cell::sync::Lazy;
use std::collections::BTreeSet;

use crate::ast::{ExpressionKind, ParamValue, ParameterRole, TagSyntax, Template};
use crate::errors::{ConvertError, ErrorKind};
use crate::syntax::{parse_template, Dialect, ParserConfig, TagSyntaxMode};

pub trait TargetDialect {
    fn name(&self) -> &str;

    fn builtin_names(&self) -> &BTreeSet<String>;

    fn builtin_variable_names(&self) -> &BTreeSet<String>;

    /// Names `#setting` may set.
    fn setting_names(&self) -> &BTreeSet<String>;

    /// Parses `text` under the dialect's grammar.
    fn validate(&self, name: &str, text: &str, tag_syntax: TagSyntax) -> Result<(), ConvertError>;
}

const FM3_BUILTINS: &[&str] = &[
    "abs", "absoluteTemplateName", "ancestors", "api", "boolean", "byte", "c", "capFirst",
    "capitalize", "ceiling", "children", "chopLinebreak", "contains", "date", "dateIfUnknown",
    "dateTime", "dateTimeIfUnknown", "double", "endsWith", "ensureEndsWith", "ensureStartsWith",
    "esc", "eval", "first", "float", "floor", "chunk", "counter", "itemCycle", "hasApi",
    "hasContent", "hasNext", "html", "index", "indexOf", "int", "interpret", "isBoolean",
    "isIterable", "isCollection", "isDate", "isDateLike", "isDateOnly", "isEvenItem", "isFirst",
    "isLast", "isUnknownDateLike", "isDatetime", "isDirective", "isHashEx", "isHash",
    "isInfinite", "isMarkupOutput", "isFunction", "isNan", "isNode", "isNumber", "isOddItem",
    "isSequence", "isString", "isTime", "isoUtc", "isoUtcFZ", "isoUtcNZ", "isoUtcMs",
    "isoUtcMsNZ", "isoUtcM", "isoUtcMNZ", "isoUtcH", "isoUtcHNZ", "isoLocal", "isoLocalNZ",
    "isoLocalMs", "isoLocalMsNZ", "isoLocalM", "isoLocalMNZ", "isoLocalH", "isoLocalHNZ", "iso",
    "isoNZ", "isoMs", "isoMsNZ", "isoM", "isoMNZ", "isoH", "isoHNZ", "jString", "join",
    "jsString", "jsonString", "keepAfter", "keepBefore", "keepAfterLast", "keepBeforeLast",
    "keys", "lastIndexOf", "last", "leftPad", "length", "long", "lowerAbc", "lowerCase",
    "namespace", "new", "markupString", "nodeName", "nodeNamespace", "nodeType", "noEsc", "max",
    "min", "number", "numberToDate", "numberToTime", "numberToDatetime", "parent",
    "previousSibling", "nextSibling", "itemParity", "itemParityCap", "reverse", "rightPad",
    "root", "round", "removeEnding", "removeBeginning", "rtf", "sequence", "seqContains",
    "seqIndexOf", "seqLastIndexOf", "short", "size", "sortBy", "sort", "split", "switch",
    "startsWith", "string", "substring", "then", "time", "timeIfUnknown", "trim",
    "uncapFirst", "upperAbc", "upperCase", "url", "urlPath", "values", "wordList", "xhtml",
    "xml", "matches", "groups", "replace",
];

const FM3_BUILTIN_VARIABLES: &[&str] = &[
    "autoEsc",
    "callerTemplateName",
    "currentTemplateName",
    "dataModel",
    "error",
    "getOptionalTemplate",
    "globals",
    "incompatibleImprovements",
    "lang",
    "locale",
    "localeObject",
    "locals",
    "main",
    "mainTemplateName",
    "namespace",
    "node",
    "now",
    "outputEncoding",
    "outputFormat",
    "pass",
    "urlEscapingCharset",
    "vars",
    "version",
];

static FM3_BUILTIN_SET: Lazy<BTreeSet<String>> =
    Lazy::new(|| FM3_BUILTINS.iter().map(|s| s.to_string()).collect());

static FM3_BUILTIN_VARIABLE_SET: Lazy<BTreeSet<String>> =
    Lazy::new(|| FM3_BUILTIN_VARIABLES.iter().map(|s| s.to_string()).collect());

static FM3_SETTING_SET: Lazy<BTreeSet<String>> = Lazy::new(|| {
    Dialect::Fm3
        .setting_names()
        .iter()
        .map(|s| s.to_string())
        .collect()
});

/// FreeMarker 3 syntax, as understood by this crate's own front-end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fm3Dialect;

impl TargetDialect for Fm3Dialect {
    fn name(&self) -> &str {
        "FM3"
    }

    fn builtin_names(&self) -> &BTreeSet<String> {
        &FM3_BUILTIN_SET
    }

    fn builtin_variable_names(&self) -> &BTreeSet<String> {
        &FM3_BUILTIN_VARIABLE_SET
    }

    fn setting_names(&self) -> &BTreeSet<String> {
        &FM3_SETTING_SET
    }

    fn validate(&self, name: &str, text: &str, tag_syntax: TagSyntax) -> Result<(), ConvertError> {
        let mode = match tag_syntax {
            TagSyntax::AngleBracket => TagSyntaxMode::AngleBracket,
            TagSyntax::SquareBracket => TagSyntaxMode::SquareBracket,
        };
        let config = ParserConfig {
            dialect: Dialect::Fm3,
            tag_syntax: mode,
            whitespace_stripping: false,
        };
        let template = parse_template(name, text, &config)?;
        self.check_names(&template)
    }
}

impl Fm3Dialect {
    /// The grammar accepts any identifier after `?` or `.`; FM3 only knows
    /// a fixed set.
    fn check_names(&self, template: &Template) -> Result<(), ConvertError> {
        for id in template.walk() {
            let node = template.node(id);
            let (name, known) = match node.expression_kind() {
                Some(ExpressionKind::BuiltIn) => (
                    node.params
                        .iter()
                        .find(|p| p.role == ParameterRole::RightHandOperand),
                    self.builtin_names(),
                ),
                Some(ExpressionKind::BuiltinVariable) => (
                    node.params.iter().find(|p| p.role == ParameterRole::Content),
                    self.builtin_variable_names(),
                ),
                _ => continue,
            };
            if let Some(ParamValue::Str(name)) = name.map(|p| &p.value) {
                if !known.contains(name) {
                    return Err(ConvertError::new(ErrorKind::Syntax {
                        message: format!("Unknown {} {}: {}", self.name(), node.label(), name),
                    })
                    .at(Some(node.label()), node.begin));
                }
            }
        }
        Ok(())
    }
}

/// Re-parses converted output. Any failure is the converter's fault.
pub struct RoundTripValidator<'t> {
    target: &'t dyn TargetDialect,
}

impl<'t> RoundTripValidator<'t> {
    pub fn new(target: &'t dyn TargetDialect) -> Self {
        Self { target }
    }

    pub fn validate(&self, name: &str, text: &str, tag_syntax: TagSyntax) -> Result<(), ConvertError> {
        self.target
            .validate(name, text, tag_syntax)
            .map_err(|cause| {
                tracing::error!(template = name, error = %cause, "round-trip validation failed");
                ConvertError::round_trip(&cause)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    #[test]
    fn accepts_canonical_fm3() {
        let text = "<#if x?hasContent>${.now} ${y?upperCase}</#if>";
        assert!(Fm3Dialect.validate("t", text, TagSyntax::AngleBracket).is_ok());
    }

    #[test]
    fn rejects_fm2_names() {
        let err = Fm3Dialect
            .validate("t", "${y?upper_case}", TagSyntax::AngleBracket)
            .unwrap_err();
        assert!(err.to_string().contains("upper_case"));
        assert!(Fm3Dialect
            .validate("t", "${.current_node}", TagSyntax::AngleBracket)
            .is_err());
    }

    #[test]
    fn round_trip_failures_are_defects() {
        let dialect = Fm3Dialect;
        let validator = RoundTripValidator::new(&dialect);
        let err = validator
            .validate("t", "<#if a = b>x</#if>", TagSyntax::AngleBracket)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Defect);
        assert!(matches!(err.kind, ErrorKind::RoundTrip { .. }));
    }
}
