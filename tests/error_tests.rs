// Error categories, diagnostic codes and what each failure carries.

use std::collections::BTreeSet;

use fmconv::ast::{Position, TagSyntax};
use fmconv::config::ConversionOptions;
use fmconv::convert::{convert, convert_source, Converter};
use fmconv::syntax::{parse_template, ParserConfig, TagSyntaxMode};
use fmconv::target::{Fm3Dialect, TargetDialect};
use fmconv::{ConvertError, ErrorCategory, ErrorKind};
use miette::Diagnostic;

fn convert_err(source: &str) -> ConvertError {
    convert_source("t.ftl", source, TagSyntaxMode::AutoDetect).unwrap_err()
}

fn code(error: &ConvertError) -> String {
    error.code().map(|c| c.to_string()).unwrap_or_default()
}

/// FM3 with one more built-in than it can actually parse, so conversions
/// using it fail the round trip. It also lacks the `timeZone` setting.
#[derive(Debug)]
struct LeakyTarget {
    builtins: BTreeSet<String>,
    variables: BTreeSet<String>,
    settings: BTreeSet<String>,
}

impl LeakyTarget {
    fn new() -> Self {
        let mut builtins = Fm3Dialect.builtin_names().clone();
        builtins.insert("ifExists".to_string());
        let mut settings = Fm3Dialect.setting_names().clone();
        settings.remove("timeZone");
        Self {
            builtins,
            variables: Fm3Dialect.builtin_variable_names().clone(),
            settings,
        }
    }
}

impl TargetDialect for LeakyTarget {
    fn name(&self) -> &str {
        "leaky FM3"
    }

    fn builtin_names(&self) -> &BTreeSet<String> {
        &self.builtins
    }

    fn builtin_variable_names(&self) -> &BTreeSet<String> {
        &self.variables
    }

    fn setting_names(&self) -> &BTreeSet<String> {
        &self.settings
    }

    fn validate(&self, name: &str, text: &str, tag_syntax: TagSyntax) -> Result<(), ConvertError> {
        Fm3Dialect.validate(name, text, tag_syntax)
    }
}

#[test]
fn syntax_errors_are_source_errors_with_snippets() {
    let err = convert_err("line one\n<#list xs as x>${x}");
    assert!(matches!(err.kind, ErrorKind::Syntax { .. }));
    assert_eq!(err.category(), ErrorCategory::Source);
    assert_eq!(code(&err), "fmconv::syntax");
    assert_eq!(err.location.as_ref().map(|l| l.position), Some(Position::new(2, 1)));
    assert!(err.source_code().is_some());
    assert_eq!(err.labels().map(|labels| labels.count()), Some(1));
}

#[test]
fn unconvertible_features_name_the_node() {
    let err = convert_err("<#switch x><#default>d<#case 1>one</#switch>");
    assert_eq!(code(&err), "fmconv::unconvertible_feature");
    let location = err.location.clone().expect("located");
    assert_eq!(location.node_kind.as_deref(), Some("Case"));
    assert_eq!(location.position, Position::new(1, 23));
    assert!(err.help().is_some());
}

#[test]
fn builtin_mapping_reports_the_attempt() {
    let err = convert_err("${x?if_exists}");
    assert_eq!(
        err.kind,
        ErrorKind::BuiltInMapping {
            name: "if_exists".into(),
            attempted: "ifExists".into(),
        }
    );
    assert_eq!(err.category(), ErrorCategory::Conversion);
    assert!(err.to_string().contains("(tried: ifExists)"));
}

#[test]
fn round_trip_failures_are_defects() {
    let source = "${x?if_exists}";
    let template = parse_template("t.ftl", source, &ParserConfig::fm2()).unwrap();
    let err = Converter::new(LeakyTarget::new())
        .convert(&template, source)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RoundTrip { .. }));
    assert_eq!(err.category(), ErrorCategory::Defect);
    assert!(err.to_string().contains("ifExists"));
}

#[test]
fn settings_the_target_lacks_fail_to_map() {
    let source = "<#setting time_zone=\"UTC\">";
    let template = parse_template("t.ftl", source, &ParserConfig::fm2()).unwrap();
    let err = Converter::new(LeakyTarget::new())
        .convert(&template, source)
        .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::SettingMapping {
            name: "time_zone".into(),
            attempted: "timeZone".into(),
        }
    );
    assert_eq!(err.category(), ErrorCategory::Conversion);
    assert_eq!(code(&err), "fmconv::setting_mapping");
    assert_eq!(
        err.location.as_ref().and_then(|l| l.node_kind.as_deref()),
        Some("PropertySetting")
    );
}

#[test]
fn precondition_violations_are_usage_errors() {
    let config = ParserConfig::fm2().with_whitespace_stripping(true);
    let template = parse_template("t.ftl", "x", &config).unwrap();
    let err = convert(&template, "x").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Usage);
    assert_eq!(code(&err), "fmconv::precondition_violation");
}

#[test]
fn bad_configuration_is_a_usage_error() {
    let err = ConversionOptions::from_yaml_str("include: \"(\"").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Config { .. }));
    assert_eq!(err.category(), ErrorCategory::Usage);

    let err = ConversionOptions::from_yaml_file(std::path::Path::new("no/such/config.yaml"))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Environment);
}
