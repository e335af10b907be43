//! Dialect tables: which directive names and operators each dialect accepts.
//!
//! FM2 is permissive about spelling (`elseif` and `elseIf`, `&lt;`, `\and`,
//! `=` for equality). FM3 accepts exactly one spelling per construct.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Fm2,
    Fm3,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Fm2 => "FM2",
            Dialect::Fm3 => "FM3",
        })
    }
}

/// The directives the front-end builds nodes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    If,
    ElseIf,
    Else,
    Assign,
    Global,
    Local,
    List,
    ForEach,
    Items,
    Sep,
    Break,
    Attempt,
    Recover,
    Trim,
    LeftTrim,
    RightTrim,
    NoTrim,
    Flush,
    Stop,
    Compress,
    AutoEsc,
    NoAutoEsc,
    Switch,
    Case,
    Default,
    Import,
    NoParse,
    Macro,
    Function,
    Nested,
    Return,
    Include,
    Setting,
    Escape,
    NoEscape,
    Visit,
    Recurse,
    Fallback,
    OutputFormat,
    Ftl,
}

/// Which open block an end tag closes. Several spellings can share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTagKey {
    If,
    List,
    Items,
    Sep,
    Attempt,
    Compress,
    AutoEsc,
    NoAutoEsc,
    Switch,
    Assign,
    Global,
    Local,
    Macro,
    Function,
    Escape,
    NoEscape,
    OutputFormat,
}

/// What a start tag name means in a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveLookup {
    Known(Directive),
    /// A real FreeMarker directive that the converter doesn't handle.
    Unsupported,
    Unknown,
}

const UNSUPPORTED: &[&str] = &["transform", "call", "continue"];

const FM2_SETTINGS: &[&str] = &[
    "boolean_format",
    "booleanFormat",
    "classic_compatible",
    "classicCompatible",
    "date_format",
    "dateFormat",
    "datetime_format",
    "datetimeFormat",
    "locale",
    "number_format",
    "numberFormat",
    "output_encoding",
    "outputEncoding",
    "sql_date_and_time_time_zone",
    "sqlDateAndTimeTimeZone",
    "time_format",
    "timeFormat",
    "time_zone",
    "timeZone",
    "url_escaping_charset",
    "urlEscapingCharset",
];

const FM3_SETTINGS: &[&str] = &[
    "booleanFormat",
    "dateFormat",
    "dateTimeFormat",
    "locale",
    "numberFormat",
    "outputEncoding",
    "sqlDateAndTimeTimeZone",
    "timeFormat",
    "timeZone",
    "urlEscapingCharset",
];

const FM2_FTL_PARAMETERS: &[&str] = &[
    "encoding",
    "strip_whitespace",
    "stripWhitespace",
    "strip_text",
    "stripText",
    "ns_prefixes",
    "nsPrefixes",
    "attributes",
    "output_format",
    "outputFormat",
    "auto_esc",
    "autoEsc",
];

const FM3_FTL_PARAMETERS: &[&str] = &[
    "encoding",
    "stripWhitespace",
    "stripText",
    "nsPrefixes",
    "customSettings",
    "outputFormat",
    "autoEsc",
];

impl Dialect {
    pub fn directive(self, name: &str) -> DirectiveLookup {
        use Directive::*;
        let known = match (self, name) {
            (_, "if") => Some(If),
            (Dialect::Fm2, "elseif") | (_, "elseIf") => Some(ElseIf),
            (_, "else") => Some(Else),
            (_, "assign") => Some(Assign),
            (_, "global") => Some(Global),
            (_, "local") => Some(Local),
            (_, "list") => Some(List),
            (Dialect::Fm2, "foreach") | (Dialect::Fm2, "forEach") => Some(ForEach),
            (_, "items") => Some(Items),
            (_, "sep") => Some(Sep),
            (_, "break") => Some(Break),
            (_, "attempt") => Some(Attempt),
            (_, "recover") => Some(Recover),
            (_, "t") => Some(Trim),
            (_, "lt") => Some(LeftTrim),
            (_, "rt") => Some(RightTrim),
            (_, "nt") => Some(NoTrim),
            (_, "flush") => Some(Flush),
            (_, "stop") => Some(Stop),
            (_, "compress") => Some(Compress),
            (Dialect::Fm2, "autoesc") | (_, "autoEsc") => Some(AutoEsc),
            (Dialect::Fm2, "noautoesc") | (_, "noAutoEsc") => Some(NoAutoEsc),
            (_, "switch") => Some(Switch),
            (_, "case") => Some(Case),
            (_, "default") => Some(Default),
            (_, "import") => Some(Import),
            (Dialect::Fm2, "noparse") | (_, "noParse") => Some(NoParse),
            (_, "macro") => Some(Macro),
            (_, "function") => Some(Function),
            (_, "nested") => Some(Nested),
            (_, "return") => Some(Return),
            (_, "include") => Some(Include),
            (_, "setting") => Some(Setting),
            (_, "escape") => Some(Escape),
            (Dialect::Fm2, "noescape") | (_, "noEscape") => Some(NoEscape),
            (_, "visit") => Some(Visit),
            (_, "recurse") => Some(Recurse),
            (_, "fallback") => Some(Fallback),
            (Dialect::Fm2, "outputformat") | (_, "outputFormat") => Some(OutputFormat),
            (_, "ftl") => Some(Ftl),
            _ => None,
        };
        match known {
            Some(directive) => DirectiveLookup::Known(directive),
            None if UNSUPPORTED.contains(&name) => DirectiveLookup::Unsupported,
            None => DirectiveLookup::Unknown,
        }
    }

    pub fn end_tag(self, name: &str) -> Option<EndTagKey> {
        use EndTagKey::*;
        Some(match (self, name) {
            (_, "if") => If,
            (_, "list") | (Dialect::Fm2, "foreach") | (Dialect::Fm2, "forEach") => List,
            (_, "items") => Items,
            (_, "sep") => Sep,
            (_, "attempt") | (Dialect::Fm2, "recover") => Attempt,
            (_, "compress") => Compress,
            (Dialect::Fm2, "autoesc") | (_, "autoEsc") => AutoEsc,
            (Dialect::Fm2, "noautoesc") | (_, "noAutoEsc") => NoAutoEsc,
            (_, "switch") => Switch,
            (_, "assign") => Assign,
            (_, "global") => Global,
            (_, "local") => Local,
            (_, "macro") => Macro,
            (_, "function") => Function,
            (_, "escape") => Escape,
            (Dialect::Fm2, "noescape") | (_, "noEscape") => NoEscape,
            (Dialect::Fm2, "outputformat") | (_, "outputFormat") => OutputFormat,
            _ => return None,
        })
    }

    /// Spellings of the `noparse` end tag, searched for literally.
    pub fn noparse_names(self) -> &'static [&'static str] {
        match self {
            Dialect::Fm2 => &["noparse", "noParse"],
            Dialect::Fm3 => &["noParse"],
        }
    }

    /// Names `#setting` accepts.
    pub fn setting_names(self) -> &'static [&'static str] {
        match self {
            Dialect::Fm2 => FM2_SETTINGS,
            Dialect::Fm3 => FM3_SETTINGS,
        }
    }

    pub fn is_setting(self, name: &str) -> bool {
        self.setting_names().contains(&name)
    }

    /// Parameter names of the `#ftl` header.
    pub fn is_ftl_parameter(self, name: &str) -> bool {
        match self {
            Dialect::Fm2 => FM2_FTL_PARAMETERS.contains(&name),
            Dialect::Fm3 => FM3_FTL_PARAMETERS.contains(&name),
        }
    }

    /// Names of the `#include` options, in parameter order: `parse`,
    /// `encoding`, then the missing-template switch.
    pub fn include_options(self) -> [&'static [&'static str]; 3] {
        match self {
            Dialect::Fm2 => [
                &["parse"],
                &["encoding"],
                &["ignore_missing", "ignoreMissing"],
            ],
            Dialect::Fm3 => [&[], &[], &["ignoreMissing"]],
        }
    }

    /// `#{...}` interpolations only exist in FM2.
    pub fn has_numerical_output(self) -> bool {
        self == Dialect::Fm2
    }

    /// FM2 also ends angle-bracket start tags with an unpaired `]`.
    pub fn allows_bracket_tag_end(self) -> bool {
        self == Dialect::Fm2
    }

    pub fn accepts_comparison(self, op: &str) -> bool {
        match self {
            Dialect::Fm2 => matches!(
                op,
                "==" | "="
                    | "!="
                    | "<"
                    | "<="
                    | ">"
                    | ">="
                    | "lt"
                    | "lte"
                    | "gt"
                    | "gte"
                    | "\\lt"
                    | "\\lte"
                    | "\\gt"
                    | "\\gte"
                    | "&lt;"
                    | "&lt;="
                    | "&gt;"
                    | "&gt;="
            ),
            Dialect::Fm3 => matches!(
                op,
                "==" | "!=" | "<" | "<=" | ">" | ">=" | "lt" | "le" | "gt" | "ge"
            ),
        }
    }

    pub fn accepts_and(self, op: &str) -> bool {
        match self {
            Dialect::Fm2 => matches!(op, "&&" | "&" | "\\and" | "&amp;&amp;"),
            Dialect::Fm3 => matches!(op, "&&" | "and"),
        }
    }

    pub fn accepts_or(self, op: &str) -> bool {
        match self {
            Dialect::Fm2 => matches!(op, "||" | "|"),
            Dialect::Fm3 => op == "||",
        }
    }
}
