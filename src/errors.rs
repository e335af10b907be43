//! fmconv Error Handling - Unified API
//!
//! Every failure in the crate is a [`ConvertError`]. None of them are
//! recoverable inside a conversion run: the first error aborts it and no
//! partial output is produced.

use miette::{Diagnostic, SourceSpan};
use miette::{LabeledSpan, NamedSource};
use std::fmt;
use std::sync::Arc;

use crate::ast::Position;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// The single error type
#[derive(Debug)]
pub struct ConvertError {
    /// What went wrong
    pub kind: ErrorKind,
    /// Which node, and where in the template
    pub location: Option<Location>,
    /// Source snippet for rich reports; absent for errors raised away from
    /// any template text (I/O, configuration)
    pub source_info: Option<SourceInfo>,
    /// How to help
    pub diagnostic_info: DiagnosticInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Conversion errors - the printer met a tree it doesn't understand
    StructuralMismatch { node: String, message: String },
    UnhandledNodeKind { node: String, expected: String },
    ScanFailure { message: String },
    BuiltInMapping { name: String, attempted: String },
    BuiltInVariableMapping { name: String, attempted: String },
    SettingMapping { name: String, attempted: String },

    // Source errors - the template itself can't be handled
    Syntax { message: String },
    UnconvertibleFeature { message: String },

    // Defects - the converter itself misbehaved
    RoundTrip { message: String },
    Internal { message: String },

    // Usage errors
    PreconditionViolation { message: String },
    Config { message: String },

    // Environment errors
    Io { path: String, message: String },
}

/// Where in the template an error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub node_kind: Option<String>,
    pub position: Position,
}

/// Context-specific source information
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
}

/// Diagnostic enhancement data
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// Context-aware error creation. Implemented by whatever owns the source
/// text, so errors come out with a snippet attached.
pub trait ErrorReporting {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> ConvertError;

    fn syntax_error(&self, message: impl Into<String>, span: SourceSpan) -> ConvertError {
        self.report(
            ErrorKind::Syntax {
                message: message.into(),
            },
            span,
        )
    }

    fn scan_failure(&self, message: impl Into<String>, span: SourceSpan) -> ConvertError {
        self.report(
            ErrorKind::ScanFailure {
                message: message.into(),
            },
            span,
        )
    }

    /// Internal errors indicate converter bugs, not template problems.
    fn internal_error(&self, message: impl Into<String>, span: SourceSpan) -> ConvertError {
        let mut error = self.report(
            ErrorKind::Internal {
                message: message.into(),
            },
            span,
        );
        error.diagnostic_info.help =
            Some("This is an internal converter error. Please report this as a bug.".into());
        error
    }
}

impl ErrorKind {
    /// Get the error category for test assertions and exit handling
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::StructuralMismatch { .. }
            | Self::UnhandledNodeKind { .. }
            | Self::ScanFailure { .. }
            | Self::BuiltInMapping { .. }
            | Self::BuiltInVariableMapping { .. }
            | Self::SettingMapping { .. } => ErrorCategory::Conversion,

            Self::Syntax { .. } | Self::UnconvertibleFeature { .. } => ErrorCategory::Source,

            Self::RoundTrip { .. } | Self::Internal { .. } => ErrorCategory::Defect,

            Self::PreconditionViolation { .. } | Self::Config { .. } => ErrorCategory::Usage,

            Self::Io { .. } => ErrorCategory::Environment,
        }
    }

    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::StructuralMismatch { .. } => "structural_mismatch",
            Self::UnhandledNodeKind { .. } => "unhandled_node_kind",
            Self::ScanFailure { .. } => "scan_failure",
            Self::BuiltInMapping { .. } => "builtin_mapping",
            Self::BuiltInVariableMapping { .. } => "builtin_variable_mapping",
            Self::SettingMapping { .. } => "setting_mapping",
            Self::Syntax { .. } => "syntax",
            Self::UnconvertibleFeature { .. } => "unconvertible_feature",
            Self::RoundTrip { .. } => "round_trip",
            Self::Internal { .. } => "internal",
            Self::PreconditionViolation { .. } => "precondition_violation",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
        }
    }

    fn default_help(&self) -> Option<&'static str> {
        match self {
            Self::StructuralMismatch { .. } | Self::UnhandledNodeKind { .. } => Some(
                "The parse tree doesn't have the shape the converter expects; the template was left untouched.",
            ),
            Self::BuiltInMapping { .. } => {
                Some("Replace the built-in with an FM3 equivalent manually, then convert again.")
            }
            Self::BuiltInVariableMapping { .. } => {
                Some("FM3 has no such special variable; remove or replace the reference by hand.")
            }
            Self::SettingMapping { .. } => {
                Some("FM3 doesn't have this setting; remove the #setting by hand.")
            }
            Self::UnconvertibleFeature { .. } => {
                Some("Rewrite this part of the template by hand before converting.")
            }
            Self::RoundTrip { .. } => Some(
                "The converter produced output that FM3 can't parse. Please report this as a bug.",
            ),
            Self::PreconditionViolation { .. } => {
                Some("Parse the template with whitespace stripping disabled.")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The template can't be parsed or uses something FM3 lacks
    Source,
    /// The printer rejected the parse tree
    Conversion,
    /// A bug in the converter
    Defect,
    /// The caller broke a contract
    Usage,
    /// File system trouble
    Environment,
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

impl ConvertError {
    /// Creates an error with no source attached.
    pub fn new(kind: ErrorKind) -> Self {
        let diagnostic_info = DiagnosticInfo {
            help: kind.default_help().map(str::to_string),
            error_code: format!("fmconv::{}", kind.code_suffix()),
        };
        Self {
            kind,
            location: None,
            source_info: None,
            diagnostic_info,
        }
    }

    pub fn at(mut self, node_kind: Option<&str>, position: Position) -> Self {
        self.location = Some(Location {
            node_kind: node_kind.map(str::to_string),
            position,
        });
        self
    }

    pub fn with_source(mut self, source: Arc<NamedSource<String>>, span: SourceSpan) -> Self {
        self.source_info = Some(SourceInfo {
            source,
            primary_span: span,
        });
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn io(path: impl Into<String>, error: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io {
            path: path.into(),
            message: error.to_string(),
        })
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config {
            message: message.into(),
        })
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionViolation {
            message: message.into(),
        })
    }

    /// Wraps an error raised while re-parsing converted output.
    pub fn round_trip(cause: &ConvertError) -> Self {
        let mut error = Self::new(ErrorKind::RoundTrip {
            message: cause.kind.to_string(),
        });
        error.location = cause.location.clone();
        error.source_info = cause.source_info.clone();
        error
    }
}

impl std::error::Error for ConvertError {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::StructuralMismatch { node, message } => {
                write!(f, "Unexpected {} node content: {}", node, message)?
            }
            ErrorKind::UnhandledNodeKind { node, expected } => {
                write!(f, "Unhandled node kind {} (expected {})", node, expected)?
            }
            ErrorKind::ScanFailure { message } => write!(f, "Scan failure: {}", message)?,
            ErrorKind::BuiltInMapping { name, attempted } => write!(
                f,
                "Couldn't map \"{}\" to a valid FM3 built-in name (tried: {})",
                name, attempted
            )?,
            ErrorKind::BuiltInVariableMapping { name, attempted } => write!(
                f,
                "Couldn't map \"{}\" to a valid FM3 built-in variable name (tried: {})",
                name, attempted
            )?,
            ErrorKind::SettingMapping { name, attempted } => write!(
                f,
                "Couldn't map \"{}\" to a valid FM3 setting name (tried: {})",
                name, attempted
            )?,
            ErrorKind::Syntax { message } => write!(f, "Syntax error: {}", message)?,
            ErrorKind::UnconvertibleFeature { message } => {
                write!(f, "Unconvertible legacy feature: {}", message)?
            }
            ErrorKind::RoundTrip { message } => write!(
                f,
                "Conversion produced invalid FM3 text: {}",
                message
            )?,
            ErrorKind::Internal { message } => write!(f, "Internal error: {}", message)?,
            ErrorKind::PreconditionViolation { message } => {
                write!(f, "Precondition violated: {}", message)?
            }
            ErrorKind::Config { message } => write!(f, "Configuration error: {}", message)?,
            ErrorKind::Io { path, message } => write!(f, "I/O error on {}: {}", path, message)?,
        }
        Ok(())
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(location) = &self.location {
            write!(f, " (at {}", location.position)?;
            if let Some(node_kind) = &location.node_kind {
                write!(f, ", in {}", node_kind)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl Diagnostic for ConvertError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_info
            .as_ref()
            .map(|info| info.source.as_ref() as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let info = self.source_info.as_ref()?;
        let label = match &self.kind {
            ErrorKind::Syntax { .. } => "here",
            ErrorKind::BuiltInMapping { .. } => "this built-in",
            ErrorKind::BuiltInVariableMapping { .. } => "this built-in variable",
            ErrorKind::SettingMapping { .. } => "this setting",
            ErrorKind::ScanFailure { .. } => "scanning stopped here",
            _ => "this node",
        };
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(label.to_string()),
            info.primary_span,
        ))))
    }
}

// ============================================================================
// UTILITIES
// ============================================================================

pub fn to_source_span(start: usize, end: usize) -> SourceSpan {
    SourceSpan::new(start.into(), end.saturating_sub(start))
}

/// Render an error with miette's graphical handler.
pub fn print_error(error: ConvertError) {
    use miette::Report;
    let report = Report::new(error);
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_namespaced() {
        let error = ConvertError::new(ErrorKind::ScanFailure {
            message: "x".into(),
        });
        assert_eq!(error.diagnostic_info.error_code, "fmconv::scan_failure");
    }

    #[test]
    fn display_includes_location() {
        let error = ConvertError::new(ErrorKind::StructuralMismatch {
            node: "Dot".into(),
            message: "Unexpected parameter count, 3.".into(),
        })
        .at(Some("Dot"), Position::new(3, 7));
        assert_eq!(
            error.to_string(),
            "Unexpected Dot node content: Unexpected parameter count, 3. (at 3:7, in Dot)"
        );
    }

    #[test]
    fn round_trip_keeps_cause_location() {
        let cause = ConvertError::new(ErrorKind::Syntax {
            message: "Unknown directive #elseif".into(),
        })
        .at(None, Position::new(1, 10));
        let error = ConvertError::round_trip(&cause);
        assert_eq!(error.category(), ErrorCategory::Defect);
        assert_eq!(error.location, cause.location);
        assert!(error.to_string().contains("Unknown directive #elseif"));
    }
}
