//! Conversion options.
//!
//! Options come from the command line, optionally layered over a YAML file.
//! Everything has a default, so an empty file is a valid configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{ConvertError, ErrorKind};
use crate::syntax::{ParserConfig, TagSyntaxMode};

/// Template files picked up by default when converting a directory.
pub const DEFAULT_INCLUDE: &str = r"(?i)^.*\.(ftl|ftlh|ftlx|fm)$";

/// Extension changes applied unless turned off, keyed by lower-case FM2
/// extension.
pub const PREDEFINED_FILE_EXTENSION_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("ftl", "fm3"),
    ("ftlh", "fm3h"),
    ("ftlx", "fm3x"),
    ("fm", "fm3"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConversionOptions {
    pub tag_syntax: TagSyntaxMode,
    /// Only useful to reproduce an FM2 setup that strips whitespace; every
    /// conversion then fails its precondition.
    pub whitespace_stripping: bool,
    /// Must match the whole path relative to the source root, with `/`
    /// separators.
    pub include: String,
    pub exclude: Option<String>,
    pub file_extension_substitutions: BTreeMap<String, String>,
    pub no_predefined_file_extension_substitutions: bool,
    pub skip_unparsable_files: bool,
    pub create_destination: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            tag_syntax: TagSyntaxMode::AutoDetect,
            whitespace_stripping: false,
            include: DEFAULT_INCLUDE.to_string(),
            exclude: None,
            file_extension_substitutions: BTreeMap::new(),
            no_predefined_file_extension_substitutions: false,
            skip_unparsable_files: false,
            create_destination: false,
        }
    }
}

impl ConversionOptions {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConvertError> {
        // An empty document deserializes as null rather than an empty map.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let options: Self = serde_yaml::from_str(text)
            .map_err(|e| ConvertError::config(format!("Invalid configuration: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConvertError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConvertError::io(path.display().to_string(), &e))?;
        Self::from_yaml_str(&text).map_err(|e| match e.kind {
            ErrorKind::Config { message } => {
                ConvertError::config(format!("{}: {}", path.display(), message))
            }
            _ => e,
        })
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        self.include_regex()?;
        self.exclude_regex()?;
        for (from, to) in &self.file_extension_substitutions {
            for extension in [from, to] {
                if extension.is_empty() || extension.contains('.') {
                    return Err(ConvertError::config(format!(
                        "Invalid file extension substitution {:?} → {:?}: extensions must be non-empty and contain no \".\"",
                        from, to
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn include_regex(&self) -> Result<Regex, ConvertError> {
        compile("include", &self.include)
    }

    pub fn exclude_regex(&self) -> Result<Option<Regex>, ConvertError> {
        self.exclude
            .as_deref()
            .map(|pattern| compile("exclude", pattern))
            .transpose()
    }

    /// The predefined substitutions (unless disabled) overridden by the
    /// user's. Keys are lower-case.
    pub fn effective_extension_substitutions(&self) -> BTreeMap<String, String> {
        let mut substitutions = BTreeMap::new();
        if !self.no_predefined_file_extension_substitutions {
            for (from, to) in PREDEFINED_FILE_EXTENSION_SUBSTITUTIONS {
                substitutions.insert(from.to_string(), to.to_string());
            }
        }
        for (from, to) in &self.file_extension_substitutions {
            substitutions.insert(from.to_lowercase(), to.clone());
        }
        substitutions
    }

    /// How source templates are parsed.
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig::fm2()
            .with_tag_syntax(self.tag_syntax)
            .with_whitespace_stripping(self.whitespace_stripping)
    }
}

/// Anchored: a pattern has to match the whole path.
fn compile(what: &str, pattern: &str) -> Result<Regex, ConvertError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
        ConvertError::config(format!("Invalid {} pattern {:?}: {}", what, pattern, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    #[test]
    fn empty_yaml_gives_defaults() {
        assert_eq!(
            ConversionOptions::from_yaml_str("").unwrap(),
            ConversionOptions::default()
        );
    }

    #[test]
    fn yaml_overrides_defaults() {
        let options = ConversionOptions::from_yaml_str(
            "tag-syntax: square\nskip-unparsable-files: true\nfile-extension-substitutions:\n  html: fm3h\n",
        )
        .unwrap();
        assert_eq!(options.tag_syntax, TagSyntaxMode::SquareBracket);
        assert!(options.skip_unparsable_files);
        assert_eq!(options.include, DEFAULT_INCLUDE);
        assert_eq!(
            options.effective_extension_substitutions().get("html"),
            Some(&"fm3h".to_string())
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ConversionOptions::from_yaml_str("no-such-option: 1").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Usage);
    }

    #[test]
    fn validation_catches_bad_patterns_and_extensions() {
        let options = ConversionOptions {
            include: "(".into(),
            ..ConversionOptions::default()
        };
        assert!(options.validate().is_err());

        let mut options = ConversionOptions::default();
        options
            .file_extension_substitutions
            .insert("ftl".into(), "fm.3".into());
        assert!(options.validate().is_err());
    }

    #[test]
    fn predefined_substitutions_can_be_disabled() {
        let mut options = ConversionOptions::default();
        assert_eq!(options.effective_extension_substitutions().len(), 4);
        options.no_predefined_file_extension_substitutions = true;
        options
            .file_extension_substitutions
            .insert("FTL".into(), "fm3".into());
        let substitutions = options.effective_extension_substitutions();
        assert_eq!(substitutions.len(), 1);
        assert_eq!(substitutions.get("ftl"), Some(&"fm3".to_string()));
    }

    #[test]
    fn default_include_matches_template_extensions() {
        let include = ConversionOptions::default().include_regex().unwrap();
        assert!(include.is_match("a/b.ftl"));
        assert!(include.is_match("B.FTLH"));
        assert!(!include.is_match("readme.md"));

        let options = ConversionOptions {
            include: r".*\.html".into(),
            ..ConversionOptions::default()
        };
        let include = options.include_regex().unwrap();
        assert!(include.is_match("x/page.html"));
        assert!(!include.is_match("x/page.html.bak"));
    }
}
