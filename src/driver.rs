//! Batch conversion of a file or a directory tree.
//!
//! Files are converted one by one into the destination directory, mirroring
//! the source layout. The first failure stops the run, except parse errors
//! when unparsable files are to be skipped: those become markers, written to
//! [`CONVERSION_MARKERS_FILE_NAME`] in the destination. Conversion warnings
//! land in the same file.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::ast::Position;
use crate::config::ConversionOptions;
use crate::convert::Converter;
use crate::errors::{ConvertError, ErrorKind};
use crate::syntax::{parse_template, ParserConfig};
use crate::target::{Fm3Dialect, TargetDialect};

pub const CONVERSION_MARKERS_FILE_NAME: &str = "__conversion-markers.txt";

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Warning,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKind::Warning => f.write_str("WARN"),
        }
    }
}

/// Something a human should look at after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// Relative to the source root, with `/` separators.
    pub path: String,
    pub position: Position,
    pub message: String,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Continuation lines are indented so every marker starts a line.
        let message = self
            .message
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace('\n', "\n\t");
        write!(
            f,
            "[{}] {}:{}:{}: {}",
            self.kind, self.path, self.position.line, self.position.column, message
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    /// Destination files written.
    pub converted: Vec<PathBuf>,
    /// Source files left alone.
    pub skipped: Vec<PathBuf>,
    pub markers: Vec<Marker>,
}

// ============================================================================
// DRIVER
// ============================================================================

pub struct Driver<T: TargetDialect = Fm3Dialect> {
    converter: Converter<T>,
    parser_config: ParserConfig,
    include: Regex,
    exclude: Option<Regex>,
    substitutions: BTreeMap<String, String>,
    skip_unparsable_files: bool,
    create_destination: bool,
}

impl Driver<Fm3Dialect> {
    pub fn new(options: &ConversionOptions) -> Result<Self, ConvertError> {
        Self::with_converter(options, Converter::default())
    }
}

impl<T: TargetDialect> Driver<T> {
    pub fn with_converter(
        options: &ConversionOptions,
        converter: Converter<T>,
    ) -> Result<Self, ConvertError> {
        options.validate()?;
        Ok(Self {
            converter,
            parser_config: options.parser_config(),
            include: options.include_regex()?,
            exclude: options.exclude_regex()?,
            substitutions: options.effective_extension_substitutions(),
            skip_unparsable_files: options.skip_unparsable_files,
            create_destination: options.create_destination,
        })
    }

    pub fn run(&self, source: &Path, destination: &Path) -> Result<ConversionReport, ConvertError> {
        let _span = tracing::info_span!(
            "driver.run",
            source = %source.display(),
            destination = %destination.display()
        )
        .entered();
        self.prepare(source, destination)?;

        let markers_file = destination.join(CONVERSION_MARKERS_FILE_NAME);
        if markers_file.is_file() {
            fs::remove_file(&markers_file)
                .map_err(|e| ConvertError::io(markers_file.display().to_string(), &e))?;
        }

        let mut report = ConversionReport::default();
        for (path, relative) in self.source_files(source)? {
            if !self.is_to_be_processed(&relative) {
                tracing::debug!(file = %relative, "not included");
                continue;
            }
            self.convert_file(&path, &relative, destination, &mut report)?;
        }

        if !report.markers.is_empty() {
            let mut text = String::new();
            for marker in &report.markers {
                text.push_str(&marker.to_string());
                text.push('\n');
            }
            fs::write(&markers_file, text)
                .map_err(|e| ConvertError::io(markers_file.display().to_string(), &e))?;
        }
        tracing::info!(
            converted = report.converted.len(),
            skipped = report.skipped.len(),
            "conversion finished"
        );
        Ok(report)
    }

    fn prepare(&self, source: &Path, destination: &Path) -> Result<(), ConvertError> {
        if !source.exists() {
            return Err(ConvertError::config(format!(
                "Source file or directory doesn't exist: {}",
                source.display()
            )));
        }
        if destination.is_file() {
            return Err(ConvertError::config(format!(
                "Destination must be a directory, not a file: {}",
                destination.display()
            )));
        }
        if !destination.is_dir() {
            if !self.create_destination {
                return Err(ConvertError::config(format!(
                    "Destination directory doesn't exist: {}",
                    destination.display()
                )));
            }
            fs::create_dir_all(destination)
                .map_err(|e| ConvertError::io(destination.display().to_string(), &e))?;
            tracing::debug!(directory = %destination.display(), "created destination");
        }
        if source.is_dir() {
            let canonical = |path: &Path| {
                path.canonicalize()
                    .map_err(|e| ConvertError::io(path.display().to_string(), &e))
            };
            if canonical(destination)?.starts_with(canonical(source)?) {
                return Err(ConvertError::config(format!(
                    "The destination directory {} is inside the source directory",
                    destination.display()
                )));
            }
        }
        Ok(())
    }

    /// Files under `source` in a stable order, each with its relative path.
    fn source_files(&self, source: &Path) -> Result<Vec<(PathBuf, String)>, ConvertError> {
        if source.is_file() {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(vec![(source.to_path_buf(), name)]);
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map_or_else(|| source.display().to_string(), |p| p.display().to_string());
                ConvertError::new(ErrorKind::Io {
                    path,
                    message: e.to_string(),
                })
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source)
                .map(slash_path)
                .unwrap_or_else(|_| slash_path(entry.path()));
            files.push((entry.path().to_path_buf(), relative));
        }
        Ok(files)
    }

    fn is_to_be_processed(&self, relative: &str) -> bool {
        self.include.is_match(relative)
            && !self
                .exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(relative))
    }

    fn convert_file(
        &self,
        path: &Path,
        relative: &str,
        destination: &Path,
        report: &mut ConversionReport,
    ) -> Result<(), ConvertError> {
        tracing::debug!(file = %relative, "converting");
        let source = fs::read_to_string(path)
            .map_err(|e| ConvertError::io(path.display().to_string(), &e))?;

        let template = match parse_template(relative, &source, &self.parser_config) {
            Ok(template) => template,
            Err(error)
                if self.skip_unparsable_files
                    && matches!(error.kind, ErrorKind::Syntax { .. }) =>
            {
                tracing::warn!(file = %relative, %error, "skipping unparsable file");
                report.markers.push(Marker {
                    kind: MarkerKind::Warning,
                    path: relative.to_string(),
                    position: error
                        .location
                        .as_ref()
                        .map_or(Position::new(1, 1), |l| l.position),
                    message: format!("Skipped unparsable file: {}", error.kind),
                });
                report.skipped.push(path.to_path_buf());
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        let conversion = self.converter.convert_reporting(&template, &source)?;
        report
            .markers
            .extend(conversion.warnings.into_iter().map(|warning| Marker {
                kind: MarkerKind::Warning,
                path: relative.to_string(),
                position: warning.position,
                message: warning.message,
            }));
        let output = conversion.output;

        let target = destination.join(self.destination_relative_path(relative));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConvertError::io(parent.display().to_string(), &e))?;
        }
        fs::write(&target, output).map_err(|e| ConvertError::io(target.display().to_string(), &e))?;
        tracing::info!(file = %relative, output = %target.display(), "converted");
        report.converted.push(target);
        Ok(())
    }

    fn destination_relative_path(&self, relative: &str) -> PathBuf {
        let mut path = PathBuf::new();
        let mut segments = relative.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(substitute_extension(segment, &self.substitutions));
            }
        }
        path
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// `index.FTL` → `index.FM3`: the replacement follows the case of the
/// original extension's first letter.
pub fn substitute_extension(file_name: &str, substitutions: &BTreeMap<String, String>) -> String {
    let Some((stem, extension)) = file_name.rsplit_once('.') else {
        return file_name.to_string();
    };
    if stem.is_empty() {
        return file_name.to_string();
    }
    let Some(replacement) = substitutions.get(&extension.to_lowercase()) else {
        return file_name.to_string();
    };
    let upper = extension.chars().next().is_some_and(char::is_uppercase);
    let replacement = if upper {
        replacement.to_uppercase()
    } else {
        replacement.to_lowercase()
    };
    format!("{}.{}", stem, replacement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predefined() -> BTreeMap<String, String> {
        ConversionOptions::default().effective_extension_substitutions()
    }

    #[test]
    fn extension_substitution_follows_case() {
        let substitutions = predefined();
        assert_eq!(substitute_extension("a.ftl", &substitutions), "a.fm3");
        assert_eq!(substitute_extension("a.FTLH", &substitutions), "a.FM3H");
        assert_eq!(substitute_extension("a.Ftlx", &substitutions), "a.FM3X");
        assert_eq!(substitute_extension("a.txt", &substitutions), "a.txt");
        assert_eq!(substitute_extension(".ftl", &substitutions), ".ftl");
        assert_eq!(substitute_extension("noext", &substitutions), "noext");
    }

    #[test]
    fn marker_lines() {
        let marker = Marker {
            kind: MarkerKind::Warning,
            path: "sub/x.ftl".into(),
            position: Position::new(3, 4),
            message: "first\nsecond".into(),
        };
        assert_eq!(marker.to_string(), "[WARN] sub/x.ftl:3:4: first\n\tsecond");
    }

    #[test]
    fn include_and_exclude_use_relative_paths() {
        let options = ConversionOptions {
            exclude: Some("skip/.*".into()),
            ..ConversionOptions::default()
        };
        let driver = Driver::new(&options).unwrap();
        assert!(driver.is_to_be_processed("a/b.ftl"));
        assert!(!driver.is_to_be_processed("skip/b.ftl"));
        assert!(!driver.is_to_be_processed("a/b.txt"));
    }
}
