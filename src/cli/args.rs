//! Defines the command-line arguments and subcommands for the fmconv CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::syntax::{Dialect, TagSyntaxMode};

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "fmconv",
    version,
    about = "Converts FreeMarker 2 templates to FreeMarker 3 syntax, keeping their formatting."
)]
pub struct FmconvArgs {
    /// Log more: -v for progress, -vv for every directive. FMCONV_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a template file, or every template under a directory.
    Convert {
        /// The file or directory to convert.
        #[arg(required = true)]
        source: PathBuf,
        /// The directory where the converted files are written.
        #[arg(short, long, required = true)]
        destination: PathBuf,
        /// Create the destination directory if it doesn't exist yet.
        #[arg(short = 'p', long)]
        create_destination: bool,
        /// Only convert files whose source-relative path fully matches this regex.
        #[arg(long, value_name = "REGEX")]
        include: Option<String>,
        /// Skip files whose source-relative path fully matches this regex.
        #[arg(long, value_name = "REGEX")]
        exclude: Option<String>,
        /// Replace a file extension, on top of the predefined ones.
        #[arg(
            short = 'E',
            long = "file-ext-subst",
            value_name = "OLD=NEW",
            value_parser = parse_substitution
        )]
        file_extension_substitutions: Vec<(String, String)>,
        /// Don't replace ftl, ftlh, ftlx and fm with their FM3 extensions.
        #[arg(long = "no-predef-file-ext-substs")]
        no_predefined_file_extension_substitutions: bool,
        /// Skip files that aren't valid FM2 templates, leaving a marker.
        #[arg(long)]
        skip_unparsable_files: bool,
        /// Tag syntax of the source templates.
        #[arg(long, value_enum)]
        tag_syntax: Option<TagSyntaxArg>,
        /// YAML file with conversion options; flags given here win.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Parse a template and report whether it is valid.
    Check {
        /// The template to parse.
        #[arg(required = true)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = DialectArg::Fm2)]
        dialect: DialectArg,
    },
    /// Show the parse tree of a template as JSON.
    Ast {
        /// The template to parse.
        #[arg(required = true)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = DialectArg::Fm2)]
        dialect: DialectArg,
    },
    /// Convert a single template and print the result.
    Print {
        /// The FM2 template to convert.
        #[arg(required = true)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = TagSyntaxArg::Auto)]
        tag_syntax: TagSyntaxArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Fm2,
    Fm3,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Fm2 => Dialect::Fm2,
            DialectArg::Fm3 => Dialect::Fm3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TagSyntaxArg {
    Auto,
    Angle,
    Square,
}

impl From<TagSyntaxArg> for TagSyntaxMode {
    fn from(arg: TagSyntaxArg) -> Self {
        match arg {
            TagSyntaxArg::Auto => TagSyntaxMode::AutoDetect,
            TagSyntaxArg::Angle => TagSyntaxMode::AngleBracket,
            TagSyntaxArg::Square => TagSyntaxMode::SquareBracket,
        }
    }
}

fn parse_substitution(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => {
            Ok((from.to_string(), to.to_string()))
        }
        _ => Err(format!("expected OLD=NEW, found {:?}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        FmconvArgs::command().debug_assert();
    }

    #[test]
    fn substitutions_need_both_sides() {
        assert_eq!(
            parse_substitution("ftl=fm3"),
            Ok(("ftl".to_string(), "fm3".to_string()))
        );
        assert!(parse_substitution("ftl").is_err());
        assert!(parse_substitution("=fm3").is_err());
    }
}
