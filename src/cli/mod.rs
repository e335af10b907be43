//! The fmconv Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions.

use clap::Parser;
use std::fs;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::ast::Template;
use crate::cli::args::{Command, FmconvArgs};
use crate::config::ConversionOptions;
use crate::convert::convert_source;
use crate::driver::Driver;
use crate::errors::{ConvertError, ErrorCategory, ErrorKind};
use crate::syntax::{parse_template, ParserConfig, TagSyntaxMode};

pub mod args;
pub mod output;

pub const SUCCESS_EXIT_STATUS: i32 = 0;
pub const EXECUTION_ERROR_EXIT_STATUS: i32 = 1;
/// Same status clap uses for malformed command lines.
pub const USAGE_ERROR_EXIT_STATUS: i32 = 2;

/// The main entry point for the CLI.
pub fn run() {
    let args = FmconvArgs::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Command::Convert {
            source,
            destination,
            create_destination,
            include,
            exclude,
            file_extension_substitutions,
            no_predefined_file_extension_substitutions,
            skip_unparsable_files,
            tag_syntax,
            config,
        } => {
            let overrides = Overrides {
                create_destination,
                include,
                exclude,
                file_extension_substitutions,
                no_predefined_file_extension_substitutions,
                skip_unparsable_files,
                tag_syntax: tag_syntax.map(TagSyntaxMode::from),
            };
            run_convert(&source, &destination, config.as_deref(), overrides)
        }
        Command::Check { file, dialect } => {
            let config = ParserConfig {
                dialect: dialect.into(),
                ..ParserConfig::fm2()
            };
            parse_file(&file, &config).map(|_| output::print_check_passed(&file.display().to_string()))
        }
        Command::Ast { file, dialect } => {
            let config = ParserConfig {
                dialect: dialect.into(),
                ..ParserConfig::fm2()
            };
            parse_file(&file, &config).and_then(|template| {
                let json = serde_json::to_string_pretty(&template).map_err(|e| {
                    ConvertError::new(ErrorKind::Internal {
                        message: format!("Failed to serialize the parse tree: {}", e),
                    })
                })?;
                println!("{}", json);
                Ok(())
            })
        }
        Command::Print { file, tag_syntax } => read_file(&file).and_then(|source| {
            let name = file.display().to_string();
            let converted = convert_source(&name, &source, tag_syntax.into())?;
            print!("{}", converted);
            Ok(())
        }),
    };

    match result {
        Ok(()) => process::exit(SUCCESS_EXIT_STATUS),
        Err(error) => {
            let status = match error.category() {
                ErrorCategory::Usage => USAGE_ERROR_EXIT_STATUS,
                _ => EXECUTION_ERROR_EXIT_STATUS,
            };
            output::print_failure(error);
            process::exit(status);
        }
    }
}

/// `FMCONV_LOG` wins; otherwise the verbosity flags pick the level.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "fmconv=warn",
        1 => "fmconv=info",
        _ => "fmconv=debug",
    };
    let filter = EnvFilter::try_from_env("FMCONV_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Command-line flags layered over the configuration file.
struct Overrides {
    create_destination: bool,
    include: Option<String>,
    exclude: Option<String>,
    file_extension_substitutions: Vec<(String, String)>,
    no_predefined_file_extension_substitutions: bool,
    skip_unparsable_files: bool,
    tag_syntax: Option<TagSyntaxMode>,
}

impl Overrides {
    fn apply(self, options: &mut ConversionOptions) {
        options.create_destination |= self.create_destination;
        options.no_predefined_file_extension_substitutions |=
            self.no_predefined_file_extension_substitutions;
        options.skip_unparsable_files |= self.skip_unparsable_files;
        if let Some(include) = self.include {
            options.include = include;
        }
        if self.exclude.is_some() {
            options.exclude = self.exclude;
        }
        if let Some(tag_syntax) = self.tag_syntax {
            options.tag_syntax = tag_syntax;
        }
        options
            .file_extension_substitutions
            .extend(self.file_extension_substitutions);
    }
}

fn run_convert(
    source: &Path,
    destination: &Path,
    config: Option<&Path>,
    overrides: Overrides,
) -> Result<(), ConvertError> {
    let mut options = match config {
        Some(path) => ConversionOptions::from_yaml_file(path)?,
        None => ConversionOptions::default(),
    };
    overrides.apply(&mut options);
    let report = Driver::new(&options)?.run(source, destination)?;
    output::print_summary(&report);
    Ok(())
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn read_file(path: &Path) -> Result<String, ConvertError> {
    fs::read_to_string(path).map_err(|e| ConvertError::io(path.display().to_string(), &e))
}

fn parse_file(path: &Path, config: &ParserConfig) -> Result<Template, ConvertError> {
    let source = read_file(path)?;
    parse_template(&path.display().to_string(), &source, config)
}
