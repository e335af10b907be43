//! Handles all user-facing output for the CLI.
//!
//! Results go to stdout; summaries and diagnostics go to stderr so that
//! `fmconv print` output can be redirected cleanly.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::driver::ConversionReport;
use crate::errors::{print_error, ConvertError};

// ============================================================================
// CORE OUTPUT FUNCTIONS
// ============================================================================

/// One-line outcome of a batch conversion, plus any markers.
pub fn print_summary(report: &ConversionReport) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    for marker in &report.markers {
        write_colored(&mut stderr, Color::Yellow, false, &marker.to_string());
    }
    if report.converted.is_empty() && report.skipped.is_empty() {
        write_colored(&mut stderr, Color::Yellow, true, "No file to convert was found.");
        return;
    }
    let mut line = format!(
        "Conversion finished successfully. Converted {} file(s)",
        report.converted.len()
    );
    if !report.skipped.is_empty() {
        line.push_str(&format!(", skipped {}", report.skipped.len()));
    }
    line.push('.');
    write_colored(&mut stderr, Color::Green, true, &line);
}

pub fn print_check_passed(name: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    write_colored(&mut stdout, Color::Green, true, &format!("{}: OK", name));
}

/// Miette report, followed by a coloured headline naming the category.
pub fn print_failure(error: ConvertError) {
    let headline = format!("Conversion failed ({:?} error)", error.category());
    print_error(error);
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    write_colored(&mut stderr, Color::Red, true, &headline);
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn write_colored(stream: &mut StandardStream, color: Color, bold: bool, text: &str) {
    let _ = stream.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = writeln!(stream, "{}", text);
    let _ = stream.reset();
}
