//! Error rendering using ariadne
//!
//! Compile failures that carry a position are shown as a report pointing into
//! the script source. Everything else is printed as a one-line message
//! followed by its cause chain.

use crate::{CompileError, Error};
use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use std::error::Error as _;
use std::io::Write;

const SOURCE_ID: &str = "<script>";

/// Render an error to stderr
///
/// `source` is the script the failing operation was working on, if any.
///
/// # Example
/// ```no_run
/// use scriptlink::{Binding, CompileOptions, ContextOptions, render_error};
///
/// let binding = Binding::load("dwscript.dll").unwrap();
/// let mut context = binding.create_context(ContextOptions::default()).unwrap();
///
/// let source = "begin PrintString(; end.";
/// if let Err(e) = context.compile(source, CompileOptions::default()) {
///     render_error(&e, Some(source));
/// }
/// ```
pub fn render_error(error: &Error, source: Option<&str>) {
    render_error_to_writer(error, source, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(
    error: &Error,
    source: Option<&str>,
    writer: &mut dyn Write,
) -> std::io::Result<()> {
    render_error_to_writer(error, source, writer, true)
}

/// Render an error to a String
pub fn render_error_to_string(error: &Error, source: Option<&str>) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &Error, source: Option<&str>) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

fn render_error_to_writer(
    error: &Error,
    source: Option<&str>,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    if let (Error::CompileFailure(compile), Some(source)) = (error, source) {
        if let Some(offset) = compile.offset_in(source) {
            return render_compile_error(compile, source, offset, writer, use_color);
        }
    }

    writeln!(writer, "Error: {}", error)?;
    let mut cause = error.source();
    while let Some(err) = cause {
        writeln!(writer, "  caused by: {}", err)?;
        cause = err.source();
    }
    Ok(())
}

fn render_compile_error(
    error: &CompileError,
    source: &str,
    offset: usize,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    let mut colors = ColorGenerator::new();
    colors.next(); // Skip the first color.

    // Highlight one character, or nothing at the very end of the source.
    let end = source[offset..]
        .chars()
        .next()
        .map_or(offset, |c| offset + c.len_utf8());
    let span = offset..end;

    let (message, location) = split_location(&error.message);
    let mut report = Report::build(ReportKind::Error, (SOURCE_ID, span.clone()))
        .with_message(message)
        .with_config(ariadne::Config::default().with_color(use_color));

    let label = match error.column {
        Some(column) => format!("reported here ({})", column_note(location, column)),
        None => String::from("reported on this line"),
    };
    report = report.with_label(
        Label::new((SOURCE_ID, span))
            .with_message(label)
            .with_color(colors.next()),
    );

    report
        .finish()
        .write((SOURCE_ID, Source::from(source)), &mut *writer)
}

/// Split `Syntax Error: ... [line: 3, column: 7]` into message and location.
fn split_location(message: &str) -> (&str, Option<&str>) {
    match message.rfind("[line:") {
        Some(start) => (message[..start].trim_end(), Some(&message[start..])),
        None => (message, None),
    }
}

fn column_note(location: Option<&str>, column: u32) -> String {
    match location {
        Some(location) => location.trim_matches(|c| c == '[' || c == ']').to_string(),
        None => format!("column {}", column),
    }
}
