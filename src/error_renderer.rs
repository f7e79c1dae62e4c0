//! Error rendering using ariadne
//!
//! Diagnostics carry byte spans into the stylesheet source the expression
//! trees were built from. These functions print them against that source
//! with labelled snippets, related locations and help notes.

use crate::{Diagnostic, Error, Severity};
use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use std::io::Write;

/// Render an error with formatting to stderr
///
/// # Example
/// ```no_run
/// use xpathc::{CompilationOptions, Compiler, QName, render_error};
/// use xpathc::program::Program;
///
/// let source = "$missing";
/// let mut program = Program::new();
/// let reference = program.ast_mut().reference(QName::local("missing"));
/// program.add_variable(QName::local("x"), reference).unwrap();
///
/// if let Err(e) = Compiler::new(CompilationOptions::default()).compile(&mut program) {
///     render_error(&e, source);
/// }
/// ```
pub fn render_error(error: &Error, source: &str) {
    render_error_to_writer(error, source, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(error: &Error, source: &str, writer: &mut dyn Write) -> std::io::Result<()> {
    render_error_to_writer(error, source, writer, true)
}

/// Render an error to a String (useful for tools and web UIs)
pub fn render_error_to_string(error: &Error, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &Error, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

pub fn render_diagnostics_to_string(diagnostics: &[Diagnostic], source: &str) -> String {
    let mut buf = Vec::new();
    render_diagnostics(source, diagnostics, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

pub fn render_diagnostics_to_string_no_color(diagnostics: &[Diagnostic], source: &str) -> String {
    let mut buf = Vec::new();
    render_diagnostics(source, diagnostics, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

fn render_error_to_writer(
    error: &Error,
    source: &str,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    match error {
        Error::Compilation { diagnostics } => render_diagnostics(source, diagnostics, writer, use_color),
        Error::Program(msg) => {
            writeln!(writer, "Invalid program: {}", msg)
        }
        Error::Internal(msg) => {
            writeln!(writer, "Internal compiler error: {}", msg)
        }
        Error::Runtime(msg) => {
            writeln!(writer, "Runtime error: {}", msg)
        }
    }
}

/// Spans past the end of `source` are clamped so a stale span still renders.
fn clamp(span: &std::ops::Range<usize>, source: &str) -> std::ops::Range<usize> {
    let end = span.end.min(source.len());
    span.start.min(end)..end
}

fn render_diagnostics(
    source: &str,
    diagnostics: &[Diagnostic],
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    for diag in diagnostics {
        let mut colors = ColorGenerator::new();
        colors.next(); // Skip the first color.

        let kind = match diag.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Info => ReportKind::Advice,
        };

        let span = clamp(&diag.span.0, source);
        let mut report = Report::build(kind, ("<stylesheet>", span.clone()))
            .with_message(&diag.message)
            .with_config(ariadne::Config::default().with_color(use_color));

        if let Some(code) = &diag.code {
            report = report.with_code(code);
        }

        let color = colors.next();
        report = report.with_label(
            Label::new(("<stylesheet>", span))
                .with_message(&diag.message)
                .with_color(color),
        );

        // Related locations, e.g. the binding a circular reference runs through.
        for related in &diag.related {
            let color = colors.next();
            report = report.with_label(
                Label::new(("<stylesheet>", clamp(&related.span.0, source)))
                    .with_message(&related.message)
                    .with_color(color),
            );
        }

        if let Some(help) = &diag.help {
            report = report.with_help(help);
        }

        report.finish().write(("<stylesheet>", Source::from(source)), &mut *writer)?;
    }

    Ok(())
}
