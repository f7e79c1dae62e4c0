//! Errors and diagnostics returned by the public API.
//!
//! The passes have their own error types ([`TypeCheckError`],
//! [`CompileError`], [`RuntimeError`], [`ProgramError`]). They are folded
//! into [`Error`] when they cross the API boundary; type errors keep their
//! source locations as [`Diagnostic`]s so a front end can point at the
//! stylesheet.
//!
//! [`TypeCheckError`]: crate::analyzer::TypeCheckError
//! [`CompileError`]: crate::compiler::CompileError
//! [`RuntimeError`]: crate::vm::RuntimeError
//! [`ProgramError`]: crate::program::ProgramError

use core::fmt;

use crate::syntax::Span;
use crate::{String, ToString, Vec, format};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The program did not type-check. Holds one diagnostic per error,
    /// from every top-level construct that failed.
    #[error("compilation failed with {} error(s)", count_errors(.diagnostics))]
    Compilation { diagnostics: Vec<Diagnostic> },

    /// A top-level construct could not be added to the program.
    #[error("invalid program: {0}")]
    Program(String),

    /// Code generation hit a broken invariant. Never caused by the program
    /// being compiled.
    #[error("internal compiler error: {0}")]
    Internal(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

fn count_errors(diagnostics: &[Diagnostic]) -> usize {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count()
}

impl Error {
    /// Diagnostics of a failed compilation; empty for other errors.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Error::Compilation { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// Diagnostics of severity [`Severity::Error`].
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.diagnostics()
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

/// A message about the program, located in the stylesheet source.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Byte range of the offending expression.
    pub span: Span,
    /// Other locations involved, e.g. the bindings along a circular
    /// reference chain.
    pub related: Vec<RelatedInfo>,
    pub help: Option<String>,
    /// Stable error code such as `E006`.
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
            related: Vec::new(),
            help: None,
            code: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_help(mut self, help: Option<impl Into<String>>) -> Self {
        self.help = help.map(Into::into);
        self
    }

    pub fn with_related(mut self, related: Vec<RelatedInfo>) -> Self {
        self.related = related;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}[{}]: {}", self.severity, code, self.message)?,
            None => write!(f, "{}: {}", self.severity, self.message)?,
        }
        for related in &self.related {
            write!(f, "\n  note: {} (at {}..{})", related.message, related.span.0.start, related.span.0.end)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// A secondary location attached to a [`Diagnostic`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedInfo {
    pub span: Span,
    pub message: String,
}

// ============================================================================
// Conversion from pass errors
// ============================================================================

impl From<crate::analyzer::TypeCheckError> for Error {
    fn from(err: crate::analyzer::TypeCheckError) -> Self {
        Self::from(crate::vec![err])
    }
}

impl From<Vec<crate::analyzer::TypeCheckError>> for Error {
    fn from(errors: Vec<crate::analyzer::TypeCheckError>) -> Self {
        Error::Compilation {
            diagnostics: errors.iter().map(|e| e.to_diagnostic()).collect(),
        }
    }
}

impl From<crate::program::ProgramError> for Error {
    fn from(err: crate::program::ProgramError) -> Self {
        Error::Program(format!("{}", err))
    }
}

impl From<crate::compiler::CompileError> for Error {
    fn from(err: crate::compiler::CompileError) -> Self {
        Error::Internal(format!("{}", err))
    }
}

impl From<crate::vm::RuntimeError> for Error {
    fn from(err: crate::vm::RuntimeError) -> Self {
        Error::Runtime(format!("{}", err))
    }
}
