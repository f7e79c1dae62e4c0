//! Code generation errors.

use crate::api::Diagnostic;
use crate::ast::ExprId;
use crate::syntax::Span;
use crate::{QName, format};

/// Errors that can occur during code generation.
///
/// None of these are the user's fault: type errors are caught by the checker
/// and code generation never starts when it reported one. They indicate a
/// broken invariant inside the compiler, or a program that exceeds the
/// machine's limits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// A jump was left without a target when its unit was finalized.
    #[error("jump at instruction {at} was never patched")]
    UnpatchedJump { at: usize },

    /// A reference that failed to resolve reached code generation.
    #[error("reference to ${name} reached code generation unresolved")]
    UnresolvedReference { name: QName },

    /// Code generation was asked to translate a node without a type.
    #[error("expression {node:?} was not type-checked")]
    NotTypeChecked { node: ExprId },

    /// Too many local variables (limit: ~4 billion)
    #[error("too many local variables")]
    TooManyLocals,

    /// Too many constants in constant pool (limit: ~4 billion)
    #[error("too many constants")]
    TooManyConstants,
}

impl CompileError {
    /// Convert to a Diagnostic for API boundary.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(format!("internal compiler error: {}", self), Span::default())
            .with_help(Some("this is a bug in xpathc, please report it"))
    }
}
