//! Semantic analysis: type resolution and binding resolution.
//!
//! The checker runs over the whole program before any code is emitted. It
//! records every error it finds instead of stopping at the first one, so a
//! single run reports the problems of all independent top-level constructs.

mod bindings;
mod builtins;
mod checker;
pub mod error;

#[cfg(test)]
mod analyzer_test;

pub use bindings::Scope;
pub use builtins::{XSLT_NAMESPACE, element_available, function_available, is_class_name};
pub use checker::{CheckResult, Checker, Reported};
pub use error::{TypeCheckError, TypeCheckErrorKind};

use crate::{Vec, program::Program};

/// Type-check every top-level construct of `program`.
///
/// Returns all recorded errors when at least one was found. On success
/// every node reachable from a top-level construct carries its type.
pub fn check_program(program: &mut Program, max_errors: Option<usize>) -> Result<(), Vec<TypeCheckError>> {
    let mut checker = Checker::new(program).with_max_errors(max_errors);
    checker.check_program();
    if checker.has_errors() {
        Err(checker.into_errors())
    } else {
        Ok(())
    }
}
