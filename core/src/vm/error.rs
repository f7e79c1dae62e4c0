//! Errors raised while executing compiled code.
//!
//! Code produced by the compiler never mistypes the stack, so most of these
//! only show up when running hand-assembled code or a document that does not
//! satisfy a cast.

use ecow::EcoString;

use crate::{types::TypeTag, vm::Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch { expected: TypeTag, found: TypeTag },

    #[error("cannot convert {from} to {to}")]
    UnsupportedConversion { from: TypeTag, to: TypeTag },

    #[error("empty node-set where a node was required")]
    EmptyNodeSet,

    #[error("value of type {found} cannot be cast to {class}")]
    BadCast { class: EcoString, found: EcoString },

    #[error("operator {0} is not defined on this operand type")]
    UnsupportedOperator(&'static str),

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("stack underflow at instruction {0}")]
    StackUnderflow(usize),

    #[error("jump at instruction {0} was never patched")]
    UnpatchedJump(usize),

    #[error("constant #{0} is missing from the pool")]
    MissingConstant(u32),

    #[error("node test #{0} is missing from the pool")]
    MissingTest(u32),

    #[error("predicate filter #{0} is missing from the pool")]
    MissingFilter(u32),

    #[error("local {0} read before it was stored")]
    UninitializedLocal(u32),

    #[error("global {0} read before it was initialized")]
    UninitializedGlobal(u32),

    #[error("execution ran past the end of the code")]
    FellOffEnd,

    #[error("step limit of {0} instructions exceeded")]
    StepLimitExceeded(usize),
}

impl RuntimeError {
    pub fn type_mismatch(expected: TypeTag, found: &Value) -> Self {
        RuntimeError::TypeMismatch {
            expected,
            found: found.tag(),
        }
    }
}
