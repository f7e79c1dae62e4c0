mod operators;
mod types;

#[cfg(test)]
mod types_test;

pub use operators::{OperatorMatch, lookup_operator};
pub use types::{Type, TypeTag};

use crate::compiler::CodeBuffer;
use crate::vm::Instruction;

/// Emit the instructions converting the value on top of the stack from
/// `from` to `to`.
///
/// The conversion must already have been validated by the type checker;
/// identical types emit nothing.
pub fn coerce(from: &Type, to: &Type, buffer: &mut CodeBuffer) {
    debug_assert!(
        from.can_coerce_to(to),
        "unchecked coercion from {} to {}",
        from,
        to
    );
    if from == to {
        return;
    }
    buffer.append(Instruction::Convert {
        from: from.tag(),
        to: to.tag(),
    });
}
