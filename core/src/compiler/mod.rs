//! Code generation.
//!
//! Turns a type-checked program into machine code. Conditions are emitted
//! as jumps collected in [`FlowList`]s and backpatched once their targets
//! are known, so `and`, `or`, `not()` and pattern tests never materialize
//! intermediate booleans.
//!
//! ## Design
//!
//! - Jumps use absolute [`Label`](crate::vm::Label)s; a [`Hole`] is the
//!   index of a jump whose target is still pending
//! - Finishing a unit with a pending jump is an internal error
//! - Constants and node tests go to one pool shared by all units of an
//!   [`Executable`], so compiled patterns can be spliced anywhere

mod buffer;
mod codegen;
mod error;
mod executable;
mod flow_list;
mod patterns;


pub use buffer::{CodeBuffer, Hole};
pub use codegen::{CodeGenerator, Desynthesized, compile_expression};
pub use error::CompileError;
pub use executable::{Executable, GlobalUnit, TemplateUnit};
pub use flow_list::FlowList;
pub use patterns::{CompiledPattern, PatternCache};
