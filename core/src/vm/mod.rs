mod code;
mod document;
mod error;
mod instruction_set;
mod machine;
mod stack;
mod value;

#[cfg(test)]
mod machine_test;

pub use code::{Code, Constant, ConstantPool, PredicateFilter, StepTest};
pub use document::{Document, NodeId, XML_NAMESPACE};
pub use error::RuntimeError;
pub use instruction_set::{Instruction, Label, RuntimeFunction};
pub use machine::{Frame, Machine};
pub use value::Value;

pub(crate) use stack::Stack;
