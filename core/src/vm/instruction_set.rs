//! Instruction set of the xpathc machine.
//!
//! # Design Principles
//!
//! - **Stack-based**: operations consume operands from the stack and push results
//! - **Absolute jumps**: jump targets are instruction indices ([`Label`]), so a
//!   pending jump can be patched without knowing its final distance
//! - **Typed conversions**: every implicit conversion inserted by the type
//!   checker becomes an explicit [`Instruction::Convert`]
//! - **Pooled operands**: strings, reals, class names and node tests live in
//!   the program-wide [`ConstantPool`](super::ConstantPool)
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`

use core::fmt;

use crate::syntax::{Axis, BinaryOp};
use crate::types::TypeTag;

/// Absolute instruction index used as a jump target.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl Label {
    /// Target of a jump that has not been backpatched yet.
    pub const PENDING: Label = Label(u32::MAX);

    pub fn is_pending(self) -> bool {
        self == Self::PENDING
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pending() {
            write!(f, "?")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}

/// Functions implemented by the node runtime rather than by instructions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeFunction {
    /// Stack: [..., haystack: String, prefix: String] -> [..., Boolean]
    StartsWith,
    /// Stack: [..., lang: String, node: Node] -> [..., Boolean]
    Lang,
    /// Stack: [..., node: Node | NodeSet] -> [..., String]
    GenerateId,
    /// Stack: [..., name: String] -> [..., String]
    UnparsedEntityUri,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // ========================================================================
    // Stack & Constants
    // ========================================================================
    /// Stack: [...] -> [..., Boolean]
    ConstBool(bool),
    /// Stack: [...] -> [..., Int]
    ConstInt(i64),
    /// Push constant from the pool (reals and strings)
    /// Stack: [...] -> [..., value]
    ConstLoad(u32),
    /// Stack: [...] -> [..., value]
    LoadLocal(u32),
    /// Stack: [..., value] -> [...]
    StoreLocal(u32),
    /// Load an already initialized global variable or parameter.
    /// Stack: [...] -> [..., value]
    LoadGlobal(u32),

    // ========================================================================
    // Context
    // ========================================================================
    /// Push the context node of the current frame.
    LoadContextNode,
    /// Push the node held in the current-node register (pattern matching).
    LoadCurrentNode,
    /// Stack: [..., node] -> [...], sets the current-node register.
    SetCurrentNode,
    /// Stack: [...] -> [..., Int]
    Position,
    /// Stack: [...] -> [..., Int]
    Last,
    /// Position and size of the current node among its siblings that pass
    /// the pooled node test.
    /// Stack: [...] -> [..., position: Int, size: Int]
    StepContext(u32),
    /// Like `StepContext`, counting only the siblings that also pass every
    /// unit of the pooled predicate filter.
    /// Stack: [...] -> [..., position: Int, size: Int]
    FilteredStepContext { test: u32, filter: u32 },

    // ========================================================================
    // Conversions
    // ========================================================================
    /// Stack: [..., a: from] -> [..., a': to]
    Convert { from: TypeTag, to: TypeTag },
    /// Rewind a node-set iterator before it is consumed.
    /// Stack: [..., NodeSet] -> [..., NodeSet]
    StartIterator,
    /// Cast a reference to the pooled class name.
    /// Stack: [..., Reference] -> [..., Object]
    CheckCast(u32),

    // ========================================================================
    // Arithmetic & Comparison
    // ========================================================================
    /// Stack: [..., a: Int, b: Int] -> [..., Int]
    IntBinOp(BinaryOp),
    /// Stack: [..., a: Real, b: Real] -> [..., Real]
    RealBinOp(BinaryOp),
    /// Stack: [..., a: Int] -> [..., -a]
    NegInt,
    /// Stack: [..., a: Real] -> [..., -a]
    NegReal,
    /// Stack: [..., a, b] -> [..., Boolean]
    Compare { op: BinaryOp, operands: TypeTag },

    // ========================================================================
    // Nodes
    // ========================================================================
    /// Stack: [..., Node | NodeSet] -> [..., NodeSet]
    AxisStep { axis: Axis, test: u32 },
    /// Test the current node against a pooled node test.
    /// Stack: [...] -> [..., Boolean]
    TestNode(u32),
    /// Move the current-node register to its parent.
    /// Stack: [...] -> [..., Boolean] (false when there is no parent)
    ToParent,
    CallRuntime(RuntimeFunction),

    // ========================================================================
    // Control Flow
    // ========================================================================
    Goto(Label),
    /// Stack: [..., Boolean] -> [...]
    JumpIfFalse(Label),
    /// Stack: [..., value] -> []
    Return,
}

impl Instruction {
    /// The target of a jump instruction.
    pub const fn jump_target(&self) -> Option<Label> {
        match self {
            Self::Goto(label) | Self::JumpIfFalse(label) => Some(*label),
            _ => None,
        }
    }

    /// True for a jump whose target has not been backpatched yet.
    pub fn is_pending_jump(&self) -> bool {
        self.jump_target().is_some_and(Label::is_pending)
    }

    /// The same jump instruction aimed at `target`.
    pub fn with_target(self, target: Label) -> Self {
        match self {
            Self::Goto(_) => Self::Goto(target),
            Self::JumpIfFalse(_) => Self::JumpIfFalse(target),
            other => other,
        }
    }

    /// Check if this is a control flow instruction
    pub const fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Self::Goto(_) | Self::JumpIfFalse(_) | Self::Return
        )
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntBinOp(op) => write!(f, "IntBinOp({})", op.symbol()),
            Self::RealBinOp(op) => write!(f, "RealBinOp({})", op.symbol()),
            Self::Compare { op, operands } => write!(f, "Compare({} {})", operands, op.symbol()),
            Self::Convert { from, to } => write!(f, "Convert({} -> {})", from, to),
            Self::AxisStep { axis, test } => write!(f, "AxisStep({:?}, #{})", axis, test),

            Self::ConstBool(val) => write!(f, "ConstBool({})", val),
            Self::ConstInt(val) => write!(f, "ConstInt({})", val),
            Self::ConstLoad(idx) => write!(f, "ConstLoad(#{})", idx),
            Self::LoadLocal(idx) => write!(f, "LoadLocal({})", idx),
            Self::StoreLocal(idx) => write!(f, "StoreLocal({})", idx),
            Self::LoadGlobal(idx) => write!(f, "LoadGlobal({})", idx),
            Self::LoadContextNode => write!(f, "LoadContextNode"),
            Self::LoadCurrentNode => write!(f, "LoadCurrentNode"),
            Self::SetCurrentNode => write!(f, "SetCurrentNode"),
            Self::Position => write!(f, "Position"),
            Self::Last => write!(f, "Last"),
            Self::StepContext(test) => write!(f, "StepContext(#{})", test),
            Self::FilteredStepContext { test, filter } => {
                write!(f, "FilteredStepContext(#{}, filter #{})", test, filter)
            }
            Self::StartIterator => write!(f, "StartIterator"),
            Self::CheckCast(idx) => write!(f, "CheckCast(#{})", idx),
            Self::NegInt => write!(f, "NegInt"),
            Self::NegReal => write!(f, "NegReal"),
            Self::TestNode(test) => write!(f, "TestNode(#{})", test),
            Self::ToParent => write!(f, "ToParent"),
            Self::CallRuntime(function) => write!(f, "CallRuntime({:?})", function),
            Self::Goto(label) => write!(f, "Goto({:?})", label),
            Self::JumpIfFalse(label) => write!(f, "{:12} {:?}", "JumpIfFalse", label),
            Self::Return => write!(f, "Return"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_jumps() {
        let jump = Instruction::JumpIfFalse(Label::PENDING);
        assert!(jump.is_pending_jump());
        let patched = jump.with_target(Label(7));
        assert_eq!(patched, Instruction::JumpIfFalse(Label(7)));
        assert!(!patched.is_pending_jump());
        assert!(!Instruction::Return.is_pending_jump());
    }

    #[test]
    fn test_with_target_leaves_other_instructions_alone() {
        assert_eq!(Instruction::ToParent.with_target(Label(3)), Instruction::ToParent);
    }

    #[test]
    fn test_control_flow() {
        assert!(Instruction::Goto(Label(10)).is_control_flow());
        assert!(Instruction::Return.is_control_flow());
        assert!(!Instruction::IntBinOp(BinaryOp::Add).is_control_flow());
    }

    #[test]
    fn test_debug_formatting() {
        let inst = Instruction::IntBinOp(BinaryOp::Add);
        assert_eq!(format!("{:?}", inst), "IntBinOp(+)");

        let cmp = Instruction::Compare {
            op: BinaryOp::Lt,
            operands: TypeTag::Real,
        };
        assert_eq!(format!("{:?}", cmp), "Compare(real <)");
        assert_eq!(format!("{:?}", Instruction::Goto(Label::PENDING)), "Goto(?)");
    }
}
