use crate::{
    Vec,
    compiler::CompileError,
    vm::{Code, Instruction, Label},
};

/// Stable index of a jump instruction whose target is still pending.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hole(pub u32);

impl Hole {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Growable instruction buffer for one unit of code.
///
/// Instructions are addressed by their index, which never changes once
/// emitted, so jump holes and labels stay valid while the unit grows.
///
/// Local slots are handed out as a stack: a slot is released when the
/// scope that allocated it ends, and the next allocation reuses it.
/// `num_locals` is the high-water mark the finished unit needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeBuffer {
    instructions: Vec<Instruction>,
    live_locals: u32,
    num_locals: u32,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction and return its index.
    pub fn append(&mut self, instruction: Instruction) -> usize {
        debug_assert!(
            !instruction.is_pending_jump(),
            "pending jumps must be created with pending_jump"
        );
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// The label of the next instruction to be emitted.
    pub fn position(&self) -> Label {
        Label(self.instructions.len() as u32)
    }

    /// Emit `jump` (a `Goto` or `JumpIfFalse`) with a pending target and
    /// return its hole.
    pub fn pending_jump(&mut self, jump: Instruction) -> Hole {
        debug_assert!(jump.jump_target().is_some(), "{:?} is not a jump", jump);
        let hole = Hole(self.instructions.len() as u32);
        self.instructions.push(jump.with_target(Label::PENDING));
        hole
    }

    /// Aim the jump at `hole` to `target`.
    pub fn patch(&mut self, hole: Hole, target: Label) {
        let slot = &mut self.instructions[hole.index()];
        debug_assert!(slot.is_pending_jump(), "hole {:?} patched twice", hole);
        *slot = slot.with_target(target);
    }

    /// True when `hole` names a slot of this buffer holding a pending jump.
    pub fn is_pending(&self, hole: Hole) -> bool {
        self.instructions
            .get(hole.index())
            .is_some_and(Instruction::is_pending_jump)
    }

    pub fn allocate_local(&mut self) -> Result<u32, CompileError> {
        let slot = self.live_locals;
        self.live_locals = slot.checked_add(1).ok_or(CompileError::TooManyLocals)?;
        self.num_locals = self.num_locals.max(self.live_locals);
        Ok(slot)
    }

    /// End the scope of `slot`, the most recently allocated live slot.
    pub fn release_local(&mut self, slot: u32) {
        debug_assert_eq!(slot + 1, self.live_locals, "locals released out of order");
        self.live_locals = slot;
    }

    pub fn num_locals(&self) -> u32 {
        self.num_locals
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Append the instructions of `unit` to this buffer and return the
    /// offset they landed at.
    ///
    /// Patched jump targets move with the code and local slots are renamed
    /// above the slots live here; pending jumps stay pending. The unit's
    /// slots are dead again once its code has run, so later splices reuse
    /// them. Flow lists that referred to `unit` must be relocated by the
    /// returned offset.
    pub fn splice(&mut self, unit: &CodeBuffer) -> u32 {
        let offset = self.instructions.len() as u32;
        let local_base = self.live_locals;
        self.instructions.extend(
            unit.instructions
                .iter()
                .map(|instruction| relocate(*instruction, offset, local_base)),
        );
        self.num_locals = self.num_locals.max(local_base + unit.num_locals);
        offset
    }

    /// Finalize the unit. Every hole must have been patched.
    pub fn finish(self) -> Result<Code, CompileError> {
        if let Some(at) = self
            .instructions
            .iter()
            .position(Instruction::is_pending_jump)
        {
            return Err(CompileError::UnpatchedJump { at });
        }
        Ok(Code {
            instructions: self.instructions,
            num_locals: self.num_locals as usize,
        })
    }
}

fn relocate(instruction: Instruction, offset: u32, local_base: u32) -> Instruction {
    match instruction {
        Instruction::LoadLocal(slot) => Instruction::LoadLocal(slot + local_base),
        Instruction::StoreLocal(slot) => Instruction::StoreLocal(slot + local_base),
        jump => match jump.jump_target() {
            Some(target) if !target.is_pending() => jump.with_target(Label(target.0 + offset)),
            _ => jump,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pending_jump_and_patch() {
        let mut buffer = CodeBuffer::new();
        buffer.append(Instruction::ConstBool(true));
        let hole = buffer.pending_jump(Instruction::JumpIfFalse(Label::PENDING));
        assert!(buffer.is_pending(hole));
        let end = buffer.position();
        buffer.append(Instruction::Return);
        buffer.patch(hole, end);
        assert!(!buffer.is_pending(hole));
        assert_eq!(buffer.instructions()[1], Instruction::JumpIfFalse(Label(2)));
    }

    #[test]
    fn test_finish_rejects_unpatched_holes() {
        let mut buffer = CodeBuffer::new();
        buffer.append(Instruction::ConstInt(0));
        buffer.pending_jump(Instruction::Goto(Label::PENDING));
        assert_eq!(buffer.finish(), Err(CompileError::UnpatchedJump { at: 1 }));
    }

    #[test]
    fn test_splice_relocates_targets_and_locals() {
        let mut unit = CodeBuffer::new();
        let slot = unit.allocate_local().unwrap();
        unit.append(Instruction::StoreLocal(slot));
        unit.append(Instruction::Goto(Label(0)));
        unit.pending_jump(Instruction::JumpIfFalse(Label::PENDING));

        let mut outer = CodeBuffer::new();
        outer.allocate_local().unwrap();
        outer.append(Instruction::ConstInt(0));
        let offset = outer.splice(&unit);

        assert_eq!(offset, 1);
        assert_eq!(outer.num_locals(), 2);
        assert_eq!(
            &outer.instructions()[1..],
            &[
                Instruction::StoreLocal(1),
                Instruction::Goto(Label(1)),
                Instruction::JumpIfFalse(Label::PENDING),
            ]
        );
    }

    #[test]
    fn test_released_slots_are_reused() {
        let mut buffer = CodeBuffer::new();
        let outer = buffer.allocate_local().unwrap();
        let first = buffer.allocate_local().unwrap();
        buffer.release_local(first);
        let second = buffer.allocate_local().unwrap();
        assert_eq!((outer, first, second), (0, 1, 1));
        buffer.release_local(second);
        buffer.release_local(outer);
        assert_eq!(buffer.allocate_local().unwrap(), 0);
        assert_eq!(buffer.num_locals(), 2);
    }

    #[test]
    fn test_splices_share_dead_slots() {
        let mut unit = CodeBuffer::new();
        let slot = unit.allocate_local().unwrap();
        unit.append(Instruction::StoreLocal(slot));
        unit.release_local(slot);

        let mut outer = CodeBuffer::new();
        let held = outer.allocate_local().unwrap();
        outer.splice(&unit);
        outer.splice(&unit);
        outer.release_local(held);
        outer.splice(&unit);

        assert_eq!(outer.num_locals(), 2);
        assert_eq!(
            outer.instructions(),
            &[
                Instruction::StoreLocal(1),
                Instruction::StoreLocal(1),
                Instruction::StoreLocal(0),
            ]
        );
    }
}
