//! Backpatchable lists of pending jumps.
//!
//! Boolean expressions are compiled into control flow instead of values: a
//! condition leaves behind the jumps taken when it is false (and, for `or`,
//! when it is true) with no target yet. A [`FlowList`] collects such holes
//! until the code they should reach has been emitted, then
//! [`FlowList::backpatch`] aims them all at once.

use hashbrown::HashSet;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    compiler::{CodeBuffer, Hole},
    vm::Label,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowList {
    holes: SmallVec<[Hole; 4]>,
}

impl FlowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hole(hole: Hole) -> Self {
        let mut list = Self::new();
        list.holes.push(hole);
        list
    }

    pub fn add(&mut self, hole: Hole) -> &mut Self {
        self.holes.push(hole);
        self
    }

    /// Move every hole of `other` to the end of this list.
    pub fn append(&mut self, other: FlowList) -> &mut Self {
        self.holes.extend(other.holes);
        self
    }

    /// Aim every hole at `target` and empty the list. Backpatching an empty
    /// list does nothing.
    pub fn backpatch(&mut self, buffer: &mut CodeBuffer, target: Label) {
        if !self.holes.is_empty() {
            trace!(holes = self.holes.len(), ?target, "Backpatch");
        }
        for hole in self.holes.drain(..) {
            buffer.patch(hole, target);
        }
    }

    /// The list for a copy of `old` made as `new`: each hole is kept when
    /// the same slot holds a pending jump in both buffers, and dropped
    /// otherwise.
    pub fn copy_and_redirect(&self, old: &CodeBuffer, new: &CodeBuffer) -> FlowList {
        let mut seen = HashSet::new();
        let holes = self
            .holes
            .iter()
            .copied()
            .filter(|hole| old.is_pending(*hole) && new.is_pending(*hole))
            .filter(|hole| seen.insert(*hole))
            .collect();
        FlowList { holes }
    }

    /// Shift every hole after the unit it points into was spliced at
    /// `offset`.
    pub fn relocate(&mut self, offset: u32) {
        for hole in &mut self.holes {
            hole.0 += offset;
        }
    }

    pub fn len(&self) -> usize {
        self.holes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Hole> + '_ {
        self.holes.iter().copied()
    }
}
