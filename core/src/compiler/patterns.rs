//! Compiled pattern units and their cache.
//!
//! A template's pattern is emitted twice: once as the template's own test
//! unit and once inside the match dispatcher. It is compiled the first time
//! into a standalone buffer with its exits still pending; every use splices
//! a copy of that buffer and carries the exits over to the copy.

use hashbrown::{HashMap, hash_map::Entry};
use tracing::{debug, trace};

use crate::{
    api::CompilationOptions,
    ast::{Ast, ExprId},
    compiler::{CodeBuffer, CodeGenerator, CompileError, Desynthesized},
    vm::ConstantPool,
};

/// A pattern compiled on its own, exits unpatched.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    buffer: CodeBuffer,
    exits: Desynthesized,
}

impl CompiledPattern {
    pub fn compile(
        ast: &Ast,
        pool: &mut ConstantPool,
        options: &CompilationOptions,
        pattern: ExprId,
    ) -> Result<Self, CompileError> {
        let mut generator = CodeGenerator::new(ast, pool, options);
        let exits = generator.translate_desynthesized(pattern)?;
        Ok(Self {
            buffer: generator.into_buffer(),
            exits,
        })
    }

    pub fn buffer(&self) -> &CodeBuffer {
        &self.buffer
    }

    pub fn exits(&self) -> &Desynthesized {
        &self.exits
    }

    /// Append a copy of this unit to `target` and return the exits of the
    /// copy, positioned in `target`.
    pub fn splice_into(&self, target: &mut CodeBuffer) -> Desynthesized {
        let copy = self.buffer.clone();
        let mut exits = Desynthesized {
            true_list: self.exits.true_list.copy_and_redirect(&self.buffer, &copy),
            false_list: self.exits.false_list.copy_and_redirect(&self.buffer, &copy),
        };
        let offset = target.splice(&copy);
        exits.relocate(offset);
        trace!(offset, len = copy.len(), "Spliced pattern");
        exits
    }
}

#[derive(Debug, Default)]
pub struct PatternCache {
    units: HashMap<ExprId, CompiledPattern>,
    hits: usize,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &mut self,
        ast: &Ast,
        pool: &mut ConstantPool,
        options: &CompilationOptions,
        pattern: ExprId,
    ) -> Result<&CompiledPattern, CompileError> {
        match self.units.entry(pattern) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                debug!(pattern = ?pattern, "Compiling pattern");
                let unit = CompiledPattern::compile(ast, pool, options, pattern)?;
                Ok(entry.insert(unit))
            }
        }
    }

    pub fn get(&self, pattern: ExprId) -> Option<&CompiledPattern> {
        self.units.get(&pattern)
    }

    /// Number of lookups answered without compiling.
    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
