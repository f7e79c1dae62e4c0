use ecow::EcoString;
use hashbrown::{HashMap, HashSet};

use crate::{
    Vec,
    syntax::{NodeKind, NodeTest},
    vm::Instruction,
};

/// A finished unit of code: a global initializer, a pattern test, a
/// template body or the match dispatcher.
#[derive(Clone, PartialEq)]
pub struct Code {
    pub instructions: Vec<Instruction>,
    pub num_locals: usize,
}

/// Entries of the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Real(f64),
    String(EcoString),
    /// Target class of a reference cast.
    Class(EcoString),
}

/// A node test together with the principal node kind of its axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepTest {
    pub principal: NodeKind,
    pub test: NodeTest,
}

/// Predicates a sibling must satisfy to count towards the position and
/// size seen by a later predicate of the same pattern step. Each unit runs
/// with the sibling as its context node and returns a boolean.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateFilter {
    pub units: Vec<Code>,
}

/// Program-wide pool of constants, node tests and predicate filters shared
/// by every [`Code`] unit of an executable, so units can be spliced into
/// each other without renumbering operands.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    tests: Vec<StepTest>,
    filters: Vec<PredicateFilter>,
    /// Deduplication of string-like constants
    strings: HashMap<(u8, EcoString), u32>,
    test_map: HashMap<StepTest, u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant to the pool (or reuse an existing one) and return its index.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let key = match &constant {
            Constant::String(s) => Some((0u8, s.clone())),
            Constant::Class(s) => Some((1u8, s.clone())),
            // Reals are not deduplicated: NaN breaks equality.
            Constant::Real(_) => None,
        };
        if let Some(key) = &key {
            if let Some(&index) = self.strings.get(key) {
                return index;
            }
        }
        let index = self.constants.len() as u32;
        self.constants.push(constant);
        if let Some(key) = key {
            self.strings.insert(key, index);
        }
        index
    }

    pub fn add_test(&mut self, test: StepTest) -> u32 {
        if let Some(&index) = self.test_map.get(&test) {
            return index;
        }
        let index = self.tests.len() as u32;
        self.tests.push(test.clone());
        self.test_map.insert(test, index);
        index
    }

    pub fn add_filter(&mut self, filter: PredicateFilter) -> u32 {
        let index = self.filters.len() as u32;
        self.filters.push(filter);
        index
    }

    pub fn constant(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    pub fn test(&self, index: u32) -> Option<&StepTest> {
        self.tests.get(index as usize)
    }

    pub fn filter(&self, index: u32) -> Option<&PredicateFilter> {
        self.filters.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

impl core::fmt::Debug for Code {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Code {{")?;
        writeln!(f, "  num_locals: {}", self.num_locals)?;

        // First pass: collect all jump targets to determine which addresses need labels
        let jump_targets: HashSet<usize> = self
            .instructions
            .iter()
            .filter_map(Instruction::jump_target)
            .filter(|label| !label.is_pending())
            .map(|label| label.index())
            .collect();

        // Assign label numbers to targets (sorted for deterministic output)
        let mut sorted_targets: Vec<_> = jump_targets.into_iter().collect();
        sorted_targets.sort();
        let label_map: HashMap<usize, usize> = sorted_targets
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, i))
            .collect();

        // Second pass: print instructions with labels
        writeln!(f, "  instructions:")?;
        for (addr, instr) in self.instructions.iter().enumerate() {
            let label_prefix = match label_map.get(&addr) {
                Some(label_num) => alloc::format!("L{}:", label_num),
                None => alloc::string::String::new(),
            };

            match instr.jump_target() {
                Some(target) if !target.is_pending() => {
                    let target_label = label_map
                        .get(&target.index())
                        .map(|l| alloc::format!("L{}", l))
                        .unwrap_or_else(|| alloc::format!("@{}", target.index()));
                    writeln!(
                        f,
                        "    {:4} {:>4}  {:?} (to {})",
                        addr, label_prefix, instr, target_label
                    )?;
                }
                _ => writeln!(f, "    {:4} {:>4}  {:?}", addr, label_prefix, instr)?,
            }
        }

        write!(f, "}}")
    }
}
