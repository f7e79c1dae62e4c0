//! Translation of type-checked trees into machine code.
//!
//! Every node can be translated for its value. Boolean nodes can also be
//! translated as control flow ([`CodeGenerator::translate_desynthesized`]):
//! instead of leaving a boolean on the stack they leave two lists of pending
//! jumps, taken when the expression is true or false. Falling off the end
//! of the emitted code counts as true.
//!
//! Patterns are always translated as control flow. The node under test is
//! held in the machine's current-node register; a pattern may move that
//! register (to test a parent or an ancestor), so whoever runs a pattern
//! resets the register first.

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::{
    Vec,
    api::CompilationOptions,
    ast::{Ast, BindingSite, Builtin, ConstantValue, ExprId, ExprKind, FunctionCall, Literal, PatternKind, RefState},
    compiler::{CodeBuffer, CompileError, FlowList, PatternCache},
    syntax::{Axis, BinaryOp, LogicalOp, NodeKind, NodeTest, UnaryOp},
    types::{self, Type, TypeTag},
    vm::{Code, Constant, ConstantPool, Instruction, Label, PredicateFilter, RuntimeFunction, StepTest},
};

/// Exits of a boolean expression translated as control flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Desynthesized {
    /// Jumps taken when the expression is true, in addition to falling
    /// through.
    pub true_list: FlowList,
    /// Jumps taken when the expression is false.
    pub false_list: FlowList,
}

impl Desynthesized {
    pub fn relocate(&mut self, offset: u32) {
        self.true_list.relocate(offset);
        self.false_list.relocate(offset);
    }
}

pub struct CodeGenerator<'a> {
    ast: &'a Ast,
    pool: &'a mut ConstantPool,
    options: &'a CompilationOptions,
    buffer: CodeBuffer,
    /// Slot of the value bound by each `let` node, while its body is
    /// being emitted.
    locals: HashMap<ExprId, u32>,
    /// Position and size slots of each pattern predicate that reads them,
    /// keyed by the predicate's root.
    predicate_slots: HashMap<ExprId, (u32, u32)>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(ast: &'a Ast, pool: &'a mut ConstantPool, options: &'a CompilationOptions) -> Self {
        Self {
            ast,
            pool,
            options,
            buffer: CodeBuffer::new(),
            locals: HashMap::new(),
            predicate_slots: HashMap::new(),
        }
    }

    pub fn buffer(&self) -> &CodeBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut CodeBuffer {
        &mut self.buffer
    }

    pub fn into_buffer(self) -> CodeBuffer {
        self.buffer
    }

    pub fn finish(self) -> Result<Code, CompileError> {
        self.buffer.finish()
    }

    pub fn emit(&mut self, instruction: Instruction) {
        self.buffer.append(instruction);
    }

    fn backpatch_here(&mut self, list: &mut FlowList) {
        let here = self.buffer.position();
        list.backpatch(&mut self.buffer, here);
    }

    fn pending(&mut self, jump: Instruction) -> FlowList {
        FlowList::from_hole(self.buffer.pending_jump(jump))
    }

    fn type_of(&self, id: ExprId) -> Result<&'a Type, CompileError> {
        self.ast.ty(id).ok_or(CompileError::NotTypeChecked { node: id })
    }

    /// Follow resolved references to the node they were replaced with.
    fn follow(&self, id: ExprId) -> Result<ExprId, CompileError> {
        match self.ast.kind(id) {
            ExprKind::UnresolvedRef {
                state: RefState::Resolved(target),
                ..
            } => self.follow(*target),
            ExprKind::UnresolvedRef { name, .. } => {
                Err(CompileError::UnresolvedReference { name: name.clone() })
            }
            _ => Ok(id),
        }
    }

    fn constant(&mut self, constant: Constant) -> Result<u32, CompileError> {
        if self.pool.len() >= u32::MAX as usize {
            return Err(CompileError::TooManyConstants);
        }
        Ok(self.pool.add(constant))
    }

    fn step_test(&mut self, axis: Axis, test: &NodeTest) -> u32 {
        let principal = match axis {
            Axis::Attribute => NodeKind::Attribute,
            _ => NodeKind::Element,
        };
        self.pool.add_test(StepTest {
            principal,
            test: test.clone(),
        })
    }

    /// The context node: the node under test inside a pattern predicate,
    /// the frame's context node elsewhere.
    fn context_node(&mut self, id: ExprId) {
        if self.ast.enclosing_predicate_step(id).is_some() {
            self.emit(Instruction::LoadCurrentNode);
        } else {
            self.emit(Instruction::LoadContextNode);
        }
    }

    fn arg(&self, id: ExprId, call: &FunctionCall, index: usize) -> Result<ExprId, CompileError> {
        call.args
            .get(index)
            .copied()
            .ok_or(CompileError::NotTypeChecked { node: id })
    }

    // ------------------------------------------------------------------
    // Value translation
    // ------------------------------------------------------------------

    /// Emit code leaving the value of `id` on the stack.
    pub fn translate(&mut self, id: ExprId) -> Result<(), CompileError> {
        let ast = self.ast;
        let id = self.follow(id)?;
        let ty = self.type_of(id)?;
        trace!(node = ?id, %ty, "Translating");

        match ast.kind(id) {
            ExprKind::Literal(literal) => self.literal(literal)?,
            ExprKind::Context => self.context_node(id),
            ExprKind::Step { axis, test, base } => {
                match base {
                    Some(base) => self.translate(*base)?,
                    None => self.context_node(id),
                }
                let test = self.step_test(*axis, test);
                self.emit(Instruction::AxisStep { axis: *axis, test });
            }
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                self.translate(*operand)?;
                self.emit(match ty {
                    Type::Int => Instruction::NegInt,
                    _ => Instruction::NegReal,
                });
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, *left, *right, ty)?,
            ExprKind::Logical { .. } | ExprKind::Pattern(_) => {
                let exits = self.translate_desynthesized(id)?;
                self.materialize(exits);
            }
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => self.conditional(*test, *then_branch, *else_branch)?,
            ExprKind::Let { value, body, .. } => {
                self.translate(*value)?;
                let slot = self.buffer.allocate_local()?;
                self.locals.insert(id, slot);
                self.emit(Instruction::StoreLocal(slot));
                self.translate(*body)?;
                self.locals.remove(&id);
                self.buffer.release_local(slot);
            }
            // `follow` has already replaced resolved references.
            ExprKind::UnresolvedRef { name, .. } => {
                return Err(CompileError::UnresolvedReference { name: name.clone() });
            }
            ExprKind::VariableRef { name, binding } | ExprKind::ParamRef { name, binding } => {
                match binding.site {
                    BindingSite::Local(site) => {
                        let slot = *self
                            .locals
                            .get(&site)
                            .ok_or_else(|| CompileError::UnresolvedReference { name: name.clone() })?;
                        self.emit(Instruction::LoadLocal(slot));
                    }
                    BindingSite::Global(global) => self.emit(Instruction::LoadGlobal(global.0)),
                }
            }
            ExprKind::Call(call) => self.call(id, call)?,
            ExprKind::Convert { operand } => {
                self.translate(*operand)?;
                let from = self.type_of(*operand)?;
                if *from == Type::NodeSet && *ty == Type::Boolean {
                    self.emit(Instruction::StartIterator);
                }
                types::coerce(from, ty, &mut self.buffer);
            }
        }
        Ok(())
    }

    fn literal(&mut self, literal: &Literal) -> Result<(), CompileError> {
        let instruction = match literal {
            Literal::Boolean(value) => Instruction::ConstBool(*value),
            Literal::Int(value) => Instruction::ConstInt(*value),
            Literal::Real(value) => Instruction::ConstLoad(self.constant(Constant::Real(*value))?),
            Literal::String(value) => {
                Instruction::ConstLoad(self.constant(Constant::String(value.clone()))?)
            }
        };
        self.emit(instruction);
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId, ty: &Type) -> Result<(), CompileError> {
        self.translate(left)?;
        self.translate(right)?;
        let instruction = if op.is_comparison() {
            Instruction::Compare {
                op,
                operands: self.type_of(left)?.tag(),
            }
        } else if *ty == Type::Int {
            Instruction::IntBinOp(op)
        } else {
            Instruction::RealBinOp(op)
        };
        self.emit(instruction);
        Ok(())
    }

    fn conditional(&mut self, test: ExprId, then_branch: ExprId, else_branch: ExprId) -> Result<(), CompileError> {
        if self.options.eliminate_dead_branches {
            if let Some(ConstantValue::Boolean(value)) = self.ast.fold(test) {
                debug!(node = ?test, value, "Eliminating dead branch");
                return self.translate(if value { then_branch } else { else_branch });
            }
        }

        let mut exits = self.translate_desynthesized(test)?;
        self.backpatch_here(&mut exits.true_list);
        self.translate(then_branch)?;
        let end = self.buffer.pending_jump(Instruction::Goto(Label::PENDING));
        self.backpatch_here(&mut exits.false_list);
        self.translate(else_branch)?;
        let here = self.buffer.position();
        self.buffer.patch(end, here);
        Ok(())
    }

    /// Turn control-flow exits back into a boolean on the stack.
    pub fn materialize(&mut self, exits: Desynthesized) {
        let Desynthesized {
            mut true_list,
            mut false_list,
        } = exits;
        self.backpatch_here(&mut true_list);
        self.emit(Instruction::ConstBool(true));
        if false_list.is_empty() {
            return;
        }
        let end = self.buffer.pending_jump(Instruction::Goto(Label::PENDING));
        self.backpatch_here(&mut false_list);
        self.emit(Instruction::ConstBool(false));
        let here = self.buffer.position();
        self.buffer.patch(end, here);
    }

    fn call(&mut self, id: ExprId, call: &FunctionCall) -> Result<(), CompileError> {
        match call.builtin {
            Builtin::Boolean | Builtin::Not => {
                let exits = self.translate_desynthesized(id)?;
                self.materialize(exits);
            }
            Builtin::ElementAvailable | Builtin::FunctionAvailable => {
                let value = call.folded.ok_or(CompileError::NotTypeChecked { node: id })?;
                self.emit(Instruction::ConstBool(value));
            }
            Builtin::StartsWith => {
                self.translate(self.arg(id, call, 0)?)?;
                self.translate(self.arg(id, call, 1)?)?;
                self.emit(Instruction::CallRuntime(RuntimeFunction::StartsWith));
            }
            Builtin::Lang => {
                self.translate(self.arg(id, call, 0)?)?;
                self.context_node(id);
                self.emit(Instruction::CallRuntime(RuntimeFunction::Lang));
            }
            Builtin::GenerateId => {
                match call.args.first() {
                    Some(arg) => self.translate(*arg)?,
                    None => self.context_node(id),
                }
                self.emit(Instruction::CallRuntime(RuntimeFunction::GenerateId));
            }
            Builtin::UnparsedEntityUri => {
                self.translate(self.arg(id, call, 0)?)?;
                self.emit(Instruction::CallRuntime(RuntimeFunction::UnparsedEntityUri));
            }
            Builtin::Cast => {
                let class_arg = self.arg(id, call, 0)?;
                let ExprKind::Literal(Literal::String(class)) = self.ast.kind(class_arg) else {
                    return Err(CompileError::NotTypeChecked { node: class_arg });
                };
                let value = self.arg(id, call, 1)?;
                self.translate(value)?;
                if self.type_of(value)?.is_object() {
                    self.emit(Instruction::Convert {
                        from: TypeTag::Object,
                        to: TypeTag::Reference,
                    });
                }
                let class = self.constant(Constant::Class(class.clone()))?;
                self.emit(Instruction::CheckCast(class));
            }
            Builtin::Last | Builtin::Position => {
                let slots = self
                    .ast
                    .enclosing_predicate(id)
                    .and_then(|(_, predicate)| self.predicate_slots.get(&predicate).copied());
                let instruction = match (call.builtin, slots) {
                    (Builtin::Position, Some((position, _))) => Instruction::LoadLocal(position),
                    (_, Some((_, size))) => Instruction::LoadLocal(size),
                    (Builtin::Position, None) => Instruction::Position,
                    (_, None) => Instruction::Last,
                };
                self.emit(instruction);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control-flow translation
    // ------------------------------------------------------------------

    /// Emit a boolean expression as control flow.
    pub fn translate_desynthesized(&mut self, id: ExprId) -> Result<Desynthesized, CompileError> {
        let ast = self.ast;
        let id = self.follow(id)?;
        self.type_of(id)?;

        match ast.kind(id) {
            ExprKind::Literal(Literal::Boolean(value)) => Ok(self.constant_exits(*value)),
            ExprKind::Logical {
                op: LogicalOp::And,
                left,
                right,
            } => {
                let mut left = self.translate_desynthesized(*left)?;
                self.backpatch_here(&mut left.true_list);
                let right = self.translate_desynthesized(*right)?;
                let mut false_list = left.false_list;
                false_list.append(right.false_list);
                Ok(Desynthesized {
                    true_list: right.true_list,
                    false_list,
                })
            }
            ExprKind::Logical {
                op: LogicalOp::Or,
                left,
                right,
            } => {
                let mut left = self.translate_desynthesized(*left)?;
                let taken = self.buffer.pending_jump(Instruction::Goto(Label::PENDING));
                self.backpatch_here(&mut left.false_list);
                let right = self.translate_desynthesized(*right)?;
                let mut true_list = left.true_list;
                true_list.add(taken).append(right.true_list);
                Ok(Desynthesized {
                    true_list,
                    false_list: right.false_list,
                })
            }
            ExprKind::Call(call) => match call.builtin {
                Builtin::Not => {
                    let operand = self.translate_desynthesized(self.arg(id, call, 0)?)?;
                    let Desynthesized {
                        true_list: mut false_list,
                        false_list: mut true_exits,
                    } = operand;
                    // Falling through the operand means it was true.
                    false_list.add(self.buffer.pending_jump(Instruction::Goto(Label::PENDING)));
                    self.backpatch_here(&mut true_exits);
                    Ok(Desynthesized {
                        true_list: FlowList::new(),
                        false_list,
                    })
                }
                Builtin::Boolean => self.translate_desynthesized(self.arg(id, call, 0)?),
                Builtin::ElementAvailable | Builtin::FunctionAvailable => {
                    let value = call.folded.ok_or(CompileError::NotTypeChecked { node: id })?;
                    Ok(self.constant_exits(value))
                }
                _ => self.test_value(id),
            },
            ExprKind::Pattern(pattern) => self.translate_pattern(pattern),
            _ => self.test_value(id),
        }
    }

    fn constant_exits(&mut self, value: bool) -> Desynthesized {
        if value {
            Desynthesized::default()
        } else {
            Desynthesized {
                true_list: FlowList::new(),
                false_list: self.pending(Instruction::Goto(Label::PENDING)),
            }
        }
    }

    /// The default control-flow form: compute the value, jump when false.
    fn test_value(&mut self, id: ExprId) -> Result<Desynthesized, CompileError> {
        self.translate(id)?;
        Ok(self.test_top())
    }

    /// Exits of the boolean on top of the stack.
    fn test_top(&mut self) -> Desynthesized {
        Desynthesized {
            true_list: FlowList::new(),
            false_list: self.pending(Instruction::JumpIfFalse(Label::PENDING)),
        }
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn translate_pattern(&mut self, pattern: &PatternKind) -> Result<Desynthesized, CompileError> {
        match pattern {
            PatternKind::Step {
                axis,
                test,
                predicates,
            } => self.pattern_step(*axis, test, predicates),
            PatternKind::Parent { parent, child } => {
                let mut child = self.translate_desynthesized(*child)?;
                self.backpatch_here(&mut child.true_list);
                self.emit(Instruction::ToParent);
                let orphan = self.buffer.pending_jump(Instruction::JumpIfFalse(Label::PENDING));
                let parent = self.translate_desynthesized(*parent)?;
                let mut false_list = child.false_list;
                false_list.add(orphan).append(parent.false_list);
                Ok(Desynthesized {
                    true_list: parent.true_list,
                    false_list,
                })
            }
            PatternKind::Ancestor { ancestor, child } => {
                let mut child = self.translate_desynthesized(*child)?;
                self.backpatch_here(&mut child.true_list);
                let anchor = self.buffer.allocate_local()?;
                self.emit(Instruction::LoadCurrentNode);
                self.emit(Instruction::StoreLocal(anchor));

                let top = self.buffer.position();
                self.emit(Instruction::LoadLocal(anchor));
                self.emit(Instruction::SetCurrentNode);
                self.emit(Instruction::ToParent);
                let exhausted = self.buffer.pending_jump(Instruction::JumpIfFalse(Label::PENDING));
                self.emit(Instruction::LoadCurrentNode);
                self.emit(Instruction::StoreLocal(anchor));

                let mut ancestor = self.translate_desynthesized(*ancestor)?;
                // Try the next ancestor up.
                ancestor.false_list.backpatch(&mut self.buffer, top);
                self.buffer.release_local(anchor);
                let mut false_list = child.false_list;
                false_list.add(exhausted);
                Ok(Desynthesized {
                    true_list: ancestor.true_list,
                    false_list,
                })
            }
            PatternKind::Alternative { left, right } => {
                let anchor = self.buffer.allocate_local()?;
                self.emit(Instruction::LoadCurrentNode);
                self.emit(Instruction::StoreLocal(anchor));
                let mut left = self.translate_desynthesized(*left)?;
                let matched = self.buffer.pending_jump(Instruction::Goto(Label::PENDING));
                self.backpatch_here(&mut left.false_list);
                self.emit(Instruction::LoadLocal(anchor));
                self.emit(Instruction::SetCurrentNode);
                self.buffer.release_local(anchor);
                let right = self.translate_desynthesized(*right)?;
                let mut true_list = left.true_list;
                true_list.add(matched).append(right.true_list);
                Ok(Desynthesized {
                    true_list,
                    false_list: right.false_list,
                })
            }
        }
    }

    fn pattern_step(
        &mut self,
        axis: Axis,
        test: &NodeTest,
        predicates: &[ExprId],
    ) -> Result<Desynthesized, CompileError> {
        let test = self.step_test(axis, test);
        self.emit(Instruction::TestNode(test));
        let mut false_list = self.pending(Instruction::JumpIfFalse(Label::PENDING));

        let positional = predicates
            .iter()
            .map(|predicate| self.reads_step_context(*predicate))
            .collect::<Result<Vec<_>, _>>()?;
        // Predicates before the last positional one also run as filter
        // units, so that its position counts only their survivors.
        let filtered = positional.iter().rposition(|p| *p).unwrap_or(0);

        let mut filter = Vec::new();
        for (index, predicate) in predicates.iter().enumerate() {
            let mut exits = self.predicate(test, *predicate, positional[index], &filter)?;
            self.backpatch_here(&mut exits.true_list);
            false_list.append(exits.false_list);
            if index < filtered {
                let unit = self.predicate_unit(test, *predicate, positional[index], &filter)?;
                filter.push(unit);
            }
        }
        Ok(Desynthesized {
            true_list: FlowList::new(),
            false_list,
        })
    }

    /// Whether `predicate` needs the position and size of the node under
    /// test: `[n]`, or a call to `position()` or `last()`.
    fn reads_step_context(&self, predicate: ExprId) -> Result<bool, CompileError> {
        Ok(self.type_of(predicate)?.is_numeric() || self.calls_context_function(predicate))
    }

    fn calls_context_function(&self, id: ExprId) -> bool {
        match self.ast.kind(id) {
            ExprKind::Call(call) if call.builtin.is_context_sensitive() => true,
            kind => kind
                .children()
                .into_iter()
                .any(|child| self.calls_context_function(child)),
        }
    }

    /// Emit one predicate of a pattern step. `filter` holds the units of
    /// the predicates before it.
    fn predicate(
        &mut self,
        test: u32,
        predicate: ExprId,
        positional: bool,
        filter: &[Code],
    ) -> Result<Desynthesized, CompileError> {
        if !positional {
            return self.translate_desynthesized(predicate);
        }

        let position = self.buffer.allocate_local()?;
        let size = self.buffer.allocate_local()?;
        if filter.is_empty() {
            self.emit(Instruction::StepContext(test));
        } else {
            let filter = self.pool.add_filter(PredicateFilter {
                units: filter.to_vec(),
            });
            self.emit(Instruction::FilteredStepContext { test, filter });
        }
        self.emit(Instruction::StoreLocal(size));
        self.emit(Instruction::StoreLocal(position));
        self.predicate_slots.insert(predicate, (position, size));

        let exits = match self.type_of(predicate)? {
            // `[n]` means `[position() = n]`.
            Type::Int => {
                self.emit(Instruction::LoadLocal(position));
                self.translate(predicate)?;
                self.emit(Instruction::Compare {
                    op: BinaryOp::Eq,
                    operands: TypeTag::Int,
                });
                self.test_top()
            }
            Type::Real => {
                self.emit(Instruction::LoadLocal(position));
                self.emit(Instruction::Convert {
                    from: TypeTag::Int,
                    to: TypeTag::Real,
                });
                self.translate(predicate)?;
                self.emit(Instruction::Compare {
                    op: BinaryOp::Eq,
                    operands: TypeTag::Real,
                });
                self.test_top()
            }
            _ => self.translate_desynthesized(predicate)?,
        };

        self.predicate_slots.remove(&predicate);
        self.buffer.release_local(size);
        self.buffer.release_local(position);
        Ok(exits)
    }

    /// A unit returning whether its context node passes `predicate`.
    fn predicate_unit(
        &mut self,
        test: u32,
        predicate: ExprId,
        positional: bool,
        filter: &[Code],
    ) -> Result<Code, CompileError> {
        let mut unit = CodeGenerator::new(self.ast, &mut *self.pool, self.options);
        let exits = unit.predicate(test, predicate, positional, filter)?;
        unit.materialize(exits);
        unit.emit(Instruction::Return);
        unit.finish()
    }

    /// Emit a pattern through `cache`, compiling it on first use.
    pub fn translate_cached_pattern(
        &mut self,
        cache: &mut PatternCache,
        pattern: ExprId,
    ) -> Result<Desynthesized, CompileError> {
        let unit = cache.get_or_compile(self.ast, self.pool, self.options, pattern)?;
        Ok(unit.splice_into(&mut self.buffer))
    }
}

/// Compile the expression rooted at `root` into a unit that returns its
/// value.
pub fn compile_expression(
    ast: &Ast,
    pool: &mut ConstantPool,
    options: &CompilationOptions,
    root: ExprId,
) -> Result<Code, CompileError> {
    let mut generator = CodeGenerator::new(ast, pool, options);
    generator.translate(root)?;
    generator.emit(Instruction::Return);
    generator.finish()
}
