use core::cmp::Ordering;

use ecow::EcoString;
use tracing::{debug, trace};

use crate::{
    Box, Vec,
    syntax::{BinaryOp, NodeKind},
    types::TypeTag,
    vm::{
        Code, Constant, ConstantPool, Document, Instruction, NodeId, RuntimeError,
        RuntimeFunction, Stack, StepTest, Value,
    },
};

/// Evaluation context of a unit of code: the context node together with its
/// position in, and the size of, the context node list.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Frame {
    pub node: NodeId,
    pub position: i64,
    pub size: i64,
}

impl Frame {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            position: 1,
            size: 1,
        }
    }
}

/// Executes [`Code`] against a document.
///
/// Globals live in the machine, so running the initializers of a program
/// once and then its templates many times shares their values.
pub struct Machine<'a> {
    document: &'a Document,
    pool: &'a ConstantPool,
    globals: Vec<Option<Value>>,
    max_steps: Option<usize>,
    trace: Option<Vec<usize>>,
}

impl<'a> Machine<'a> {
    pub fn new(document: &'a Document, pool: &'a ConstantPool) -> Self {
        Self {
            document,
            pool,
            globals: Vec::new(),
            max_steps: None,
            trace: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Record the index of every executed instruction.
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    /// Instruction indices executed by the most recent [`Machine::run`].
    pub fn trace(&self) -> Option<&[usize]> {
        self.trace.as_deref()
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn set_global(&mut self, index: u32, value: Value) {
        let index = index as usize;
        if self.globals.len() <= index {
            self.globals.resize(index + 1, None);
        }
        self.globals[index] = Some(value);
    }

    pub fn global(&self, index: u32) -> Option<&Value> {
        self.globals.get(index as usize).and_then(Option::as_ref)
    }

    fn test(&self, index: u32) -> Result<&'a StepTest, RuntimeError> {
        self.pool.test(index).ok_or(RuntimeError::MissingTest(index))
    }

    pub fn run(&mut self, code: &Code, frame: &Frame) -> Result<Value, RuntimeError> {
        debug!(
            instructions = code.instructions.len(),
            node = frame.node.0,
            "Running code"
        );
        if let Some(trace) = &mut self.trace {
            trace.clear();
        }
        self.execute(code, frame)
    }

    fn execute(&mut self, code: &Code, frame: &Frame) -> Result<Value, RuntimeError> {
        let mut stack: Stack<Value> = Stack::new(16);
        let mut locals: Vec<Option<Value>> = crate::vec![None; code.num_locals];
        let mut current = frame.node;
        let mut ip = 0;
        let mut steps = 0usize;

        loop {
            let Some(instruction) = code.instructions.get(ip).copied() else {
                return Err(RuntimeError::FellOffEnd);
            };
            steps += 1;
            if let Some(max) = self.max_steps {
                if steps > max {
                    return Err(RuntimeError::StepLimitExceeded(max));
                }
            }
            if let Some(trace) = &mut self.trace {
                trace.push(ip);
            }
            trace!(ip, ?instruction, depth = stack.len(), "Step");
            stack.at(ip);
            let here = ip;
            ip += 1;

            use Instruction::*;
            match instruction {
                ConstBool(value) => stack.push(Value::Boolean(value)),
                ConstInt(value) => stack.push(Value::Int(value)),
                ConstLoad(index) => {
                    let value = match self.pool.constant(index) {
                        Some(Constant::Real(r)) => Value::Real(*r),
                        Some(Constant::String(s)) | Some(Constant::Class(s)) => {
                            Value::String(s.clone())
                        }
                        None => return Err(RuntimeError::MissingConstant(index)),
                    };
                    stack.push(value);
                }
                LoadLocal(slot) => {
                    let value = locals
                        .get(slot as usize)
                        .cloned()
                        .flatten()
                        .ok_or(RuntimeError::UninitializedLocal(slot))?;
                    stack.push(value);
                }
                StoreLocal(slot) => {
                    let value = stack.pop()?;
                    let slot = slot as usize;
                    if locals.len() <= slot {
                        locals.resize(slot + 1, None);
                    }
                    locals[slot] = Some(value);
                }
                LoadGlobal(index) => {
                    let value = self
                        .global(index)
                        .cloned()
                        .ok_or(RuntimeError::UninitializedGlobal(index))?;
                    stack.push(value);
                }

                LoadContextNode => stack.push(Value::Node(frame.node)),
                LoadCurrentNode => stack.push(Value::Node(current)),
                SetCurrentNode => current = stack.pop()?.as_node()?,
                Position => stack.push(Value::Int(frame.position)),
                Last => stack.push(Value::Int(frame.size)),
                StepContext(test) => {
                    let (position, size) = self.step_context(current, self.test(test)?);
                    stack.push(Value::Int(position));
                    stack.push(Value::Int(size));
                }
                FilteredStepContext { test, filter } => {
                    let (position, size) = self.filtered_step_context(current, test, filter)?;
                    stack.push(Value::Int(position));
                    stack.push(Value::Int(size));
                }

                Convert { from, to } => {
                    let value = stack.pop()?;
                    stack.push(value.convert(from, to, self.document)?);
                }
                StartIterator => match stack.peek() {
                    Some(Value::NodeSet(_)) => {}
                    Some(other) => return Err(RuntimeError::type_mismatch(TypeTag::NodeSet, other)),
                    None => return Err(RuntimeError::StackUnderflow(here)),
                },
                CheckCast(index) => {
                    let class = match self.pool.constant(index) {
                        Some(Constant::Class(class)) => class.clone(),
                        _ => return Err(RuntimeError::MissingConstant(index)),
                    };
                    let value = stack.pop()?;
                    stack.push(check_cast(class, value)?);
                }

                IntBinOp(op) => {
                    let (a, b) = stack.pop2()?;
                    stack.push(Value::Int(int_op(op, a.as_int()?, b.as_int()?)?));
                }
                RealBinOp(op) => {
                    let (a, b) = stack.pop2()?;
                    stack.push(Value::Real(real_op(op, a.as_real()?, b.as_real()?)?));
                }
                NegInt => {
                    let a = stack.pop()?.as_int()?;
                    stack.push(Value::Int(a.wrapping_neg()));
                }
                NegReal => {
                    let a = stack.pop()?.as_real()?;
                    stack.push(Value::Real(-a));
                }
                Compare { op, operands } => {
                    let (a, b) = stack.pop2()?;
                    let ordering = compare_values(operands, &a, &b)?;
                    stack.push(Value::Boolean(comparison_holds(op, ordering)));
                }

                AxisStep { axis, test } => {
                    let test = self.test(test)?;
                    let origins = match stack.pop()? {
                        Value::Node(node) => crate::vec![node],
                        Value::NodeSet(nodes) => nodes,
                        other => return Err(RuntimeError::type_mismatch(TypeTag::NodeSet, &other)),
                    };
                    let mut selected = Vec::new();
                    for origin in origins {
                        selected.extend(self.document.axis(origin, axis, test));
                    }
                    self.document.sort_unique(&mut selected);
                    stack.push(Value::NodeSet(selected));
                }
                TestNode(test) => {
                    let test = self.test(test)?;
                    stack.push(Value::Boolean(self.document.matches(current, test)));
                }
                ToParent => match self.document.parent(current) {
                    Some(parent) => {
                        current = parent;
                        stack.push(Value::Boolean(true));
                    }
                    None => stack.push(Value::Boolean(false)),
                },
                CallRuntime(function) => {
                    let result = self.call_runtime(function, &mut stack)?;
                    stack.push(result);
                }

                Goto(label) => {
                    if label.is_pending() {
                        return Err(RuntimeError::UnpatchedJump(here));
                    }
                    ip = label.index();
                }
                JumpIfFalse(label) => {
                    if label.is_pending() {
                        return Err(RuntimeError::UnpatchedJump(here));
                    }
                    if !stack.pop()?.as_bool()? {
                        ip = label.index();
                    }
                }
                Return => {
                    let value = stack.pop()?;
                    debug!(steps, %value, "Returned");
                    return Ok(value);
                }
            }
        }
    }

    /// Position of `node` among the siblings that pass `test`, and how many
    /// such siblings there are. A node without a parent is alone in its list.
    fn step_context(&self, node: NodeId, test: &StepTest) -> (i64, i64) {
        let Some(siblings) = siblings(self.document, node) else {
            return (1, 1);
        };
        let mut position = 0;
        let mut size = 0;
        for sibling in siblings {
            if self.document.matches(*sibling, test) {
                size += 1;
                if *sibling == node {
                    position = size;
                }
            }
        }
        (position, size)
    }

    /// Like [`Machine::step_context`], counting only the siblings for
    /// which every unit of the filter returns true.
    fn filtered_step_context(&mut self, node: NodeId, test: u32, filter: u32) -> Result<(i64, i64), RuntimeError> {
        let pool = self.pool;
        let test = self.test(test)?;
        let filter = pool.filter(filter).ok_or(RuntimeError::MissingFilter(filter))?;
        let Some(siblings) = siblings(self.document, node) else {
            return Ok((1, 1));
        };
        // The filter units run nested; keep them out of the caller's trace.
        let trace = self.trace.take();
        let counted = self.count_filtered(node, siblings, test, &filter.units);
        self.trace = trace;
        counted
    }

    fn count_filtered(
        &mut self,
        node: NodeId,
        siblings: &[NodeId],
        test: &StepTest,
        units: &[Code],
    ) -> Result<(i64, i64), RuntimeError> {
        let mut position = 0;
        let mut size = 0;
        'siblings: for sibling in siblings {
            if !self.document.matches(*sibling, test) {
                continue;
            }
            for unit in units {
                if !self.execute(unit, &Frame::new(*sibling))?.as_bool()? {
                    continue 'siblings;
                }
            }
            size += 1;
            if *sibling == node {
                position = size;
            }
        }
        trace!(node = node.0, position, size, "Filtered step context");
        Ok((position, size))
    }

    fn call_runtime(
        &self,
        function: RuntimeFunction,
        stack: &mut Stack<Value>,
    ) -> Result<Value, RuntimeError> {
        Ok(match function {
            RuntimeFunction::StartsWith => {
                let (haystack, prefix) = stack.pop2()?;
                Value::Boolean(haystack.as_str()?.starts_with(prefix.as_str()?))
            }
            RuntimeFunction::Lang => {
                let (lang, node) = stack.pop2()?;
                Value::Boolean(self.document.lang(node.as_node()?, lang.as_str()?))
            }
            RuntimeFunction::GenerateId => match stack.pop()? {
                Value::Node(node) => Value::String(self.document.generate_id(node)),
                Value::NodeSet(nodes) => Value::String(match nodes.first() {
                    Some(node) => self.document.generate_id(*node),
                    None => EcoString::new(),
                }),
                other => return Err(RuntimeError::type_mismatch(TypeTag::Node, &other)),
            },
            RuntimeFunction::UnparsedEntityUri => {
                let name = stack.pop()?;
                Value::String(self.document.unparsed_entity_uri(name.as_str()?))
            }
        })
    }
}

/// The list `node` is counted in: its parent's attributes or children.
fn siblings(document: &Document, node: NodeId) -> Option<&[NodeId]> {
    let parent = document.parent(node)?;
    Some(if document.kind(node) == NodeKind::Attribute {
        document.attributes(parent)
    } else {
        document.children(parent)
    })
}

fn check_cast(class: EcoString, value: Value) -> Result<Value, RuntimeError> {
    let inner = match value {
        Value::Reference(inner) => inner,
        other => return Err(RuntimeError::type_mismatch(TypeTag::Reference, &other)),
    };
    match *inner {
        Value::Object { class: actual, .. } if actual != class => Err(RuntimeError::BadCast {
            class,
            found: actual,
        }),
        Value::Object { value, .. } => Ok(Value::Object { class, value }),
        other => Ok(Value::Object {
            class,
            value: Box::new(other),
        }),
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Result<i64, RuntimeError> {
    Ok(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => a.checked_div(b).ok_or(RuntimeError::DivisionByZero)?,
        BinaryOp::Mod => a.checked_rem(b).ok_or(RuntimeError::DivisionByZero)?,
        other => return Err(RuntimeError::UnsupportedOperator(other.symbol())),
    })
}

fn real_op(op: BinaryOp, a: f64, b: f64) -> Result<f64, RuntimeError> {
    Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        other => return Err(RuntimeError::UnsupportedOperator(other.symbol())),
    })
}

/// `None` means the operands are unordered (NaN).
fn compare_values(operands: TypeTag, a: &Value, b: &Value) -> Result<Option<Ordering>, RuntimeError> {
    Ok(match operands {
        TypeTag::Boolean => Some(a.as_bool()?.cmp(&b.as_bool()?)),
        TypeTag::Int => Some(a.as_int()?.cmp(&b.as_int()?)),
        TypeTag::Real => a.as_real()?.partial_cmp(&b.as_real()?),
        TypeTag::String => Some(a.as_str()?.cmp(b.as_str()?)),
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: TypeTag::String,
                found: other,
            });
        }
    })
}

fn comparison_holds(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    match (op, ordering) {
        (BinaryOp::Ne, None) => true,
        (_, None) => false,
        (BinaryOp::Eq, Some(o)) => o == Ordering::Equal,
        (BinaryOp::Ne, Some(o)) => o != Ordering::Equal,
        (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
        (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
        (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
        (BinaryOp::Ge, Some(o)) => o != Ordering::Less,
        _ => false,
    }
}
