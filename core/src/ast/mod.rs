//! Expression and pattern trees.
//!
//! Nodes live in an [`Ast`] arena and refer to each other by [`ExprId`].
//! Each node owns its children through the ids stored in its [`ExprKind`]
//! and keeps a non-owning back-reference to its syntactic parent, which the
//! checker walks to find enclosing `let` bindings and pattern predicates.
//!
//! The type checker rewrites the tree in one way only: it substitutes a
//! child with an [`ExprKind::Convert`] wrapper (see [`Ast::wrap`]). Code
//! generation never modifies it.

mod builtins;
mod pattern;

use ecow::EcoString;
use smallvec::{SmallVec, smallvec};

use crate::{
    QName, Vec,
    program::TopLevelId,
    syntax::{Axis, BinaryOp, LogicalOp, NodeTest, Span, UnaryOp},
    types::Type,
};

pub use builtins::{Builtin, ConstantFoldable, ConstantValue};
pub use pattern::{PatternKind, default_priority};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Int(i64),
    Real(f64),
    String(EcoString),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Boolean(_) => Type::Boolean,
            Literal::Int(_) => Type::Int,
            Literal::Real(_) => Type::Real,
            Literal::String(_) => Type::String,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Variable,
    Parameter,
}

/// Where a name is bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BindingSite {
    /// A `let` node of the same tree.
    Local(ExprId),
    /// A global variable or parameter of the program.
    Global(TopLevelId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub kind: BindingKind,
    pub site: BindingSite,
}

/// Resolution progress of an [`ExprKind::UnresolvedRef`].
///
/// `Resolved` and `Failed` are final.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefState {
    Unattempted,
    InProgress,
    /// Points at the variable or parameter reference that replaced it.
    Resolved(ExprId),
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub builtin: Builtin,
    pub args: SmallVec<[ExprId; 2]>,
    /// Compile-time value, computed by the checker for the `-available`
    /// functions.
    pub folded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// `.`
    Context,
    /// `axis::test`, applied to `base` or to the context node.
    Step {
        axis: Axis,
        test: NodeTest,
        base: Option<ExprId>,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Logical {
        op: LogicalOp,
        left: ExprId,
        right: ExprId,
    },
    If {
        test: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    /// `let $name := value return body`; the binding is visible in `body`.
    Let {
        name: QName,
        kind: BindingKind,
        value: ExprId,
        body: ExprId,
    },
    UnresolvedRef {
        name: QName,
        state: RefState,
    },
    VariableRef {
        name: QName,
        binding: Binding,
    },
    ParamRef {
        name: QName,
        binding: Binding,
    },
    Call(FunctionCall),
    /// Coercion wrapper inserted by the checker; converts `operand` to the
    /// wrapper's own type.
    Convert {
        operand: ExprId,
    },
    Pattern(PatternKind),
}

impl ExprKind {
    pub fn children(&self) -> SmallVec<[ExprId; 4]> {
        match self {
            ExprKind::Literal(_)
            | ExprKind::Context
            | ExprKind::UnresolvedRef { .. }
            | ExprKind::VariableRef { .. }
            | ExprKind::ParamRef { .. } => SmallVec::new(),
            ExprKind::Step { base, .. } => base.iter().copied().collect(),
            ExprKind::Unary { operand, .. } | ExprKind::Convert { operand } => smallvec![*operand],
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                smallvec![*left, *right]
            }
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => smallvec![*test, *then_branch, *else_branch],
            ExprKind::Let { value, body, .. } => smallvec![*value, *body],
            ExprKind::Call(call) => call.args.iter().copied().collect(),
            ExprKind::Pattern(pattern) => pattern.children(),
        }
    }

    fn child_slots(&mut self) -> SmallVec<[&mut ExprId; 4]> {
        match self {
            ExprKind::Literal(_)
            | ExprKind::Context
            | ExprKind::UnresolvedRef { .. }
            | ExprKind::VariableRef { .. }
            | ExprKind::ParamRef { .. } => SmallVec::new(),
            ExprKind::Step { base, .. } => base.iter_mut().collect(),
            ExprKind::Unary { operand, .. } | ExprKind::Convert { operand } => smallvec![operand],
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                smallvec![left, right]
            }
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => smallvec![test, then_branch, else_branch],
            ExprKind::Let { value, body, .. } => smallvec![value, body],
            ExprKind::Call(call) => call.args.iter_mut().collect(),
            ExprKind::Pattern(pattern) => pattern.child_slots(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: ExprKind,
    /// Static type; `None` until the checker has visited the node.
    pub ty: Option<Type>,
    pub parent: Option<ExprId>,
    pub span: Span,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("unknown function {0}()")]
    UnknownFunction(EcoString),
}

/// Arena of expression and pattern nodes.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ExprId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: ExprId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.node(id).kind
    }

    pub fn ty(&self, id: ExprId) -> Option<&Type> {
        self.node(id).ty.as_ref()
    }

    pub fn parent(&self, id: ExprId) -> Option<ExprId> {
        self.node(id).parent
    }

    pub fn span(&self, id: ExprId) -> &Span {
        &self.node(id).span
    }

    /// Ids of all nodes, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        (0..self.nodes.len() as u32).map(ExprId)
    }

    /// Attach a source span to a node.
    pub fn spanned(&mut self, id: ExprId, span: Span) -> ExprId {
        self.node_mut(id).span = span;
        id
    }

    pub(crate) fn alloc(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        for child in kind.children() {
            debug_assert!(self.parent(child).is_none(), "{:?} already has a parent", child);
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            ty: None,
            parent: None,
            span: Span::default(),
        });
        id
    }

    /// Insert a coercion wrapper converting `child` to `target` between
    /// `child` and its parent, and return the wrapper.
    pub(crate) fn wrap(&mut self, child: ExprId, target: Type) -> ExprId {
        let parent = self.parent(child);
        let span = self.span(child).clone();
        let wrapper = ExprId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: ExprKind::Convert { operand: child },
            ty: Some(target),
            parent,
            span,
        });
        self.node_mut(child).parent = Some(wrapper);
        if let Some(parent) = parent {
            self.replace_child(parent, child, wrapper);
        }
        wrapper
    }

    /// Point the slot of `parent` holding `old` at `new`.
    pub(crate) fn replace_child(&mut self, parent: ExprId, old: ExprId, new: ExprId) {
        let mut replaced = false;
        for slot in self.node_mut(parent).kind.child_slots() {
            if *slot == old {
                *slot = new;
                replaced = true;
            }
        }
        debug_assert!(replaced, "{:?} is not a child of {:?}", old, parent);
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub fn boolean(&mut self, value: bool) -> ExprId {
        self.alloc(ExprKind::Literal(Literal::Boolean(value)))
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.alloc(ExprKind::Literal(Literal::Int(value)))
    }

    pub fn real(&mut self, value: f64) -> ExprId {
        self.alloc(ExprKind::Literal(Literal::Real(value)))
    }

    pub fn string(&mut self, value: impl Into<EcoString>) -> ExprId {
        self.alloc(ExprKind::Literal(Literal::String(value.into())))
    }

    pub fn context(&mut self) -> ExprId {
        self.alloc(ExprKind::Context)
    }

    pub fn step(&mut self, axis: Axis, test: NodeTest, base: Option<ExprId>) -> ExprId {
        self.alloc(ExprKind::Step { axis, test, base })
    }

    pub fn neg(&mut self, operand: ExprId) -> ExprId {
        self.alloc(ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        })
    }

    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.alloc(ExprKind::Binary { op, left, right })
    }

    pub fn and(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.alloc(ExprKind::Logical {
            op: LogicalOp::And,
            left,
            right,
        })
    }

    pub fn or(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.alloc(ExprKind::Logical {
            op: LogicalOp::Or,
            left,
            right,
        })
    }

    pub fn if_then_else(&mut self, test: ExprId, then_branch: ExprId, else_branch: ExprId) -> ExprId {
        self.alloc(ExprKind::If {
            test,
            then_branch,
            else_branch,
        })
    }

    pub fn let_variable(&mut self, name: impl Into<QName>, value: ExprId, body: ExprId) -> ExprId {
        self.alloc(ExprKind::Let {
            name: name.into(),
            kind: BindingKind::Variable,
            value,
            body,
        })
    }

    pub fn let_parameter(&mut self, name: impl Into<QName>, value: ExprId, body: ExprId) -> ExprId {
        self.alloc(ExprKind::Let {
            name: name.into(),
            kind: BindingKind::Parameter,
            value,
            body,
        })
    }

    /// `$name`, resolved later by the checker.
    pub fn reference(&mut self, name: impl Into<QName>) -> ExprId {
        self.alloc(ExprKind::UnresolvedRef {
            name: name.into(),
            state: RefState::Unattempted,
        })
    }

    /// A call of the built-in function `name`. `true()` and `false()` build
    /// boolean literals.
    pub fn call(
        &mut self,
        name: &str,
        args: impl IntoIterator<Item = ExprId>,
    ) -> Result<ExprId, BuildError> {
        let args: SmallVec<[ExprId; 2]> = args.into_iter().collect();
        match name {
            "true" | "false" if args.is_empty() => return Ok(self.boolean(name == "true")),
            _ => {}
        }
        let builtin = Builtin::from_name(name).ok_or_else(|| BuildError::UnknownFunction(name.into()))?;
        Ok(self.alloc(ExprKind::Call(FunctionCall {
            builtin,
            args,
            folded: None,
        })))
    }

    // ------------------------------------------------------------------
    // Pattern builders
    // ------------------------------------------------------------------

    /// A single step pattern such as `item`, `@id` or `item[2]`.
    pub fn pattern_step(
        &mut self,
        axis: Axis,
        test: NodeTest,
        predicates: impl IntoIterator<Item = ExprId>,
    ) -> ExprId {
        debug_assert!(
            matches!(axis, Axis::Child | Axis::Attribute),
            "patterns only use the child and attribute axes"
        );
        self.alloc(ExprKind::Pattern(PatternKind::Step {
            axis,
            test,
            predicates: predicates.into_iter().collect(),
        }))
    }

    /// `parent/child`
    pub fn pattern_parent(&mut self, parent: ExprId, child: ExprId) -> ExprId {
        self.alloc(ExprKind::Pattern(PatternKind::Parent { parent, child }))
    }

    /// `ancestor//child`
    pub fn pattern_ancestor(&mut self, ancestor: ExprId, child: ExprId) -> ExprId {
        self.alloc(ExprKind::Pattern(PatternKind::Ancestor { ancestor, child }))
    }

    /// `left | right`
    pub fn pattern_alternative(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.alloc(ExprKind::Pattern(PatternKind::Alternative { left, right }))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The root of the tree containing `id`.
    pub fn root_of(&self, id: ExprId) -> ExprId {
        let mut cursor = id;
        while let Some(parent) = self.parent(cursor) {
            cursor = parent;
        }
        cursor
    }

    /// Skip coercion wrappers and resolved references.
    pub fn unwrap(&self, id: ExprId) -> ExprId {
        match self.kind(id) {
            ExprKind::Convert { operand } => self.unwrap(*operand),
            ExprKind::UnresolvedRef {
                state: RefState::Resolved(target),
                ..
            } => self.unwrap(*target),
            _ => id,
        }
    }

    /// The pattern step whose predicate contains `id`, if any.
    pub fn enclosing_predicate_step(&self, id: ExprId) -> Option<ExprId> {
        self.enclosing_predicate(id).map(|(step, _)| step)
    }

    /// The pattern step whose predicate contains `id` together with the
    /// root of that predicate.
    pub fn enclosing_predicate(&self, id: ExprId) -> Option<(ExprId, ExprId)> {
        let mut child = id;
        while let Some(parent) = self.parent(child) {
            if let ExprKind::Pattern(PatternKind::Step { predicates, .. }) = self.kind(parent) {
                if predicates.contains(&child) {
                    return Some((parent, child));
                }
            }
            child = parent;
        }
        None
    }

    /// Compile-time value of a boolean expression, if it has one.
    pub fn fold(&self, id: ExprId) -> Option<ConstantValue> {
        match self.kind(id) {
            ExprKind::Literal(literal) => literal.evaluate_at_compile_time(self),
            ExprKind::Call(call) => call.evaluate_at_compile_time(self),
            ExprKind::Convert { operand } if self.ty(id) == Some(&Type::Boolean) => {
                self.fold(*operand)
            }
            _ => None,
        }
    }

    pub fn pattern_priority(&self, id: ExprId) -> Option<f64> {
        match self.kind(id) {
            ExprKind::Pattern(_) => Some(default_priority(self, id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::NodeKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builders_link_parents() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let two = ast.int(2);
        let sum = ast.binary(BinaryOp::Add, one, two);
        assert_eq!(ast.parent(one), Some(sum));
        assert_eq!(ast.parent(two), Some(sum));
        assert_eq!(ast.parent(sum), None);
        assert_eq!(ast.root_of(one), sum);
    }

    #[test]
    fn test_wrap_substitutes_child_slot() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let two = ast.real(2.0);
        let sum = ast.binary(BinaryOp::Add, one, two);

        let wrapper = ast.wrap(one, Type::Real);

        assert_eq!(
            ast.kind(sum),
            &ExprKind::Binary {
                op: BinaryOp::Add,
                left: wrapper,
                right: two
            }
        );
        assert_eq!(ast.parent(wrapper), Some(sum));
        assert_eq!(ast.parent(one), Some(wrapper));
        assert_eq!(ast.ty(wrapper), Some(&Type::Real));
        assert_eq!(ast.unwrap(wrapper), one);
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        let mut ast = Ast::new();
        assert_eq!(
            ast.call("frobnicate", []),
            Err(BuildError::UnknownFunction("frobnicate".into()))
        );
    }

    #[test]
    fn test_true_and_false_build_literals() {
        let mut ast = Ast::new();
        let t = ast.call("true", []).unwrap();
        assert_eq!(ast.kind(t), &ExprKind::Literal(Literal::Boolean(true)));
        assert_eq!(ast.fold(t), Some(ConstantValue::Boolean(true)));
    }

    #[test]
    fn test_enclosing_predicate_step() {
        let mut ast = Ast::new();
        let last = ast.call("last", []).unwrap();
        let step = ast.pattern_step(Axis::Child, NodeTest::Kind(NodeKind::Text), [last]);
        let outside = ast.call("position", []).unwrap();
        assert_eq!(ast.enclosing_predicate_step(last), Some(step));
        assert_eq!(ast.enclosing_predicate_step(outside), None);
    }
}
