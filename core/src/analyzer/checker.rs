use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::{
    Vec,
    analyzer::{TypeCheckError, TypeCheckErrorKind},
    api::Severity,
    ast::{ExprId, ExprKind, PatternKind},
    program::{Program, TopLevelId, TopLevelKind},
    syntax::LogicalOp,
    types::{Type, lookup_operator},
};

/// Marker returned by [`Checker::check`] when the subtree failed to check.
///
/// The error itself has already been recorded; callers only stop working on
/// the subtree.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reported;

pub type CheckResult = Result<Type, Reported>;

/// Progress of a global variable or parameter through the checker.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GlobalState {
    InProgress,
    Checked(Type),
    Failed,
}

/// Type resolution pass over a [`Program`].
///
/// Every node gets its static type; where a consumer needs a different type
/// a coercion wrapper is inserted above the producer. Errors are recorded,
/// not unwound, so independent top-level constructs keep being checked.
pub struct Checker<'p> {
    pub(crate) program: &'p mut Program,
    pub(crate) globals: HashMap<TopLevelId, GlobalState>,
    errors: Vec<TypeCheckError>,
    warnings: Vec<TypeCheckError>,
    max_errors: Option<usize>,
}

impl<'p> Checker<'p> {
    pub fn new(program: &'p mut Program) -> Self {
        Self {
            program,
            globals: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            max_errors: None,
        }
    }

    /// Stop checking further top-level constructs once this many errors
    /// have been recorded. `Some(0)` means no limit.
    pub fn with_max_errors(mut self, max_errors: Option<usize>) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn errors(&self) -> &[TypeCheckError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[TypeCheckError] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<TypeCheckError> {
        self.errors
    }

    pub(crate) fn push_error(&mut self, severity: Severity, error: TypeCheckError) {
        debug!(code = error.code(), node = ?error.node, %severity, "Type error");
        match severity {
            Severity::Error => self.errors.push(error),
            Severity::Warning | Severity::Info => self.warnings.push(error),
        }
    }

    /// Record an error at `node`.
    pub(crate) fn error(&mut self, node: ExprId, kind: TypeCheckErrorKind) -> Reported {
        let span = self.program.ast.span(node).clone();
        self.push_error(Severity::Error, TypeCheckError::new(kind, node, span));
        Reported
    }

    fn limit_reached(&self) -> bool {
        self.max_errors
            .is_some_and(|max| max > 0 && self.errors.len() >= max)
    }

    /// Check every top-level construct of the program, in declaration order.
    pub fn check_program(&mut self) {
        let ids: Vec<TopLevelId> = self.program.top_levels().map(|(id, _)| id).collect();
        for id in ids {
            if self.limit_reached() {
                debug!(errors = self.errors.len(), "Error limit reached");
                break;
            }
            self.check_top_level(id);
        }
    }

    pub fn check_top_level(&mut self, id: TopLevelId) {
        match self.program.top_level(id).kind.clone() {
            TopLevelKind::Variable { .. } | TopLevelKind::Parameter { .. } => {
                // Failures are already recorded.
                let _ = self.check_global(id);
            }
            TopLevelKind::Template { pattern, body, .. } => {
                debug!(template = id.index(), "Checking template");
                if !matches!(self.program.ast.kind(pattern), ExprKind::Pattern(_)) {
                    self.error(pattern, TypeCheckErrorKind::NotAPattern);
                } else {
                    let _ = self.check(pattern);
                }
                let _ = self.check(body);
            }
        }
    }

    /// Type of the global `id`, checking its initializer on first use.
    pub(crate) fn check_global(&mut self, id: TopLevelId) -> CheckResult {
        match self.globals.get(&id) {
            Some(GlobalState::Checked(ty)) => return Ok(ty.clone()),
            Some(GlobalState::Failed) | Some(GlobalState::InProgress) => return Err(Reported),
            None => {}
        }
        let root = self.program.top_level(id).roots()[0];
        debug!(global = id.index(), "Checking global");
        self.globals.insert(id, GlobalState::InProgress);
        let result = self.check(root);
        let state = match &result {
            Ok(ty) => GlobalState::Checked(ty.clone()),
            Err(Reported) => GlobalState::Failed,
        };
        self.globals.insert(id, state);
        result
    }

    pub(crate) fn ty(&self, id: ExprId) -> Option<&Type> {
        self.program.ast.ty(id)
    }

    /// Compute and record the static type of `id`.
    ///
    /// Already-typed nodes (coercion wrappers, resolved references, nodes
    /// checked through another path) return their type without being
    /// visited again.
    pub fn check(&mut self, id: ExprId) -> CheckResult {
        if let Some(ty) = self.ty(id) {
            return Ok(ty.clone());
        }
        let kind = self.program.ast.kind(id).clone();
        let ty = match kind {
            ExprKind::Literal(literal) => Ok(literal.ty()),
            ExprKind::Context => Ok(Type::Node),
            ExprKind::Step { base, .. } => self.check_step(base),
            ExprKind::Unary { op, operand } => self.check_operator(id, op.symbol(), &[operand]),
            ExprKind::Binary { op, left, right } => {
                self.check_operator(id, op.symbol(), &[left, right])
            }
            ExprKind::Logical { op, left, right } => self.check_logical(op, left, right),
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => self.check_if(test, then_branch, else_branch),
            ExprKind::Let { value, body, .. } => {
                let value = self.check(value);
                let body = self.check(body);
                value.and(body)
            }
            ExprKind::UnresolvedRef { name, state } => {
                return self.resolve_reference(id, name, state);
            }
            ExprKind::VariableRef { binding, .. } | ExprKind::ParamRef { binding, .. } => {
                self.binding_type(binding)
            }
            ExprKind::Call(call) => self.check_call(id, call),
            ExprKind::Convert { operand } => self.check(operand),
            ExprKind::Pattern(pattern) => self.check_pattern(pattern),
        }?;
        trace!(node = ?id, %ty, "Typed");
        self.program.ast.node_mut(id).ty = Some(ty.clone());
        Ok(ty)
    }

    /// Make `child` produce a `target` value, wrapping it in a coercion when
    /// its type differs. Reports a mismatch when no conversion exists.
    pub(crate) fn coerce(&mut self, child: ExprId, target: &Type) -> Result<ExprId, Reported> {
        let Some(found) = self.ty(child).cloned() else {
            return Err(Reported);
        };
        if &found == target {
            return Ok(child);
        }
        if !found.can_coerce_to(target) {
            return Err(self.error(
                child,
                TypeCheckErrorKind::TypeMismatch {
                    expected: target.clone(),
                    found,
                },
            ));
        }
        trace!(node = ?child, from = %found, to = %target, "Coercion");
        Ok(self.program.ast.wrap(child, target.clone()))
    }

    fn check_step(&mut self, base: Option<ExprId>) -> CheckResult {
        if let Some(base) = base {
            match self.check(base)? {
                Type::Node | Type::NodeSet => {}
                _ => {
                    self.coerce(base, &Type::NodeSet)?;
                }
            }
        }
        Ok(Type::NodeSet)
    }

    fn check_operator(&mut self, id: ExprId, symbol: &'static str, operands: &[ExprId]) -> CheckResult {
        let mut types = Vec::with_capacity(operands.len());
        let mut failed = false;
        for operand in operands {
            match self.check(*operand) {
                Ok(ty) => types.push(ty),
                Err(Reported) => failed = true,
            }
        }
        if failed {
            return Err(Reported);
        }

        let Some(found) = lookup_operator(symbol, &types) else {
            return Err(self.error(
                id,
                TypeCheckErrorKind::MissingOperator {
                    operator: symbol,
                    operands: types,
                },
            ));
        };
        for (index, operand) in operands.iter().enumerate() {
            if found.needs_coercion(index, &types[index]) {
                self.coerce(*operand, &found.operands[index])?;
            }
        }
        Ok(found.result)
    }

    fn check_logical(&mut self, op: LogicalOp, left: ExprId, right: ExprId) -> CheckResult {
        trace!(%op, "Checking logical operator");
        let left_ty = self.check(left);
        let right_ty = self.check(right);
        left_ty?;
        right_ty?;
        self.coerce(left, &Type::Boolean)?;
        self.coerce(right, &Type::Boolean)?;
        Ok(Type::Boolean)
    }

    fn check_if(&mut self, test: ExprId, then_branch: ExprId, else_branch: ExprId) -> CheckResult {
        // Both branches are checked even when the test is a constant, so
        // errors in a branch that will not be emitted are still reported.
        let test_ty = self.check(test);
        let then_ty = self.check(then_branch);
        let else_ty = self.check(else_branch);

        if test_ty.is_ok() {
            self.coerce(test, &Type::Boolean)?;
        }
        let (then_ty, else_ty) = (then_ty?, else_ty?);
        test_ty?;

        let joined = then_ty.join(&else_ty);
        self.coerce(then_branch, &joined)?;
        self.coerce(else_branch, &joined)?;
        Ok(joined)
    }

    fn check_pattern(&mut self, pattern: PatternKind) -> CheckResult {
        match pattern {
            PatternKind::Step { predicates, .. } => {
                let mut failed = false;
                for predicate in predicates {
                    let ok = match self.check(predicate) {
                        Ok(ty) if ty.is_numeric() => true,
                        Ok(_) => self.coerce(predicate, &Type::Boolean).is_ok(),
                        Err(Reported) => false,
                    };
                    failed |= !ok;
                }
                if failed {
                    return Err(Reported);
                }
            }
            PatternKind::Parent {
                parent: first,
                child: second,
            }
            | PatternKind::Ancestor {
                ancestor: first,
                child: second,
            }
            | PatternKind::Alternative {
                left: first,
                right: second,
            } => {
                let first = self.check(first);
                let second = self.check(second);
                first?;
                second?;
            }
        }
        Ok(Type::Boolean)
    }
}
