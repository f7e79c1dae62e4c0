//! Resolution of `$name` references.
//!
//! A reference is resolved the first time it is checked: against the
//! enclosing `let` bindings first, then against the program's globals. The
//! state stored in the reference node makes the outcome final, so a
//! reference to an undefined name reports exactly once however many times
//! it is visited.

use tracing::debug;

use crate::{
    QName,
    analyzer::{CheckResult, Checker, Reported, TypeCheckError, TypeCheckErrorKind, checker::GlobalState},
    api::Severity,
    ast::{Binding, BindingKind, BindingSite, ExprId, ExprKind, RefState},
    program::{SymbolTable, TopLevelId},
    types::Type,
};

/// Name lookup and error reporting as seen from inside an expression.
pub trait Scope {
    /// The `let` binding of `name` visible from `from`, if any.
    fn lookup_local(&self, from: ExprId, name: &QName) -> Option<Binding>;

    /// Record an error; never unwinds.
    fn report_error(&mut self, severity: Severity, error: TypeCheckError);
}

impl Scope for Checker<'_> {
    fn lookup_local(&self, from: ExprId, name: &QName) -> Option<Binding> {
        let ast = &self.program.ast;
        let mut child = from;
        while let Some(parent) = ast.parent(child) {
            if let ExprKind::Let {
                name: bound,
                kind,
                body,
                ..
            } = ast.kind(parent)
            {
                if *body == child && bound == name {
                    return Some(Binding {
                        kind: *kind,
                        site: BindingSite::Local(parent),
                    });
                }
            }
            child = parent;
        }
        None
    }

    fn report_error(&mut self, severity: Severity, error: TypeCheckError) {
        self.push_error(severity, error);
    }
}

impl Checker<'_> {
    fn set_ref_state(&mut self, id: ExprId, new_state: RefState) {
        if let ExprKind::UnresolvedRef { state, .. } = &mut self.program.ast.node_mut(id).kind {
            *state = new_state;
        }
    }

    fn fail_reference(&mut self, id: ExprId, kind: Option<TypeCheckErrorKind>) -> Reported {
        self.set_ref_state(id, RefState::Failed);
        if let Some(kind) = kind {
            self.error(id, kind);
        }
        Reported
    }

    pub(crate) fn resolve_reference(&mut self, id: ExprId, name: QName, state: RefState) -> CheckResult {
        match state {
            RefState::Resolved(target) => return self.check(target),
            RefState::Failed => return Err(Reported),
            RefState::InProgress => {
                return Err(self.fail_reference(id, Some(TypeCheckErrorKind::CircularReference { name })));
            }
            RefState::Unattempted => {}
        }
        self.set_ref_state(id, RefState::InProgress);

        let binding = self
            .lookup_local(id, &name)
            .or_else(|| self.program.lookup_name(&name));
        let Some(binding) = binding else {
            debug!(%name, "Undefined reference");
            return Err(self.fail_reference(id, Some(TypeCheckErrorKind::UndefinedReference { name })));
        };

        if let BindingSite::Global(global) = binding.site {
            if let Some(owner) = self.program.owner_of(id) {
                self.program.dependencies.add(owner, global);
            }
            if self.globals.get(&global) == Some(&GlobalState::InProgress) {
                let definition = self.program.top_level(global).span.clone();
                let span = self.program.ast.span(id).clone();
                self.set_ref_state(id, RefState::Failed);
                let error = TypeCheckError::new(TypeCheckErrorKind::CircularReference { name }, id, span)
                    .with_context(definition, "the definition being checked");
                self.report_error(Severity::Error, error);
                return Err(Reported);
            }
        }

        let ty = match self.binding_type(binding) {
            Ok(ty) => ty,
            // The binding's own definition failed and was reported there.
            Err(Reported) => return Err(self.fail_reference(id, None)),
        };

        let kind = match binding.kind {
            BindingKind::Variable => ExprKind::VariableRef {
                name: name.clone(),
                binding,
            },
            BindingKind::Parameter => ExprKind::ParamRef {
                name: name.clone(),
                binding,
            },
        };
        let span = self.program.ast.span(id).clone();
        let ast = &mut self.program.ast;
        let resolved = ast.alloc(kind);
        let node = ast.node_mut(resolved);
        node.ty = Some(ty.clone());
        node.parent = Some(id);
        node.span = span;

        self.set_ref_state(id, RefState::Resolved(resolved));
        self.program.ast.node_mut(id).ty = Some(ty.clone());
        debug!(%name, ?binding, %ty, "Resolved reference");
        Ok(ty)
    }

    /// The type of the value a binding holds.
    ///
    /// A global parameter can be overridden with a value of any type when
    /// the program runs, so readers see it as a `Reference` and convert it
    /// where they need something else.
    pub(crate) fn binding_type(&mut self, binding: Binding) -> CheckResult {
        match (binding.site, binding.kind) {
            (BindingSite::Local(let_node), _) => match self.program.ast.kind(let_node) {
                ExprKind::Let { value, .. } => self.ty(*value).cloned().ok_or(Reported),
                _ => Err(Reported),
            },
            (BindingSite::Global(global), BindingKind::Parameter) => {
                self.check_global(global)?;
                Ok(Type::Reference)
            }
            (BindingSite::Global(global), BindingKind::Variable) => self.check_global(global),
        }
    }

    /// Whether `global` has been checked successfully.
    pub fn global_type(&self, global: TopLevelId) -> Option<&Type> {
        match self.globals.get(&global) {
            Some(GlobalState::Checked(ty)) => Some(ty),
            _ => None,
        }
    }
}
