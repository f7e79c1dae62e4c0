//! Top-level constructs and the global symbol table.
//!
//! A [`Program`] owns the expression arena shared by all of its constructs:
//! global variables, global parameters and templates. Every construct
//! refers to the root nodes of its expressions; mapping a root back to its
//! construct is how references find the construct they belong to.

mod dependencies;

use ecow::EcoString;
use hashbrown::HashMap;
use smallvec::{SmallVec, smallvec};

use crate::{
    QName, Vec,
    ast::{Ast, Binding, BindingKind, BindingSite, ExprId},
    syntax::Span,
};

pub use dependencies::Dependencies;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopLevelId(pub(crate) u32);

impl TopLevelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevelKind {
    Variable {
        name: QName,
        value: ExprId,
    },
    /// A global parameter; `default` is used when the caller supplies no
    /// value.
    Parameter {
        name: QName,
        default: ExprId,
    },
    Template {
        pattern: ExprId,
        body: ExprId,
        /// Explicit priority overriding the pattern's default priority.
        priority: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopLevel {
    pub kind: TopLevelKind,
    pub span: Span,
}

impl TopLevel {
    /// The roots of the expressions this construct owns.
    pub fn roots(&self) -> SmallVec<[ExprId; 2]> {
        match &self.kind {
            TopLevelKind::Variable { value, .. } => smallvec![*value],
            TopLevelKind::Parameter { default, .. } => smallvec![*default],
            TopLevelKind::Template { pattern, body, .. } => smallvec![*pattern, *body],
        }
    }

    pub fn global_name(&self) -> Option<&QName> {
        match &self.kind {
            TopLevelKind::Variable { name, .. } | TopLevelKind::Parameter { name, .. } => Some(name),
            TopLevelKind::Template { .. } => None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.global_name().is_some()
    }
}

/// Read-only view of the names a program defines.
pub trait SymbolTable {
    fn lookup_name(&self, name: &QName) -> Option<Binding>;

    /// The namespace URI bound to `prefix`.
    fn lookup_namespace(&self, prefix: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    #[error("global ${0} is already defined")]
    DuplicateGlobal(QName),
    #[error("expression {0:?} already belongs to a top-level construct")]
    RootInUse(ExprId),
    #[error("expression {0:?} is not the root of a tree")]
    NotARoot(ExprId),
}

#[derive(Debug, Default)]
pub struct Program {
    pub(crate) ast: Ast,
    top_levels: Vec<TopLevel>,
    globals: HashMap<QName, TopLevelId>,
    namespaces: HashMap<EcoString, EcoString>,
    owners: HashMap<ExprId, TopLevelId>,
    pub(crate) dependencies: Dependencies,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Builder access to the expression arena.
    pub fn ast_mut(&mut self) -> &mut Ast {
        &mut self.ast
    }

    pub fn declare_namespace(&mut self, prefix: impl Into<EcoString>, uri: impl Into<EcoString>) {
        self.namespaces.insert(prefix.into(), uri.into());
    }

    fn push(&mut self, kind: TopLevelKind, span: Span) -> Result<TopLevelId, ProgramError> {
        let top_level = TopLevel { kind, span };
        for root in top_level.roots() {
            if self.ast.parent(root).is_some() {
                return Err(ProgramError::NotARoot(root));
            }
            if self.owners.contains_key(&root) {
                return Err(ProgramError::RootInUse(root));
            }
        }
        if let Some(name) = top_level.global_name() {
            if self.globals.contains_key(name) {
                return Err(ProgramError::DuplicateGlobal(name.clone()));
            }
        }

        let id = TopLevelId(self.top_levels.len() as u32);
        for root in top_level.roots() {
            self.owners.insert(root, id);
        }
        if let Some(name) = top_level.global_name() {
            self.globals.insert(name.clone(), id);
        }
        self.top_levels.push(top_level);
        Ok(id)
    }

    pub fn add_variable(&mut self, name: impl Into<QName>, value: ExprId) -> Result<TopLevelId, ProgramError> {
        let span = self.ast.span(value).clone();
        self.push(
            TopLevelKind::Variable {
                name: name.into(),
                value,
            },
            span,
        )
    }

    pub fn add_parameter(&mut self, name: impl Into<QName>, default: ExprId) -> Result<TopLevelId, ProgramError> {
        let span = self.ast.span(default).clone();
        self.push(
            TopLevelKind::Parameter {
                name: name.into(),
                default,
            },
            span,
        )
    }

    pub fn add_template(
        &mut self,
        pattern: ExprId,
        body: ExprId,
        priority: Option<f64>,
    ) -> Result<TopLevelId, ProgramError> {
        let span = Span::combine(self.ast.span(pattern), self.ast.span(body));
        self.push(
            TopLevelKind::Template {
                pattern,
                body,
                priority,
            },
            span,
        )
    }

    pub fn top_level(&self, id: TopLevelId) -> &TopLevel {
        &self.top_levels[id.index()]
    }

    pub fn top_levels(&self) -> impl Iterator<Item = (TopLevelId, &TopLevel)> + '_ {
        self.top_levels
            .iter()
            .enumerate()
            .map(|(index, top_level)| (TopLevelId(index as u32), top_level))
    }

    pub fn len(&self) -> usize {
        self.top_levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.top_levels.is_empty()
    }

    /// The construct owning the tree that contains `expr`.
    pub fn owner_of(&self, expr: ExprId) -> Option<TopLevelId> {
        self.owners.get(&self.ast.root_of(expr)).copied()
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Global variables and parameters in an order where every initializer
    /// runs after the globals it reads.
    pub fn global_order(&self) -> Vec<TopLevelId> {
        let globals: Vec<TopLevelId> = self
            .top_levels()
            .filter(|(_, top_level)| top_level.is_global())
            .map(|(id, _)| id)
            .collect();
        self.dependencies.order(&globals)
    }

    /// Effective priority of a template: the explicit one, or the default
    /// priority of its pattern.
    pub fn template_priority(&self, id: TopLevelId) -> Option<f64> {
        match &self.top_level(id).kind {
            TopLevelKind::Template {
                pattern, priority, ..
            } => priority.or_else(|| self.ast.pattern_priority(*pattern)),
            _ => None,
        }
    }
}

impl SymbolTable for Program {
    fn lookup_name(&self, name: &QName) -> Option<Binding> {
        let id = *self.globals.get(name)?;
        let kind = match self.top_level(id).kind {
            TopLevelKind::Parameter { .. } => BindingKind::Parameter,
            _ => BindingKind::Variable,
        };
        Some(Binding {
            kind,
            site: BindingSite::Global(id),
        })
    }

    fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(EcoString::as_str)
    }
}
