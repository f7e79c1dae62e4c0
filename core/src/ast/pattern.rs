use smallvec::{SmallVec, smallvec};

use crate::{
    ast::{Ast, ExprId, ExprKind},
    syntax::{Axis, NodeTest},
};

/// Match patterns. A pattern is a test on a single node rather than an
/// expression producing a value; it always type-checks to boolean.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// One step on the child or attribute axis, with optional predicates.
    Step {
        axis: Axis,
        test: NodeTest,
        predicates: SmallVec<[ExprId; 2]>,
    },
    /// `parent/child`
    Parent { parent: ExprId, child: ExprId },
    /// `ancestor//child`
    Ancestor { ancestor: ExprId, child: ExprId },
    /// `left | right`
    Alternative { left: ExprId, right: ExprId },
}

impl PatternKind {
    pub(super) fn children(&self) -> SmallVec<[ExprId; 4]> {
        match self {
            PatternKind::Step { predicates, .. } => predicates.iter().copied().collect(),
            PatternKind::Parent { parent, child } => smallvec![*parent, *child],
            PatternKind::Ancestor { ancestor, child } => smallvec![*ancestor, *child],
            PatternKind::Alternative { left, right } => smallvec![*left, *right],
        }
    }

    pub(super) fn child_slots(&mut self) -> SmallVec<[&mut ExprId; 4]> {
        match self {
            PatternKind::Step { predicates, .. } => predicates.iter_mut().collect(),
            PatternKind::Parent { parent, child } => smallvec![parent, child],
            PatternKind::Ancestor { ancestor, child } => smallvec![ancestor, child],
            PatternKind::Alternative { left, right } => smallvec![left, right],
        }
    }
}

/// XSLT default priority of the pattern rooted at `id`.
///
/// A bare name test is 0, `prefix:*` is -0.25, any other bare node test is
/// -0.5 and everything more specific is 0.5. An alternative takes the
/// priority of its highest-priority branch.
pub fn default_priority(ast: &Ast, id: ExprId) -> f64 {
    let ExprKind::Pattern(pattern) = ast.kind(id) else {
        return 0.5;
    };
    match pattern {
        PatternKind::Step {
            test, predicates, ..
        } if predicates.is_empty() => match test {
            NodeTest::Name(_) => 0.0,
            NodeTest::NamespaceWildcard(_) => -0.25,
            NodeTest::Wildcard | NodeTest::Kind(_) | NodeTest::AnyNode => -0.5,
            NodeTest::Root => 0.5,
        },
        PatternKind::Step { .. } | PatternKind::Parent { .. } | PatternKind::Ancestor { .. } => 0.5,
        PatternKind::Alternative { left, right } => {
            let left = default_priority(ast, *left);
            let right = default_priority(ast, *right);
            if left >= right { left } else { right }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QName, syntax::NodeKind};

    #[test]
    fn test_default_priorities() {
        let mut ast = Ast::new();
        let name = ast.pattern_step(Axis::Child, NodeTest::Name(QName::local("item")), []);
        let ns = ast.pattern_step(Axis::Child, NodeTest::NamespaceWildcard("urn:x".into()), []);
        let text = ast.pattern_step(Axis::Child, NodeTest::Kind(NodeKind::Text), []);
        let one = ast.int(1);
        let filtered = ast.pattern_step(Axis::Child, NodeTest::Wildcard, [one]);

        assert_eq!(ast.pattern_priority(name), Some(0.0));
        assert_eq!(ast.pattern_priority(ns), Some(-0.25));
        assert_eq!(ast.pattern_priority(text), Some(-0.5));
        assert_eq!(ast.pattern_priority(filtered), Some(0.5));

        let either = ast.pattern_alternative(text, name);
        assert_eq!(ast.pattern_priority(either), Some(0.0));
        assert_eq!(ast.pattern_priority(one), None);
    }

    #[test]
    fn test_path_patterns_are_specific() {
        let mut ast = Ast::new();
        let list = ast.pattern_step(Axis::Child, NodeTest::Name(QName::local("list")), []);
        let item = ast.pattern_step(Axis::Child, NodeTest::Name(QName::local("item")), []);
        let path = ast.pattern_parent(list, item);
        assert_eq!(ast.pattern_priority(path), Some(0.5));
    }
}
