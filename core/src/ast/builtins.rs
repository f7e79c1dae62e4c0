use core::ops::RangeInclusive;

use crate::ast::{Ast, FunctionCall, Literal};

/// The closed set of built-in functions a call can name.
///
/// The variant is chosen once, when the call node is built; nothing looks a
/// function up by name after that.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Builtin {
    Boolean,
    Not,
    StartsWith,
    GenerateId,
    Lang,
    UnparsedEntityUri,
    ElementAvailable,
    FunctionAvailable,
    /// `cast('class.Name', $value)`: reference type-cast.
    Cast,
    Last,
    Position,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::Boolean,
        Builtin::Not,
        Builtin::StartsWith,
        Builtin::GenerateId,
        Builtin::Lang,
        Builtin::UnparsedEntityUri,
        Builtin::ElementAvailable,
        Builtin::FunctionAvailable,
        Builtin::Cast,
        Builtin::Last,
        Builtin::Position,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|builtin| builtin.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Boolean => "boolean",
            Builtin::Not => "not",
            Builtin::StartsWith => "starts-with",
            Builtin::GenerateId => "generate-id",
            Builtin::Lang => "lang",
            Builtin::UnparsedEntityUri => "unparsed-entity-uri",
            Builtin::ElementAvailable => "element-available",
            Builtin::FunctionAvailable => "function-available",
            Builtin::Cast => "cast",
            Builtin::Last => "last",
            Builtin::Position => "position",
        }
    }

    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Builtin::Last | Builtin::Position => 0..=0,
            Builtin::GenerateId => 0..=1,
            Builtin::Boolean
            | Builtin::Not
            | Builtin::Lang
            | Builtin::UnparsedEntityUri
            | Builtin::ElementAvailable
            | Builtin::FunctionAvailable => 1..=1,
            Builtin::StartsWith | Builtin::Cast => 2..=2,
        }
    }

    /// Functions whose argument must be a string literal.
    pub fn requires_literal(self) -> bool {
        matches!(self, Builtin::ElementAvailable | Builtin::FunctionAvailable)
    }

    /// Functions whose code depends on whether they sit in a pattern
    /// predicate.
    pub fn is_context_sensitive(self) -> bool {
        matches!(self, Builtin::Last | Builtin::Position)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConstantValue {
    Boolean(bool),
}

/// Expressions whose value may be known before the program runs.
pub trait ConstantFoldable {
    /// The value of the expression if it is known at compile time. Only
    /// meaningful after type checking.
    fn evaluate_at_compile_time(&self, ast: &Ast) -> Option<ConstantValue>;
}

impl ConstantFoldable for Literal {
    fn evaluate_at_compile_time(&self, _ast: &Ast) -> Option<ConstantValue> {
        match self {
            Literal::Boolean(value) => Some(ConstantValue::Boolean(*value)),
            _ => None,
        }
    }
}

impl ConstantFoldable for FunctionCall {
    fn evaluate_at_compile_time(&self, ast: &Ast) -> Option<ConstantValue> {
        match self.builtin {
            Builtin::ElementAvailable | Builtin::FunctionAvailable => {
                self.folded.map(ConstantValue::Boolean)
            }
            Builtin::Not => match ast.fold(*self.args.first()?)? {
                ConstantValue::Boolean(value) => Some(ConstantValue::Boolean(!value)),
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_round_trips() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(*builtin));
        }
        assert_eq!(Builtin::from_name("concat"), None);
    }

    #[test]
    fn test_not_folds_through_its_operand() {
        let mut ast = Ast::new();
        let f = ast.boolean(false);
        let not = ast.call("not", [f]).unwrap();
        assert_eq!(ast.fold(not), Some(ConstantValue::Boolean(true)));

        let n = ast.int(1);
        let not_number = ast.call("not", [n]).unwrap();
        assert_eq!(ast.fold(not_number), None);
    }
}
