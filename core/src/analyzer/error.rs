use alloc::string::ToString;

use ecow::EcoString;

use crate::api::{Diagnostic, RelatedInfo};
use crate::ast::ExprId;
use crate::syntax::Span;
use crate::types::Type;
use crate::{QName, String, Vec, format};

/// Type-check error attached to the offending node.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCheckError {
    pub kind: TypeCheckErrorKind,
    pub node: ExprId,
    pub span: Span,
    pub context: Vec<RelatedInfo>,
}

impl core::fmt::Display for TypeCheckError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let diagnostic = self.to_diagnostic();
        write!(f, "{}: {}", diagnostic.severity, diagnostic.message)?;

        if let Some(ref code) = diagnostic.code {
            write!(f, " [{}]", code)?;
        }

        if let Some(ref help) = diagnostic.help {
            write!(f, "\nhelp: {}", help)?;
        }

        Ok(())
    }
}

/// Specific kinds of type-check errors
#[derive(Debug, Clone, PartialEq)]
pub enum TypeCheckErrorKind {
    /// Wrong number of arguments in a call
    Arity {
        function: &'static str,
        min: usize,
        max: usize,
        found: usize,
    },
    /// Argument that must be a string literal is not one
    NeedLiteral {
        function: &'static str,
        argument: usize,
    },
    /// Argument of a type the function cannot convert
    DataConversion {
        function: &'static str,
        found: Type,
        expected: &'static str,
    },
    /// Cast target is not a class name
    BadCastTarget { class: EcoString },
    /// No operator signature accepts the operand types
    MissingOperator {
        operator: &'static str,
        operands: Vec<Type>,
    },
    /// Reference to a name bound nowhere
    UndefinedReference { name: QName },
    /// Reference to a global whose own definition reads it
    CircularReference { name: QName },
    /// A value that cannot be converted to the type its consumer needs
    TypeMismatch { expected: Type, found: Type },
    /// A template whose match expression is not a pattern
    NotAPattern,
}

impl TypeCheckError {
    pub fn new(kind: TypeCheckErrorKind, node: ExprId, span: Span) -> Self {
        Self {
            kind,
            node,
            span,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, span: Span, message: impl Into<String>) -> Self {
        self.context.push(RelatedInfo {
            span,
            message: message.into(),
        });
        self
    }

    /// Stable error code, for documentation lookup
    pub fn code(&self) -> &'static str {
        match &self.kind {
            TypeCheckErrorKind::Arity { .. } => "E001",
            TypeCheckErrorKind::NeedLiteral { .. } => "E002",
            TypeCheckErrorKind::DataConversion { .. } => "E003",
            TypeCheckErrorKind::BadCastTarget { .. } => "E004",
            TypeCheckErrorKind::MissingOperator { .. } => "E005",
            TypeCheckErrorKind::UndefinedReference { .. } => "E006",
            TypeCheckErrorKind::CircularReference { .. } => "E007",
            TypeCheckErrorKind::TypeMismatch { .. } => "E008",
            TypeCheckErrorKind::NotAPattern => "E009",
        }
    }

    /// Convert to a Diagnostic for API boundary
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (message, help) = match &self.kind {
            TypeCheckErrorKind::Arity {
                function,
                min,
                max,
                found,
            } => {
                let expected = if min == max {
                    format!("{}", min)
                } else {
                    format!("{} to {}", min, max)
                };
                (
                    format!(
                        "{}() takes {} argument(s), found {}",
                        function, expected, found
                    ),
                    None,
                )
            }
            TypeCheckErrorKind::NeedLiteral { function, argument } => (
                format!(
                    "argument {} of {}() must be a string literal",
                    argument + 1,
                    function
                ),
                Some("The value is needed while compiling"),
            ),
            TypeCheckErrorKind::DataConversion {
                function,
                found,
                expected,
            } => (
                format!(
                    "{}() cannot convert an argument of type {} to {}",
                    function, found, expected
                ),
                None,
            ),
            TypeCheckErrorKind::BadCastTarget { class } => (
                format!("'{}' is not a valid class name", class),
                Some("Class names are dot-separated identifiers, e.g. 'org.example.Counter'"),
            ),
            TypeCheckErrorKind::MissingOperator { operator, operands } => {
                let operands: Vec<String> = operands.iter().map(|t| t.to_string()).collect();
                (
                    format!(
                        "operator '{}' is not defined for ({})",
                        operator,
                        operands.join(", ")
                    ),
                    None,
                )
            }
            TypeCheckErrorKind::UndefinedReference { name } => (
                format!("variable or parameter '{}' is undefined", name),
                Some("Make sure the variable is declared before use"),
            ),
            TypeCheckErrorKind::CircularReference { name } => (
                format!("circular reference to variable or parameter '{}'", name),
                Some("A global cannot depend on its own value"),
            ),
            TypeCheckErrorKind::TypeMismatch { expected, found } => (
                format!("cannot convert {} to {}", found, expected),
                None,
            ),
            TypeCheckErrorKind::NotAPattern => (
                "template match must be a pattern".to_string(),
                None,
            ),
        };

        Diagnostic::error(message, self.span.clone())
            .with_code(self.code())
            .with_help(help)
            .with_related(self.context.clone())
    }
}
