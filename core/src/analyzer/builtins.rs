//! Type rules of the built-in functions.

use tracing::trace;

use crate::{
    QName, Vec,
    analyzer::{CheckResult, Checker, Reported, TypeCheckErrorKind},
    ast::{Builtin, ExprId, ExprKind, FunctionCall, Literal},
    program::SymbolTable,
    types::Type,
};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// XSLT 1.0 instructions, for `element-available()`.
const XSLT_INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "number",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

/// Core XPath and XSLT functions, for `function-available()`.
const CORE_FUNCTIONS: &[&str] = &[
    "last",
    "position",
    "count",
    "id",
    "local-name",
    "namespace-uri",
    "name",
    "string",
    "concat",
    "starts-with",
    "contains",
    "substring-before",
    "substring-after",
    "substring",
    "string-length",
    "normalize-space",
    "translate",
    "boolean",
    "not",
    "true",
    "false",
    "lang",
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
    "document",
    "key",
    "format-number",
    "current",
    "unparsed-entity-uri",
    "generate-id",
    "system-property",
    "element-available",
    "function-available",
];

pub fn element_available(name: &QName) -> bool {
    name.namespace() == Some(XSLT_NAMESPACE) && XSLT_INSTRUCTIONS.contains(&name.local_part())
}

pub fn function_available(name: &QName) -> bool {
    name.namespace().is_none()
        && (CORE_FUNCTIONS.contains(&name.local_part())
            || Builtin::from_name(name.local_part()).is_some())
}

/// A dot-separated sequence of identifiers, such as `org.example.Counter`.
pub fn is_class_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|first| first.is_alphabetic() || first == '_' || first == '$')
                && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
}

impl Checker<'_> {
    fn string_literal(&self, id: ExprId) -> Option<ecow::EcoString> {
        match self.program.ast.kind(id) {
            ExprKind::Literal(Literal::String(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Check every argument, then coerce them all to `target`.
    fn coerce_args(&mut self, args: &[ExprId], target: &Type) -> Result<(), Reported> {
        let mut failed = false;
        for arg in args {
            failed |= self.check(*arg).is_err();
        }
        if failed {
            return Err(Reported);
        }
        for arg in args {
            failed |= self.coerce(*arg, target).is_err();
        }
        if failed { Err(Reported) } else { Ok(()) }
    }

    pub(crate) fn check_call(&mut self, id: ExprId, call: FunctionCall) -> CheckResult {
        let builtin = call.builtin;
        let args: Vec<ExprId> = call.args.iter().copied().collect();
        trace!(function = builtin.name(), args = args.len(), "Checking call");

        let arity = builtin.arity();
        if !arity.contains(&args.len()) {
            for arg in &args {
                let _ = self.check(*arg);
            }
            if builtin.requires_literal() {
                if let Some(first) = args.first() {
                    let _ = self.require_literal(builtin, *first, 0);
                }
            }
            return Err(self.error(
                id,
                TypeCheckErrorKind::Arity {
                    function: builtin.name(),
                    min: *arity.start(),
                    max: *arity.end(),
                    found: args.len(),
                },
            ));
        }

        match builtin {
            Builtin::Boolean | Builtin::Not => {
                self.coerce_args(&args, &Type::Boolean)?;
                Ok(Type::Boolean)
            }
            Builtin::StartsWith => {
                self.coerce_args(&args, &Type::String)?;
                Ok(Type::Boolean)
            }
            Builtin::Lang => {
                self.coerce_args(&args, &Type::String)?;
                Ok(Type::Boolean)
            }
            Builtin::UnparsedEntityUri => {
                self.coerce_args(&args, &Type::String)?;
                Ok(Type::String)
            }
            Builtin::GenerateId => {
                if let Some(arg) = args.first() {
                    match self.check(*arg)? {
                        Type::Node | Type::NodeSet => {}
                        Type::Reference => {
                            self.coerce(*arg, &Type::NodeSet)?;
                        }
                        found => {
                            return Err(self.error(
                                *arg,
                                TypeCheckErrorKind::DataConversion {
                                    function: builtin.name(),
                                    found,
                                    expected: "node-set",
                                },
                            ));
                        }
                    }
                }
                Ok(Type::String)
            }
            Builtin::ElementAvailable | Builtin::FunctionAvailable => {
                self.check(args[0])?;
                let lexical = self.require_literal(builtin, args[0], 0)?;
                let program = &*self.program;
                let available = match QName::parse(&lexical, |prefix| program.lookup_namespace(prefix)) {
                    Some(name) if builtin == Builtin::ElementAvailable => element_available(&name),
                    Some(name) => function_available(&name),
                    // A malformed name or an unbound prefix names nothing this
                    // processor knows.
                    None => false,
                };
                trace!(function = builtin.name(), %lexical, available, "Folded");
                if let ExprKind::Call(call) = &mut self.program.ast.node_mut(id).kind {
                    call.folded = Some(available);
                }
                Ok(Type::Boolean)
            }
            Builtin::Cast => self.check_cast(builtin, args[0], args[1]),
            Builtin::Last | Builtin::Position => Ok(Type::Int),
        }
    }

    fn require_literal(&mut self, builtin: Builtin, arg: ExprId, index: usize) -> Result<ecow::EcoString, Reported> {
        self.string_literal(arg).ok_or_else(|| {
            self.error(
                arg,
                TypeCheckErrorKind::NeedLiteral {
                    function: builtin.name(),
                    argument: index,
                },
            )
        })
    }

    fn check_cast(&mut self, builtin: Builtin, class_arg: ExprId, value_arg: ExprId) -> CheckResult {
        let class_ty = self.check(class_arg);
        let value_ty = self.check(value_arg);

        let class = class_ty.and_then(|_| self.require_literal(builtin, class_arg, 0));
        let value_ok = match value_ty {
            Ok(Type::Reference | Type::Object(_)) => true,
            Ok(found) => {
                self.error(
                    value_arg,
                    TypeCheckErrorKind::DataConversion {
                        function: builtin.name(),
                        found,
                        expected: "reference",
                    },
                );
                false
            }
            Err(Reported) => false,
        };

        let class = class?;
        if !is_class_name(&class) {
            return Err(self.error(class_arg, TypeCheckErrorKind::BadCastTarget { class }));
        }
        if !value_ok {
            return Err(Reported);
        }
        Ok(Type::Object(class))
    }
}
