use super::*;
use crate::{
    QName,
    ast::{Binding, BindingKind, BindingSite, ExprId, ExprKind, RefState},
    program::{Program, TopLevelId},
    syntax::{Axis, BinaryOp, NodeKind, NodeTest},
    test_utils::init_test_logging,
    types::Type,
};
use pretty_assertions::assert_eq;

fn check(program: &mut Program) -> Vec<TypeCheckError> {
    init_test_logging();
    match check_program(program, None) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    }
}

fn codes(errors: &[TypeCheckError]) -> Vec<&'static str> {
    errors.iter().map(TypeCheckError::code).collect()
}

/// A global parameter of static type `reference`.
fn reference_param(program: &mut Program, name: &str) -> TopLevelId {
    let ast = program.ast_mut();
    let test = ast.boolean(true);
    let int = ast.int(1);
    let string = ast.string("a");
    let value = ast.if_then_else(test, int, string);
    program.add_parameter(QName::local(name), value).unwrap()
}

// ============================================================================
// Coercions
// ============================================================================

#[test]
fn test_int_operand_widened_to_real() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let one = ast.int(1);
    let half = ast.real(0.5);
    let sum = ast.binary(BinaryOp::Add, one, half);
    program.add_variable(QName::local("x"), sum).unwrap();

    assert_eq!(check(&mut program), vec![]);

    let ast = program.ast();
    assert_eq!(ast.ty(sum), Some(&Type::Real));
    let ExprKind::Binary { left, right, .. } = ast.kind(sum) else {
        panic!("expected a binary node");
    };
    assert_eq!(ast.kind(*left), &ExprKind::Convert { operand: one });
    assert_eq!(ast.ty(*left), Some(&Type::Real));
    assert_eq!(*right, half);
}

#[test]
fn test_logical_operands_coerced_to_boolean() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let name = ast.string("abc");
    let zero = ast.int(0);
    let and = ast.and(name, zero);
    program.add_variable(QName::local("x"), and).unwrap();

    assert_eq!(check(&mut program), vec![]);

    let ast = program.ast();
    for child in ast.kind(and).children() {
        assert_eq!(ast.ty(child), Some(&Type::Boolean));
        assert!(matches!(ast.kind(child), ExprKind::Convert { .. }));
    }
}

#[test]
fn test_conditional_branches_joined() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let test = ast.boolean(true);
    let int = ast.int(1);
    let real = ast.real(2.0);
    let numeric = ast.if_then_else(test, int, real);
    let test = ast.boolean(false);
    let int = ast.int(1);
    let string = ast.string("one");
    let mixed = ast.if_then_else(test, int, string);
    program.add_variable(QName::local("numeric"), numeric).unwrap();
    program.add_variable(QName::local("mixed"), mixed).unwrap();

    assert_eq!(check(&mut program), vec![]);
    assert_eq!(program.ast().ty(numeric), Some(&Type::Real));
    assert_eq!(program.ast().ty(mixed), Some(&Type::Reference));
}

#[test]
fn test_step_base_converted_to_node_set() {
    let mut program = Program::new();
    reference_param(&mut program, "nodes");
    let ast = program.ast_mut();
    let base = ast.reference(QName::local("nodes"));
    let step = ast.step(Axis::Child, NodeTest::Wildcard, Some(base));
    program.add_variable(QName::local("children"), step).unwrap();

    assert_eq!(check(&mut program), vec![]);
    let ast = program.ast();
    assert_eq!(ast.ty(step), Some(&Type::NodeSet));
    let ExprKind::Step { base: Some(base), .. } = ast.kind(step) else {
        panic!("expected a step with a base");
    };
    assert_eq!(ast.ty(*base), Some(&Type::NodeSet));
}

#[test]
fn test_missing_operator() {
    let mut program = Program::new();
    reference_param(&mut program, "r");
    let ast = program.ast_mut();
    let class = ast.string("org.example.Counter");
    let value = ast.reference(QName::local("r"));
    let cast = ast.call("cast", [class, value]).unwrap();
    let negated = ast.neg(cast);
    program.add_variable(QName::local("x"), negated).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E005"]);
    assert_eq!(errors[0].node, negated);
    assert_eq!(
        errors[0].kind,
        TypeCheckErrorKind::MissingOperator {
            operator: "-",
            operands: vec![Type::Object("org.example.Counter".into())],
        }
    );
}

// ============================================================================
// References
// ============================================================================

#[test]
fn test_undefined_reference_reported_once() {
    init_test_logging();
    let mut program = Program::new();
    let reference = program.ast_mut().reference(QName::local("missing"));
    program.add_variable(QName::local("x"), reference).unwrap();

    let mut checker = Checker::new(&mut program);
    checker.check_program();
    assert_eq!(checker.check(reference), Err(Reported));
    assert_eq!(checker.check(reference), Err(Reported));
    assert_eq!(codes(checker.errors()), vec!["E006"]);
    drop(checker);

    assert!(matches!(
        program.ast().kind(reference),
        ExprKind::UnresolvedRef {
            state: RefState::Failed,
            ..
        }
    ));
}

#[test]
fn test_global_reference_resolved() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let one = ast.int(1);
    let reference = ast.reference(QName::local("a"));
    let b_value = ast.neg(reference);
    let b = program.add_variable(QName::local("b"), b_value).unwrap();
    let a = program.add_variable(QName::local("a"), one).unwrap();

    assert_eq!(check(&mut program), vec![]);

    let ast = program.ast();
    let ExprKind::UnresolvedRef {
        state: RefState::Resolved(target),
        ..
    } = ast.kind(reference)
    else {
        panic!("reference not resolved: {:?}", ast.kind(reference));
    };
    assert_eq!(
        ast.kind(*target),
        &ExprKind::VariableRef {
            name: QName::local("a"),
            binding: Binding {
                kind: BindingKind::Variable,
                site: BindingSite::Global(a),
            },
        }
    );
    assert_eq!(ast.ty(*target), Some(&Type::Int));
    assert_eq!(ast.unwrap(reference), *target);

    // Edge from the referencing construct to the defining one, and an
    // initializer order that honors it.
    assert!(program.dependencies().contains(b, a));
    assert_eq!(program.global_order(), vec![a, b]);
}

#[test]
fn test_parameter_reference_resolved() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let default = ast.string("en");
    let reference = ast.reference(QName::local("lang"));
    let param = program.add_parameter(QName::local("lang"), default).unwrap();
    program.add_variable(QName::local("copy"), reference).unwrap();

    assert_eq!(check(&mut program), vec![]);
    let ast = program.ast();
    assert!(matches!(
        ast.kind(ast.unwrap(reference)),
        ExprKind::ParamRef {
            binding: Binding {
                kind: BindingKind::Parameter,
                site: BindingSite::Global(id),
            },
            ..
        } if *id == param
    ));
    // The default is a string, but a supplied value may be anything.
    assert_eq!(ast.ty(default), Some(&Type::String));
    assert_eq!(ast.ty(reference), Some(&Type::Reference));
}

#[test]
fn test_parameter_reader_gets_conversion() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let default = ast.string("x");
    let reference = ast.reference(QName::local("p"));
    let prefix = ast.string("4");
    let call = ast.call("starts-with", [reference, prefix]).unwrap();
    program.add_parameter(QName::local("p"), default).unwrap();
    program.add_variable(QName::local("v"), call).unwrap();

    assert_eq!(check(&mut program), vec![]);
    let ast = program.ast();
    let ExprKind::Call(call) = ast.kind(call) else {
        panic!("expected a call");
    };
    let wrapper = call.args[0];
    assert!(matches!(ast.kind(wrapper), ExprKind::Convert { operand } if *operand == reference));
    assert_eq!(ast.ty(wrapper), Some(&Type::String));
}

#[test]
fn test_self_reference_is_circular() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let reference = ast.reference(QName::local("a"));
    let one = ast.int(1);
    let sum = ast.binary(BinaryOp::Add, reference, one);
    program.add_variable(QName::local("a"), sum).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E007"]);
    assert_eq!(errors[0].node, reference);
    assert_eq!(errors[0].context.len(), 1);
}

#[test]
fn test_mutual_reference_is_circular() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let to_b = ast.reference(QName::local("b"));
    let to_a = ast.reference(QName::local("a"));
    program.add_variable(QName::local("a"), to_b).unwrap();
    program.add_variable(QName::local("b"), to_a).unwrap();

    let errors = check(&mut program);
    // Reported where the cycle closes, not again on the way back out.
    assert_eq!(codes(&errors), vec!["E007"]);
    assert_eq!(errors[0].node, to_a);
}

#[test]
fn test_let_binding_scope() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let two = ast.int(2);
    let x = ast.reference(QName::local("x"));
    let body = ast.binary(BinaryOp::Mul, x, two);
    let value = ast.int(21);
    let binding = ast.let_variable(QName::local("x"), value, body);
    program.add_variable(QName::local("answer"), binding).unwrap();

    assert_eq!(check(&mut program), vec![]);
    let ast = program.ast();
    assert_eq!(ast.ty(binding), Some(&Type::Int));
    assert!(matches!(
        ast.kind(ast.unwrap(x)),
        ExprKind::VariableRef {
            binding: Binding {
                site: BindingSite::Local(site),
                ..
            },
            ..
        } if *site == binding
    ));
}

#[test]
fn test_let_value_cannot_see_its_own_binding() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let inner = ast.reference(QName::local("x"));
    let body = ast.int(0);
    let binding = ast.let_variable(QName::local("x"), inner, body);
    program.add_variable(QName::local("y"), binding).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E006"]);
    assert_eq!(errors[0].node, inner);
}

#[test]
fn test_local_shadows_global() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let global_value = ast.string("global");
    let x = ast.reference(QName::local("x"));
    let local_value = ast.int(1);
    let binding = ast.let_variable(QName::local("x"), local_value, x);
    let global = program.add_variable(QName::local("x"), global_value).unwrap();
    let user = program.add_variable(QName::local("y"), binding).unwrap();

    assert_eq!(check(&mut program), vec![]);
    assert_eq!(program.ast().ty(binding), Some(&Type::Int));
    assert!(!program.dependencies().contains(user, global));
}

// ============================================================================
// Built-in functions
// ============================================================================

#[test]
fn test_cast_requires_literal_class() {
    let mut program = Program::new();
    reference_param(&mut program, "r");
    let ast = program.ast_mut();
    let a = ast.string("org.");
    let b = ast.string("Counter");
    let class = ast.binary(BinaryOp::Eq, a, b);
    let value = ast.reference(QName::local("r"));
    let cast = ast.call("cast", [class, value]).unwrap();
    program.add_variable(QName::local("x"), cast).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E002"]);
    assert_eq!(errors[0].node, class);
}

#[test]
fn test_cast_rejects_non_reference_value() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let class = ast.string("org.example.Counter");
    let value = ast.int(1);
    let cast = ast.call("cast", [class, value]).unwrap();
    program.add_variable(QName::local("x"), cast).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E003"]);
    assert_eq!(errors[0].node, value);
}

#[test]
fn test_cast_rejects_bad_class_name() {
    let mut program = Program::new();
    reference_param(&mut program, "r");
    let ast = program.ast_mut();
    let class = ast.string("not a class");
    let value = ast.reference(QName::local("r"));
    let cast = ast.call("cast", [class, value]).unwrap();
    program.add_variable(QName::local("x"), cast).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E004"]);
    assert_eq!(errors[0].node, class);
}

#[test]
fn test_cast_result_type() {
    let mut program = Program::new();
    reference_param(&mut program, "r");
    let ast = program.ast_mut();
    let class = ast.string("org.example.Counter");
    let value = ast.reference(QName::local("r"));
    let cast = ast.call("cast", [class, value]).unwrap();
    program.add_variable(QName::local("x"), cast).unwrap();

    assert_eq!(check(&mut program), vec![]);
    assert_eq!(
        program.ast().ty(cast),
        Some(&Type::Object("org.example.Counter".into()))
    );
}

#[test]
fn test_arity_errors() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let only = ast.string("abc");
    let starts_with = ast.call("starts-with", [only]).unwrap();
    let one = ast.int(1);
    let last = ast.call("last", [one]).unwrap();
    program.add_variable(QName::local("a"), starts_with).unwrap();
    program.add_variable(QName::local("b"), last).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E001", "E001"]);
    assert_eq!(
        errors[0].kind,
        TypeCheckErrorKind::Arity {
            function: "starts-with",
            min: 2,
            max: 2,
            found: 1,
        }
    );
}

#[test]
fn test_available_literal_checked_despite_arity() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let first = ast.int(1);
    let second = ast.string("xsl:if");
    let call = ast.call("element-available", [first, second]).unwrap();
    program.add_variable(QName::local("a"), call).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E002", "E001"]);
    assert_eq!(errors[0].node, first);
    assert_eq!(errors[1].node, call);
}

#[test]
fn test_element_available_folds() {
    let mut program = Program::new();
    program.declare_namespace("xsl", XSLT_NAMESPACE);
    let ast = program.ast_mut();
    let known = ast.string("xsl:for-each");
    let known = ast.call("element-available", [known]).unwrap();
    let unknown = ast.string("xsl:frobnicate");
    let unknown = ast.call("element-available", [unknown]).unwrap();
    let unbound = ast.string("ext:thing");
    let unbound = ast.call("function-available", [unbound]).unwrap();
    let function = ast.string("concat");
    let function = ast.call("function-available", [function]).unwrap();
    let test = ast.and(known, unknown);
    let test = ast.or(test, unbound);
    let test = ast.or(test, function);
    program.add_variable(QName::local("x"), test).unwrap();

    assert_eq!(check(&mut program), vec![]);
    let folded = |id: ExprId| match program.ast().kind(id) {
        ExprKind::Call(call) => call.folded,
        _ => None,
    };
    assert_eq!(folded(known), Some(true));
    assert_eq!(folded(unknown), Some(false));
    assert_eq!(folded(unbound), Some(false));
    assert_eq!(folded(function), Some(true));
}

#[test]
fn test_dead_branch_still_checked() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let name = ast.string("xsl:frobnicate");
    let test = ast.call("element-available", [name]).unwrap();
    let broken = ast.reference(QName::local("nowhere"));
    let fallback = ast.string("fallback");
    let conditional = ast.if_then_else(test, broken, fallback);
    program.add_variable(QName::local("x"), conditional).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E006"]);
    assert_eq!(errors[0].node, broken);
}

#[test]
fn test_generate_id_argument() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let nodes = ast.step(Axis::Child, NodeTest::Wildcard, None);
    let ok = ast.call("generate-id", [nodes]).unwrap();
    let number = ast.int(3);
    let bad = ast.call("generate-id", [number]).unwrap();
    let implicit = ast.call("generate-id", []).unwrap();
    program.add_variable(QName::local("ok"), ok).unwrap();
    program.add_variable(QName::local("bad"), bad).unwrap();
    program.add_variable(QName::local("implicit"), implicit).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E003"]);
    assert_eq!(errors[0].node, number);
    assert_eq!(program.ast().ty(ok), Some(&Type::String));
    assert_eq!(program.ast().ty(implicit), Some(&Type::String));
}

#[test]
fn test_string_functions_coerce_arguments() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let number = ast.int(42);
    let prefix = ast.string("4");
    let call = ast.call("starts-with", [number, prefix]).unwrap();
    program.add_variable(QName::local("x"), call).unwrap();

    assert_eq!(check(&mut program), vec![]);
    let ast = program.ast();
    let ExprKind::Call(call) = ast.kind(call) else {
        panic!("expected a call");
    };
    assert_eq!(ast.kind(call.args[0]), &ExprKind::Convert { operand: number });
    assert_eq!(call.args[1], prefix);
}

// ============================================================================
// Templates and patterns
// ============================================================================

#[test]
fn test_pattern_predicates() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let index = ast.int(2);
    let attribute = ast.step(Axis::Attribute, NodeTest::Wildcard, None);
    let pattern = ast.pattern_step(
        Axis::Child,
        NodeTest::Name(QName::local("item")),
        [index, attribute],
    );
    let body = ast.string("matched");
    program.add_template(pattern, body, None).unwrap();

    assert_eq!(check(&mut program), vec![]);
    let ast = program.ast();
    assert_eq!(ast.ty(pattern), Some(&Type::Boolean));
    let children = ast.kind(pattern).children();
    assert_eq!(children[0], index);
    assert_eq!(ast.ty(children[0]), Some(&Type::Int));
    assert_eq!(ast.kind(children[1]), &ExprKind::Convert { operand: attribute });
    assert_eq!(ast.ty(children[1]), Some(&Type::Boolean));
}

#[test]
fn test_template_match_must_be_pattern() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let not_a_pattern = ast.boolean(true);
    let body = ast.int(1);
    program.add_template(not_a_pattern, body, None).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E009"]);
}

#[test]
fn test_errors_aggregated_across_constructs() {
    let mut program = Program::new();
    let ast = program.ast_mut();
    let a = ast.reference(QName::local("nope"));
    let b = ast.call("lang", []).unwrap();
    let text = ast.pattern_step(Axis::Child, NodeTest::Kind(NodeKind::Text), []);
    let body = ast.reference(QName::local("also-nope"));
    program.add_variable(QName::local("a"), a).unwrap();
    program.add_variable(QName::local("b"), b).unwrap();
    program.add_template(text, body, None).unwrap();

    let errors = check(&mut program);
    assert_eq!(codes(&errors), vec!["E006", "E001", "E006"]);
}

#[test]
fn test_max_errors_stops_early() {
    init_test_logging();
    let mut program = Program::new();
    let ast = program.ast_mut();
    let a = ast.reference(QName::local("nope"));
    let b = ast.reference(QName::local("still-nope"));
    program.add_variable(QName::local("a"), a).unwrap();
    program.add_variable(QName::local("b"), b).unwrap();

    let errors = check_program(&mut program, Some(1)).unwrap_err();
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_zero_max_errors_means_no_limit() {
    init_test_logging();
    let mut program = Program::new();
    let ast = program.ast_mut();
    let one = ast.int(1);
    let missing = ast.reference(QName::local("nope"));
    program.add_variable(QName::local("a"), one).unwrap();
    program.add_variable(QName::local("b"), missing).unwrap();

    let errors = check_program(&mut program, Some(0)).unwrap_err();
    assert_eq!(codes(&errors), vec!["E006"]);
    assert_eq!(program.ast().ty(one), Some(&Type::Int));
}
