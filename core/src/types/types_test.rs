use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_identity_costs_nothing() {
    for ty in [Type::Boolean, Type::Int, Type::Real, Type::String, Type::NodeSet] {
        assert_eq!(ty.coercion_distance(&ty), Some(0));
    }
}

#[test]
fn test_void_never_converts() {
    assert_eq!(Type::Void.coercion_distance(&Type::Reference), None);
    assert_eq!(Type::Int.coercion_distance(&Type::Void), None);
}

#[test]
fn test_objects_only_reach_reference_and_string() {
    let class = Type::Object("org.example.Counter".into());
    assert!(class.can_coerce_to(&Type::Reference));
    assert!(class.can_coerce_to(&Type::String));
    assert!(!class.can_coerce_to(&Type::Real));
    assert!(!class.can_coerce_to(&Type::Object("other".into())));
}

#[test]
fn test_join() {
    assert_eq!(Type::Int.join(&Type::Int), Type::Int);
    assert_eq!(Type::Int.join(&Type::Real), Type::Real);
    assert_eq!(Type::String.join(&Type::NodeSet), Type::Reference);
}

#[test]
fn test_integer_addition_stays_integer() {
    let found = lookup_operator("+", &[Type::Int, Type::Int]).unwrap();
    assert_eq!(found.result, Type::Int);
    assert_eq!(found.operands.as_slice(), &[Type::Int, Type::Int]);
}

#[test]
fn test_mixed_arithmetic_widens_to_real() {
    let found = lookup_operator("+", &[Type::Int, Type::Real]).unwrap();
    assert_eq!(found.result, Type::Real);
    assert!(found.needs_coercion(0, &Type::Int));
    assert!(!found.needs_coercion(1, &Type::Real));
}

#[test]
fn test_division_is_always_real() {
    let found = lookup_operator("div", &[Type::Int, Type::Int]).unwrap();
    assert_eq!(found.result, Type::Real);
}

#[test]
fn test_node_set_equality_compares_strings() {
    let found = lookup_operator("=", &[Type::NodeSet, Type::String]).unwrap();
    assert_eq!(found.operands[0], Type::String);
    assert_eq!(found.result, Type::Boolean);
}

#[test]
fn test_number_against_string_compares_numbers() {
    let found = lookup_operator("=", &[Type::Int, Type::String]).unwrap();
    assert_eq!(found.operands[0], Type::Real);
    assert_eq!(found.operands[1], Type::Real);
}

#[test]
fn test_missing_operator() {
    let object = Type::Object("org.example.Counter".into());
    assert_eq!(lookup_operator("+", &[object.clone(), Type::Int]), None);
    assert_eq!(lookup_operator("-", &[object]), None);
    assert_eq!(lookup_operator("**", &[Type::Int, Type::Int]), None);
}

#[test]
fn test_unary_minus_on_string_uses_real() {
    let found = lookup_operator("-", &[Type::String]).unwrap();
    assert_eq!(found.result, Type::Real);
}
