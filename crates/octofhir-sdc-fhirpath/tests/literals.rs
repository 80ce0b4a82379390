//! Tests for parsing FHIRPath literal values

use octofhir_sdc_fhirpath::{parse_expression, Expression, Literal, UnaryOp};
use rust_decimal::Decimal;
use std::str::FromStr;

fn parse_expr(input: &str) -> Expression {
    parse_expression(input).unwrap_or_else(|e| panic!("Failed to parse '{input}': {e:?}"))
}

fn assert_literal(expr: &Expression) -> &Literal {
    match expr {
        Expression::Literal(literal) => literal,
        _ => panic!("Expected Literal, got: {expr:?}"),
    }
}

#[test]
fn test_integer() {
    let expr = parse_expr("42");
    assert!(matches!(assert_literal(&expr), Literal::Integer(42)));
}

#[test]
fn test_integer_negative() {
    // Negative is parsed as unary minus over the literal
    match parse_expr("-42") {
        Expression::UnaryOp { op, operand } => {
            assert_eq!(op, UnaryOp::Negate);
            assert!(matches!(assert_literal(&operand), Literal::Integer(42)));
        }
        other => panic!("Expected UnaryOp, got: {other:?}"),
    }
}

#[test]
fn test_decimal() {
    let expr = parse_expr("3.14");
    match assert_literal(&expr) {
        Literal::Decimal(d) => assert_eq!(*d, Decimal::from_str("3.14").unwrap()),
        other => panic!("Expected Decimal, got: {other:?}"),
    }
}

#[test]
fn test_string() {
    let expr = parse_expr("'hello'");
    match assert_literal(&expr) {
        Literal::String(s) => assert_eq!(s, "hello"),
        other => panic!("Expected String, got: {other:?}"),
    }
}

#[test]
fn test_string_with_escape() {
    let expr = parse_expr(r"'it\'s'");
    match assert_literal(&expr) {
        Literal::String(s) => assert_eq!(s, "it's"),
        other => panic!("Expected String, got: {other:?}"),
    }
}

#[test]
fn test_booleans() {
    assert!(matches!(
        assert_literal(&parse_expr("true")),
        Literal::Boolean(true)
    ));
    assert!(matches!(
        assert_literal(&parse_expr("false")),
        Literal::Boolean(false)
    ));
}

#[test]
fn test_empty_collection() {
    assert!(matches!(assert_literal(&parse_expr("{}")), Literal::Empty));
}

#[test]
fn test_date() {
    match assert_literal(&parse_expr("@2024-05-01")) {
        Literal::Date(d) => assert_eq!(d, "2024-05-01"),
        other => panic!("Expected Date, got: {other:?}"),
    }
}

#[test]
fn test_partial_date() {
    match assert_literal(&parse_expr("@2024-05")) {
        Literal::Date(d) => assert_eq!(d, "2024-05"),
        other => panic!("Expected Date, got: {other:?}"),
    }
}

#[test]
fn test_date_time() {
    match assert_literal(&parse_expr("@2024-05-01T10:30:00Z")) {
        Literal::DateTime(d) => assert_eq!(d, "2024-05-01T10:30:00Z"),
        other => panic!("Expected DateTime, got: {other:?}"),
    }
}

#[test]
fn test_time() {
    match assert_literal(&parse_expr("@T10:30")) {
        Literal::Time(t) => assert_eq!(t, "10:30"),
        other => panic!("Expected Time, got: {other:?}"),
    }
}

#[test]
fn test_quantity() {
    match assert_literal(&parse_expr("81 'kg'")) {
        Literal::Quantity(value, unit) => {
            assert_eq!(*value, Decimal::from(81));
            assert_eq!(unit, "kg");
        }
        other => panic!("Expected Quantity, got: {other:?}"),
    }
}

#[test]
fn test_external_constant() {
    match parse_expr("%patient") {
        Expression::ExternalConstant(name) => assert_eq!(name, "patient"),
        other => panic!("Expected ExternalConstant, got: {other:?}"),
    }
}

#[test]
fn test_trailing_garbage_rejected() {
    assert!(parse_expression("1 2").is_err());
}

#[test]
fn test_unclosed_string_rejected() {
    assert!(parse_expression("'abc").is_err());
}
