//! Evaluation tests for the function library

use octofhir_sdc_fhirpath::{EvaluationContext, FhirPathEngine, FhirPathError, Value};
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

fn eval(expression: &str, resource: serde_json::Value) -> Vec<Value> {
    let mut engine = FhirPathEngine::new();
    let context = EvaluationContext::new(resource);
    engine
        .evaluate(expression, &context)
        .unwrap_or_else(|e| panic!("Failed to evaluate '{expression}': {e:?}"))
        .into_vec()
}

fn eval_empty_resource(expression: &str) -> Vec<Value> {
    eval(expression, json!({}))
}

#[test]
fn test_exists_and_empty() {
    let resource = json!({"item": [{"linkId": "a"}]});
    assert_eq!(
        eval("item.exists()", resource.clone()),
        vec![Value::Boolean(true)]
    );
    assert_eq!(
        eval("item.empty()", resource.clone()),
        vec![Value::Boolean(false)]
    );
    assert_eq!(
        eval("missing.exists()", resource.clone()),
        vec![Value::Boolean(false)]
    );
    assert_eq!(
        eval("item.exists(linkId = 'a')", resource),
        vec![Value::Boolean(true)]
    );
}

#[test]
fn test_count_first_last() {
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3).count()"),
        vec![Value::Integer(3)]
    );
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3).first()"),
        vec![Value::Integer(1)]
    );
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3).last()"),
        vec![Value::Integer(3)]
    );
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3).tail()"),
        vec![Value::Integer(2), Value::Integer(3)]
    );
}

#[test]
fn test_skip_take() {
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3 | 4).skip(1).take(2)"),
        vec![Value::Integer(2), Value::Integer(3)]
    );
}

#[test]
fn test_not() {
    assert_eq!(
        eval_empty_resource("(1 = 2).not()"),
        vec![Value::Boolean(true)]
    );
    assert_eq!(eval_empty_resource("{}.not()"), vec![]);
}

#[test]
fn test_iif() {
    assert_eq!(
        eval_empty_resource("iif(1 < 2, 'yes', 'no')"),
        vec![Value::String("yes".to_string())]
    );
    assert_eq!(
        eval_empty_resource("iif(1 > 2, 'yes', 'no')"),
        vec![Value::String("no".to_string())]
    );
    // Missing else branch evaluates to empty
    assert_eq!(eval_empty_resource("iif(1 > 2, 'yes')"), vec![]);
}

#[rstest]
#[case("(-3).abs()", 3)]
#[case("(3.7).floor()", 3)]
#[case("(3.2).ceiling()", 4)]
#[case("(3.9).truncate()", 3)]
fn test_math_to_integer(#[case] expression: &str, #[case] expected: i64) {
    assert_eq!(eval_empty_resource(expression), vec![Value::Integer(expected)]);
}

#[test]
fn test_power_and_sqrt() {
    assert_eq!(eval_empty_resource("(2).power(10)"), vec![Value::Integer(1024)]);
    assert_eq!(eval_empty_resource("(16).sqrt()"), vec![Value::Integer(4)]);
    assert_eq!(
        eval_empty_resource("(1.8).power(2)"),
        vec![Value::Decimal(Decimal::from_str("3.24").unwrap())]
    );
}

#[test]
fn test_round_half_away_from_zero() {
    assert_eq!(
        eval_empty_resource("(2.5).round()"),
        vec![Value::Decimal(Decimal::from(3))]
    );
    assert_eq!(
        eval_empty_resource("(27.7777).round(1)"),
        vec![Value::Decimal(Decimal::from_str("27.8").unwrap())]
    );
}

#[test]
fn test_aggregates() {
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3).sum()"),
        vec![Value::Integer(6)]
    );
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3).min()"),
        vec![Value::Integer(1)]
    );
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3).max()"),
        vec![Value::Integer(3)]
    );
    assert_eq!(
        eval_empty_resource("(1 | 2).avg()"),
        vec![Value::Decimal(Decimal::from_str("1.5").unwrap())]
    );
}

#[rstest]
#[case("'hello'.length()", Value::Integer(5))]
#[case("'hello'.upper()", Value::String("HELLO".to_string()))]
#[case("'HELLO'.lower()", Value::String("hello".to_string()))]
#[case("'hello'.startsWith('he')", Value::Boolean(true))]
#[case("'hello'.endsWith('lo')", Value::Boolean(true))]
#[case("'hello'.contains('ell')", Value::Boolean(true))]
#[case("'hello'.substring(1, 3)", Value::String("ell".to_string()))]
#[case("'a,b,c'.split(',').count()", Value::Integer(3))]
fn test_string_functions(#[case] expression: &str, #[case] expected: Value) {
    assert_eq!(eval_empty_resource(expression), vec![expected]);
}

#[test]
fn test_matches_and_replace() {
    assert_eq!(
        eval_empty_resource("'abc123'.matches('[0-9]+')"),
        vec![Value::Boolean(true)]
    );
    assert_eq!(
        eval_empty_resource("'abc123'.replaceMatches('[0-9]', 'x')"),
        vec![Value::String("abcxxx".to_string())]
    );
}

#[test]
fn test_conversions() {
    assert_eq!(
        eval_empty_resource("(42).toString()"),
        vec![Value::String("42".to_string())]
    );
    assert_eq!(
        eval_empty_resource("'42'.toInteger()"),
        vec![Value::Integer(42)]
    );
    assert_eq!(
        eval_empty_resource("'2.5'.toDecimal()"),
        vec![Value::Decimal(Decimal::from_str("2.5").unwrap())]
    );
    assert_eq!(
        eval_empty_resource("'true'.toBoolean()"),
        vec![Value::Boolean(true)]
    );
    assert_eq!(eval_empty_resource("'xyz'.toInteger()"), vec![]);
}

#[test]
fn test_select_projection() {
    let resource = json!({
        "item": [
            {"linkId": "a", "answer": [{"valueInteger": 1}]},
            {"linkId": "b", "answer": [{"valueInteger": 2}]}
        ]
    });
    assert_eq!(
        eval("item.select(answer.value + 10)", resource),
        vec![Value::Integer(11), Value::Integer(12)]
    );
}

#[test]
fn test_of_type() {
    assert_eq!(
        eval_empty_resource("(1 | 'a' | 2.5).ofType(Integer)"),
        vec![Value::Integer(1)]
    );
}

#[test]
fn test_unknown_function_is_an_error() {
    let mut engine = FhirPathEngine::new();
    let context = EvaluationContext::new(json!({}));
    let result = engine.evaluate("(1).frobnicate()", &context);
    assert!(matches!(
        result,
        Err(FhirPathError::UnknownFunction { .. })
    ));
}

#[test]
fn test_distinct() {
    assert_eq!(
        eval_empty_resource("(1 | 2).union(1).distinct().count()"),
        vec![Value::Integer(2)]
    );
}
