//! Evaluation tests for operators and navigation

use octofhir_sdc_fhirpath::{EvaluationContext, FhirPathEngine, Value};
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

#[rstest]
#[case("1 + 2", 3)]
#[case("7 - 3", 4)]
#[case("6 * 7", 42)]
#[case("7 div 2", 3)]
#[case("7 mod 2", 1)]
fn test_integer_arithmetic(#[case] expression: &str, #[case] expected: i64) {
    assert_eq!(eval_empty_resource(expression), vec![Value::Integer(expected)]);
}

#[test]
fn test_division_always_decimal() {
    assert_eq!(
        eval_empty_resource("7 / 2"),
        vec![Value::Decimal(Decimal::from_str("3.5").unwrap())]
    );
}

#[test]
fn test_division_by_zero_is_empty() {
    assert_eq!(eval_empty_resource("1 / 0"), vec![]);
    assert_eq!(eval_empty_resource("1 div 0"), vec![]);
}

#[test]
fn test_empty_operand_propagates() {
    assert_eq!(eval_empty_resource("{} + 1"), vec![]);
    assert_eq!(eval_empty_resource("1 > {}"), vec![]);
}

#[rstest]
#[case("1 < 2", true)]
#[case("2 <= 2", true)]
#[case("3 > 4", false)]
#[case("4 >= 5", false)]
#[case("'abc' < 'abd'", true)]
fn test_comparisons(#[case] expression: &str, #[case] expected: bool) {
    assert_eq!(eval_empty_resource(expression), vec![Value::Boolean(expected)]);
}

#[rstest]
#[case("1 = 1", true)]
#[case("1 = 2", false)]
#[case("1 != 2", true)]
#[case("'a' = 'a'", true)]
#[case("'A' ~ 'a'", true)]
#[case("'A' !~ 'b'", true)]
fn test_equality(#[case] expression: &str, #[case] expected: bool) {
    assert_eq!(eval_empty_resource(expression), vec![Value::Boolean(expected)]);
}

#[test]
fn test_integer_equals_decimal() {
    assert_eq!(eval_empty_resource("1 = 1.0"), vec![Value::Boolean(true)]);
}

#[rstest]
#[case("true and true", Some(true))]
#[case("true and false", Some(false))]
#[case("false and {}", Some(false))]
#[case("true and {}", None)]
#[case("true or {}", Some(true))]
#[case("false or false", Some(false))]
#[case("false or {}", None)]
#[case("true xor false", Some(true))]
#[case("false implies false", Some(true))]
#[case("true implies false", Some(false))]
fn test_three_valued_logic(#[case] expression: &str, #[case] expected: Option<bool>) {
    let expected: Vec<Value> = expected.map(Value::Boolean).into_iter().collect();
    assert_eq!(eval_empty_resource(expression), expected);
}

#[test]
fn test_string_concatenation() {
    assert_eq!(
        eval_empty_resource("'foo' + 'bar'"),
        vec![Value::String("foobar".to_string())]
    );
    // & treats empty as ''
    assert_eq!(
        eval_empty_resource("'foo' & {}"),
        vec![Value::String("foo".to_string())]
    );
}

#[test]
fn test_union_deduplicates() {
    assert_eq!(
        eval_empty_resource("(1 | 2) | 1"),
        vec![Value::Integer(1), Value::Integer(2)]
    );
}

#[test]
fn test_in_and_contains() {
    assert_eq!(
        eval_empty_resource("2 in (1 | 2 | 3)"),
        vec![Value::Boolean(true)]
    );
    assert_eq!(
        eval_empty_resource("(1 | 2 | 3) contains 4"),
        vec![Value::Boolean(false)]
    );
}

#[test]
fn test_navigation() {
    let resource = json!({
        "resourceType": "QuestionnaireResponse",
        "item": [
            {"linkId": "a", "answer": [{"valueInteger": 1}]},
            {"linkId": "b", "answer": [{"valueInteger": 2}]}
        ]
    });
    assert_eq!(
        eval("item.linkId", resource.clone()),
        vec![
            Value::String("a".to_string()),
            Value::String("b".to_string())
        ]
    );
    // Leading resource type name selects the resource itself
    assert_eq!(
        eval("QuestionnaireResponse.item.count()", resource.clone()),
        vec![Value::Integer(2)]
    );
    // Choice-type fallback: answer.value resolves valueInteger
    assert_eq!(
        eval("item.answer.value", resource),
        vec![Value::Integer(1), Value::Integer(2)]
    );
}

#[test]
fn test_indexer() {
    let resource = json!({"name": ["x", "y", "z"]});
    assert_eq!(
        eval("name[1]", resource.clone()),
        vec![Value::String("y".to_string())]
    );
    assert_eq!(eval("name[9]", resource), vec![]);
}

#[test]
fn test_where_filter() {
    let resource = json!({
        "item": [
            {"linkId": "a", "answer": [{"valueInteger": 10}]},
            {"linkId": "b", "answer": [{"valueInteger": 20}]}
        ]
    });
    assert_eq!(
        eval("item.where(linkId = 'b').answer.value", resource),
        vec![Value::Integer(20)]
    );
}

#[test]
fn test_variables() {
    let mut engine = FhirPathEngine::new();
    let mut context = EvaluationContext::new(json!({}));
    context.set_variable_json("age", &json!(70));
    let result = engine.evaluate("%age >= 65", &context).unwrap();
    assert_eq!(result.into_vec(), vec![Value::Boolean(true)]);
}

#[test]
fn test_unknown_variable_is_empty() {
    let mut engine = FhirPathEngine::new();
    let context = EvaluationContext::new(json!({}));
    let result = engine.evaluate("%missing.exists()", &context).unwrap();
    assert_eq!(result.into_vec(), vec![Value::Boolean(false)]);
}

#[test]
fn test_resource_constant() {
    let mut engine = FhirPathEngine::new();
    let context = EvaluationContext::new(json!({
        "resourceType": "Patient",
        "gender": "female"
    }));
    let result = engine.evaluate("%resource.gender", &context).unwrap();
    assert_eq!(
        result.into_vec(),
        vec![Value::String("female".to_string())]
    );
}
