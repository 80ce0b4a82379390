//! Polymorphic answer decoding and comparison semantics

use std::cmp::Ordering;

use octofhir_sdc_model::{AnswerValue, Coding, QuestionnaireResponseAnswer};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

fn answer_from(value: serde_json::Value) -> QuestionnaireResponseAnswer {
    serde_json::from_value(value).unwrap()
}

#[test]
fn decodes_the_populated_variant() {
    let answer = answer_from(json!({"valueInteger": 42}));
    assert_eq!(AnswerValue::from_wire(&answer), Some(AnswerValue::Integer(42)));

    let answer = answer_from(json!({"valueString": "hi"}));
    assert_eq!(
        AnswerValue::from_wire(&answer),
        Some(AnswerValue::String("hi".to_string()))
    );

    let answer = answer_from(json!({"valueCoding": {"system": "s", "code": "c"}}));
    match AnswerValue::from_wire(&answer) {
        Some(AnswerValue::Coding(coding)) => {
            assert_eq!(coding.code.as_deref(), Some("c"));
        }
        other => panic!("expected coding, got {other:?}"),
    }
}

#[test]
fn empty_answer_decodes_to_none() {
    let answer = answer_from(json!({}));
    assert_eq!(AnswerValue::from_wire(&answer), None);
}

#[test]
fn wire_encoding_sets_exactly_one_field() {
    let wire = AnswerValue::Boolean(true).to_wire();
    let encoded = serde_json::to_value(&wire).unwrap();
    assert_eq!(encoded, json!({"valueBoolean": true}));

    let wire = AnswerValue::Decimal(Decimal::from_str("27.8").unwrap()).to_wire();
    let encoded = serde_json::to_value(&wire).unwrap();
    assert_eq!(encoded, json!({"valueDecimal": 27.8}));
}

#[test]
fn date_time_answers_stay_literal() {
    let answer = answer_from(json!({"valueDate": "2024-05"}));
    assert_eq!(
        AnswerValue::from_wire(&answer),
        Some(AnswerValue::Date("2024-05".to_string()))
    );
}

#[test]
fn integer_and_decimal_compare_across_types() {
    let integer = AnswerValue::Integer(65);
    let decimal = AnswerValue::Decimal(Decimal::from(65));
    assert!(integer.matches(&decimal));
    assert_eq!(
        AnswerValue::Integer(70).compare(&decimal),
        Some(Ordering::Greater)
    );
}

#[test]
fn coding_matches_by_system_and_code() {
    let a = AnswerValue::Coding(Coding {
        system: Some("s".to_string()),
        code: Some("c".to_string()),
        display: Some("label ignored".to_string()),
        ..Coding::default()
    });
    let b = AnswerValue::Coding(Coding {
        system: Some("s".to_string()),
        code: Some("c".to_string()),
        ..Coding::default()
    });
    let c = AnswerValue::Coding(Coding {
        system: Some("other".to_string()),
        code: Some("c".to_string()),
        ..Coding::default()
    });
    assert!(a.matches(&b));
    assert!(!a.matches(&c));
}

#[test]
fn dates_compare_chronologically() {
    let earlier = AnswerValue::Date("2023-12-31".to_string());
    let later = AnswerValue::Date("2024-01-01".to_string());
    assert_eq!(earlier.compare(&later), Some(Ordering::Less));
}

#[test]
fn mismatched_types_do_not_compare() {
    let number = AnswerValue::Integer(1);
    let text = AnswerValue::String("1".to_string());
    assert_eq!(number.compare(&text), None);
    assert!(!number.matches(&text));
}
