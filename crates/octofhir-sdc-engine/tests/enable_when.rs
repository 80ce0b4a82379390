//! EnableWhen engine behavior

mod common;

use common::{age_questionnaire, build_store};
use octofhir_sdc_engine::{FormStore, SavePolicy};
use octofhir_sdc_model::AnswerValue;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn item_without_conditions_is_enabled() {
    let store = build_store(age_questionnaire());
    assert!(store.is_item_enabled("q-age"));
}

#[test]
fn age_scenario_enables_and_disables() {
    let mut store = build_store(age_questionnaire());

    // No answer yet: disabled
    assert!(!store.is_item_enabled("senior-note"));

    let change = store
        .update_item_answer("q-age", vec![AnswerValue::Integer(70)])
        .unwrap();
    assert!(store.is_item_enabled("senior-note"));
    assert_eq!(change.enable_when_changed, vec!["senior-note".to_string()]);

    let change = store
        .update_item_answer("q-age", vec![AnswerValue::Integer(40)])
        .unwrap();
    assert!(!store.is_item_enabled("senior-note"));
    assert_eq!(change.enable_when_changed, vec!["senior-note".to_string()]);

    // An unchanged-state update reports no enableWhen flips
    let change = store
        .update_item_answer("q-age", vec![AnswerValue::Integer(41)])
        .unwrap();
    assert!(change.enable_when_changed.is_empty());
}

fn behavior_questionnaire(behavior: &str) -> serde_json::Value {
    json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "q-age", "type": "integer"},
            {
                "linkId": "note",
                "type": "display",
                "enableBehavior": behavior,
                "enableWhen": [
                    {"question": "q-age", "operator": "<", "answerInteger": 5},
                    {"question": "q-age", "operator": ">", "answerInteger": 65}
                ]
            }
        ]
    })
}

#[test]
fn enable_behavior_any() {
    let mut store = build_store(behavior_questionnaire("any"));

    store
        .update_item_answer("q-age", vec![AnswerValue::Integer(4)])
        .unwrap();
    assert!(store.is_item_enabled("note"), "age < 5 satisfies first condition");

    store
        .update_item_answer("q-age", vec![AnswerValue::Integer(10)])
        .unwrap();
    assert!(!store.is_item_enabled("note"), "age 10 satisfies neither");

    store
        .update_item_answer("q-age", vec![AnswerValue::Integer(70)])
        .unwrap();
    assert!(store.is_item_enabled("note"), "age > 65 satisfies second condition");
}

#[test]
fn enable_behavior_all() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "q-a", "type": "boolean"},
            {"linkId": "q-b", "type": "boolean"},
            {
                "linkId": "both",
                "type": "display",
                "enableBehavior": "all",
                "enableWhen": [
                    {"question": "q-a", "operator": "=", "answerBoolean": true},
                    {"question": "q-b", "operator": "=", "answerBoolean": true}
                ]
            }
        ]
    });
    let mut store = build_store(questionnaire);

    store
        .update_item_answer("q-a", vec![AnswerValue::Boolean(true)])
        .unwrap();
    assert!(!store.is_item_enabled("both"), "only one condition satisfied");

    store
        .update_item_answer("q-b", vec![AnswerValue::Boolean(true)])
        .unwrap();
    assert!(store.is_item_enabled("both"), "both conditions satisfied");

    store
        .update_item_answer("q-a", vec![AnswerValue::Boolean(false)])
        .unwrap();
    assert!(!store.is_item_enabled("both"), "flipping either disables");
}

#[test]
fn exists_operator() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "q-name", "type": "string"},
            {
                "linkId": "greeting",
                "type": "display",
                "enableWhen": [
                    {"question": "q-name", "operator": "exists", "answerBoolean": true}
                ]
            }
        ]
    });
    let mut store = build_store(questionnaire);
    assert!(!store.is_item_enabled("greeting"));

    store
        .update_item_answer("q-name", vec![AnswerValue::String("Ada".into())])
        .unwrap();
    assert!(store.is_item_enabled("greeting"));

    store.update_item_answer("q-name", vec![]).unwrap();
    assert!(!store.is_item_enabled("greeting"));
}

fn smoker_questionnaire() -> serde_json::Value {
    json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "smoker", "type": "boolean"},
            {
                "linkId": "pack-years",
                "type": "integer",
                "enableWhen": [
                    {"question": "smoker", "operator": "=", "answerBoolean": true}
                ]
            }
        ]
    })
}

#[test]
fn disabled_answers_are_retained_but_stripped_on_final_save() {
    let mut store = build_store(smoker_questionnaire());

    store
        .update_item_answer("smoker", vec![AnswerValue::Boolean(true)])
        .unwrap();
    store
        .update_item_answer("pack-years", vec![AnswerValue::Integer(12)])
        .unwrap();
    assert!(store.is_item_enabled("pack-years"));

    store
        .update_item_answer("smoker", vec![AnswerValue::Boolean(false)])
        .unwrap();
    assert!(!store.is_item_enabled("pack-years"));

    // Retained in the updatable tree
    assert_eq!(
        store.item_answers("pack-years"),
        vec![AnswerValue::Integer(12)]
    );

    // Draft save keeps the hidden answer, final save strips it
    let draft = store.response_for_save(SavePolicy::Draft);
    assert!(draft.item.iter().any(|item| item.link_id == "pack-years"));
    let final_save = store.response_for_save(SavePolicy::Final);
    assert!(!final_save.item.iter().any(|item| item.link_id == "pack-years"));
}

#[test]
fn activation_override_forces_enabled_without_mutating_state() {
    let mut store = build_store(age_questionnaire());
    assert!(!store.is_item_enabled("senior-note"));

    store.toggle_enable_when_activation(true);
    assert!(store.is_item_enabled("senior-note"));

    // Stored state is untouched: turning the override off restores it
    store.toggle_enable_when_activation(false);
    assert!(!store.is_item_enabled("senior-note"));
}

#[test]
fn enable_when_expression_follows_response() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "q-age", "type": "integer"},
            {
                "linkId": "adult-section",
                "type": "display",
                "extension": [
                    {
                        "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-enableWhenExpression",
                        "valueExpression": {
                            "language": "text/fhirpath",
                            "expression": "%resource.item.where(linkId='q-age').answer.value.first() >= 18"
                        }
                    }
                ]
            }
        ]
    });
    let mut store = build_store(questionnaire);
    assert!(!store.is_item_enabled("adult-section"));

    store
        .update_item_answer("q-age", vec![AnswerValue::Integer(30)])
        .unwrap();
    assert!(store.is_item_enabled("adult-section"));

    store
        .update_item_answer("q-age", vec![AnswerValue::Integer(12)])
        .unwrap();
    assert!(!store.is_item_enabled("adult-section"));
}

#[test]
fn descendants_of_disabled_group_are_disabled() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "gate", "type": "boolean"},
            {
                "linkId": "section",
                "type": "group",
                "enableWhen": [
                    {"question": "gate", "operator": "=", "answerBoolean": true}
                ],
                "item": [
                    {"linkId": "inner", "type": "string"}
                ]
            }
        ]
    });
    let mut store = build_store(questionnaire);
    assert!(!store.is_item_enabled("inner"), "ancestor disabled");

    store
        .update_item_answer("gate", vec![AnswerValue::Boolean(true)])
        .unwrap();
    assert!(store.is_item_enabled("inner"));
}

#[test]
fn unknown_link_id_is_an_error() {
    let mut store: FormStore = build_store(age_questionnaire());
    assert!(store
        .update_item_answer("no-such-item", vec![AnswerValue::Integer(1)])
        .is_err());
}
