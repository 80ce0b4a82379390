//! FormStore lifecycle, tabs, validation and variables

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{build_store, questionnaire_from, response_from};
use indexmap::IndexMap;
use octofhir_sdc_engine::{FormStore, InvalidKind};
use octofhir_sdc_model::AnswerValue;
use pretty_assertions::assert_eq;
use serde_json::json;

fn tabbed_questionnaire() -> serde_json::Value {
    let tab_control = json!({
        "url": "http://hl7.org/fhir/StructureDefinition/questionnaire-itemControl",
        "valueCodeableConcept": {
            "coding": [{
                "system": "http://hl7.org/fhir/questionnaire-item-control",
                "code": "tab"
            }]
        }
    });
    json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {
                "linkId": "tab-1",
                "type": "group",
                "text": "About you",
                "extension": [tab_control.clone()],
                "item": [
                    {"linkId": "name", "type": "string", "required": true}
                ]
            },
            {
                "linkId": "tab-2",
                "type": "group",
                "text": "History",
                "extension": [tab_control],
                "item": [
                    {"linkId": "smoker", "type": "boolean"},
                    {
                        "linkId": "pack-years",
                        "type": "integer",
                        "required": true,
                        "enableWhen": [
                            {"question": "smoker", "operator": "=", "answerBoolean": true}
                        ]
                    }
                ]
            }
        ]
    })
}

#[test]
fn tabs_are_extracted_in_order() {
    let store = build_store(tabbed_questionnaire());
    let tabs = store.tabs();
    assert_eq!(tabs.len(), 2);
    assert_eq!(tabs["tab-1"].index, 0);
    assert_eq!(tabs["tab-2"].index, 1);
    assert!(!tabs["tab-1"].is_complete);
    assert_eq!(store.current_tab_index(), 0);
}

#[test]
fn mark_tab_complete_toggles() {
    let mut store = build_store(tabbed_questionnaire());
    store.mark_tab_complete("tab-1").unwrap();
    assert!(store.tabs()["tab-1"].is_complete);
    store.mark_tab_complete("tab-1").unwrap();
    assert!(!store.tabs()["tab-1"].is_complete);
    assert!(store.mark_tab_complete("nope").is_err());
}

#[test]
fn revealing_required_item_clears_tab_completeness() {
    let mut store = build_store(tabbed_questionnaire());
    store.mark_tab_complete("tab-2").unwrap();
    assert!(store.tabs()["tab-2"].is_complete);

    // Answering smoker=true reveals the required, unanswered pack-years
    store
        .update_item_answer("smoker", vec![AnswerValue::Boolean(true)])
        .unwrap();
    assert!(
        !store.tabs()["tab-2"].is_complete,
        "newly revealed required unanswered item must clear completeness"
    );
}

#[test]
fn validation_reports_required_enabled_unanswered() {
    let mut store = build_store(tabbed_questionnaire());

    let invalid = store.validate();
    assert_eq!(invalid.get("name"), Some(&InvalidKind::Required));
    // pack-years is disabled, so not required yet
    assert_eq!(invalid.get("pack-years"), None);
    assert!(!store.response_is_valid());

    store
        .update_item_answer("smoker", vec![AnswerValue::Boolean(true)])
        .unwrap();
    let invalid = store.validate();
    assert_eq!(invalid.get("pack-years"), Some(&InvalidKind::Required));

    store
        .update_item_answer("name", vec![AnswerValue::String("Ada".into())])
        .unwrap();
    store
        .update_item_answer("pack-years", vec![AnswerValue::Integer(3)])
        .unwrap();
    assert!(store.response_is_valid());
}

#[test]
fn max_length_validation() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "code", "type": "string", "maxLength": 3}
        ]
    });
    let mut store = build_store(questionnaire);
    store
        .update_item_answer("code", vec![AnswerValue::String("abcd".into())])
        .unwrap();
    assert_eq!(store.validate().get("code"), Some(&InvalidKind::MaxLength));
}

#[test]
fn observers_are_notified_with_the_change() {
    let mut store = build_store(tabbed_questionnaire());
    let notifications = Arc::new(AtomicUsize::new(0));
    let seen = notifications.clone();
    store.subscribe(Box::new(move |change| {
        if change.source_link_id.as_deref() == Some("name") {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));

    store
        .update_item_answer("name", vec![AnswerValue::String("Ada".into())])
        .unwrap();
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[test]
fn build_with_existing_response_seeds_enable_when() {
    let questionnaire = questionnaire_from(tabbed_questionnaire());
    let response = response_from(json!({
        "resourceType": "QuestionnaireResponse",
        "status": "in-progress",
        "item": [
            {
                "linkId": "tab-2",
                "item": [
                    {"linkId": "smoker", "answer": [{"valueBoolean": true}]}
                ]
            }
        ]
    }));
    let store = FormStore::build(questionnaire, Some(response), IndexMap::new()).unwrap();
    assert!(store.is_item_enabled("pack-years"));
}

#[test]
fn set_populated_response_rederives_state() {
    let mut store = build_store(tabbed_questionnaire());
    assert!(!store.is_item_enabled("pack-years"));

    let populated = response_from(json!({
        "resourceType": "QuestionnaireResponse",
        "status": "in-progress",
        "item": [
            {
                "linkId": "tab-2",
                "item": [
                    {"linkId": "smoker", "answer": [{"valueBoolean": true}]}
                ]
            }
        ]
    }));
    store.set_populated_response(populated).unwrap();
    assert!(store.is_item_enabled("pack-years"));
    assert_eq!(
        store.item_answers("smoker"),
        vec![AnswerValue::Boolean(true)]
    );
}

#[test]
fn destroy_resets_everything() {
    let mut store = build_store(tabbed_questionnaire());
    store
        .update_item_answer("name", vec![AnswerValue::String("Ada".into())])
        .unwrap();
    store.destroy();
    assert!(store.updatable_response().item.is_empty());
    assert!(store.tabs().is_empty());
    assert!(store.change_history().is_empty());
}

#[test]
fn contained_value_set_is_available_offline() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "contained": [
            {
                "resourceType": "ValueSet",
                "id": "yesno",
                "compose": {
                    "include": [{
                        "system": "http://example.org/yn",
                        "concept": [
                            {"code": "y", "display": "Yes"},
                            {"code": "n", "display": "No"}
                        ]
                    }]
                }
            }
        ],
        "item": [
            {"linkId": "q-choice", "type": "choice", "answerValueSet": "#yesno"}
        ]
    });
    let mut store = build_store(questionnaire);
    let codings = store.answer_codings("q-choice");
    assert_eq!(codings.len(), 2);
    assert_eq!(codings[0].code.as_deref(), Some("y"));
}

#[test]
fn launch_context_feeds_expressions() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "extension": [
            {
                "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-launchContext",
                "extension": [
                    {"url": "name", "valueCoding": {"code": "patient"}},
                    {"url": "type", "valueCode": "Patient"}
                ]
            }
        ],
        "item": [
            {"linkId": "q-info", "type": "string"},
            {
                "linkId": "female-section",
                "type": "display",
                "extension": [{
                    "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-enableWhenExpression",
                    "valueExpression": {
                        "language": "text/fhirpath",
                        "expression": "%patient.gender = 'female'"
                    }
                }]
            }
        ]
    });
    let mut store = build_store(questionnaire);
    assert_eq!(store.model().launch_contexts.len(), 1);
    assert!(!store.is_item_enabled("female-section"));

    store
        .set_launch_resource(
            "patient",
            json!({"resourceType": "Patient", "gender": "female"}),
        )
        .unwrap();
    assert!(store.is_item_enabled("female-section"));
}

#[test]
fn additional_variables_are_bound() {
    let questionnaire = questionnaire_from(json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "q-x", "type": "string"},
            {
                "linkId": "flagged",
                "type": "display",
                "extension": [{
                    "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-enableWhenExpression",
                    "valueExpression": {
                        "language": "text/fhirpath",
                        "expression": "%flag = true"
                    }
                }]
            }
        ]
    }));
    let mut variables = IndexMap::new();
    variables.insert("flag".to_string(), json!(true));
    let store = FormStore::build(questionnaire, None, variables).unwrap();
    assert!(store.is_item_enabled("flagged"));
}
