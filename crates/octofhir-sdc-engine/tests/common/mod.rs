//! Shared fixtures for engine tests

use indexmap::IndexMap;
use serde_json::json;

use octofhir_sdc_engine::FormStore;
use octofhir_sdc_model::{Questionnaire, QuestionnaireResponse};

pub fn questionnaire_from(value: serde_json::Value) -> Questionnaire {
    serde_json::from_value(value).expect("test questionnaire must decode")
}

pub fn response_from(value: serde_json::Value) -> QuestionnaireResponse {
    serde_json::from_value(value).expect("test response must decode")
}

pub fn build_store(questionnaire: serde_json::Value) -> FormStore {
    FormStore::build(questionnaire_from(questionnaire), None, IndexMap::new())
        .expect("store must build")
}

/// Age / senior-note questionnaire from the enableWhen scenario
pub fn age_questionnaire() -> serde_json::Value {
    json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "item": [
            {"linkId": "q-age", "type": "integer", "text": "Age"},
            {
                "linkId": "senior-note",
                "type": "display",
                "text": "Ask about falls in the last 12 months",
                "enableWhen": [
                    {"question": "q-age", "operator": ">=", "answerInteger": 65}
                ]
            }
        ]
    })
}

/// Height / weight / BMI questionnaire from the calculated scenario
pub fn bmi_questionnaire() -> serde_json::Value {
    json!({
        "resourceType": "Questionnaire",
        "status": "active",
        "extension": [
            {
                "url": "http://hl7.org/fhir/StructureDefinition/variable",
                "valueExpression": {
                    "name": "height",
                    "language": "text/fhirpath",
                    "expression": "%resource.item.where(linkId='q-height').answer.value.first()"
                }
            },
            {
                "url": "http://hl7.org/fhir/StructureDefinition/variable",
                "valueExpression": {
                    "name": "weight",
                    "language": "text/fhirpath",
                    "expression": "%resource.item.where(linkId='q-weight').answer.value.first()"
                }
            }
        ],
        "item": [
            {"linkId": "q-height", "type": "decimal", "text": "Height (cm)"},
            {"linkId": "q-weight", "type": "decimal", "text": "Weight (kg)"},
            {
                "linkId": "bmi-result",
                "type": "decimal",
                "text": "BMI",
                "readOnly": true,
                "extension": [
                    {
                        "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-calculatedExpression",
                        "valueExpression": {
                            "language": "text/fhirpath",
                            "expression": "(%weight / ((%height / 100).power(2))).round(1)"
                        }
                    },
                    {
                        "url": "http://hl7.org/fhir/StructureDefinition/maxDecimalPlaces",
                        "valueInteger": 1
                    }
                ]
            }
        ]
    })
}
