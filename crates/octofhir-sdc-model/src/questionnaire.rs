//! Questionnaire resource model

use serde::{Deserialize, Serialize};

use crate::answer::AnswerValue;
use crate::types::{Coding, Extension, Quantity, Reference};

/// The immutable source definition of a form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    #[serde(rename = "resourceType", default = "Questionnaire::resource_type_name")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Contained resources, kept raw; the extractor pulls ValueSets out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
}

impl Questionnaire {
    fn resource_type_name() -> String {
        "Questionnaire".to_string()
    }
}

/// A node in the questionnaire's item tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireItem {
    pub link_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_when: Vec<EnableWhen>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_behavior: Option<EnableBehavior>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeats: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_value_set: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_option: Vec<AnswerOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
}

impl QuestionnaireItem {
    /// Whether this item is a grouping node
    pub fn is_group(&self) -> bool {
        self.item_type == ItemType::Group
    }

    /// Whether this item is required
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    /// Whether this item repeats
    pub fn is_repeating(&self) -> bool {
        self.repeats.unwrap_or(false)
    }
}

/// Questionnaire item type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ItemType {
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "display")]
    Display,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "dateTime")]
    DateTime,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "string")]
    #[default]
    String,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "choice")]
    Choice,
    #[serde(rename = "open-choice")]
    OpenChoice,
    #[serde(rename = "attachment")]
    Attachment,
    #[serde(rename = "reference")]
    Reference,
    #[serde(rename = "quantity")]
    Quantity,
}

/// How multiple enableWhen conditions combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnableBehavior {
    /// Enabled iff every condition is satisfied
    All,
    /// Enabled iff at least one condition is satisfied
    Any,
}

/// enableWhen comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnableWhenOperator {
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

/// A declarative visibility condition on another item's answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableWhen {
    /// linkId of the source question
    pub question: String,
    pub operator: EnableWhenOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_decimal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_integer: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_coding: Option<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_reference: Option<Reference>,
}

impl EnableWhen {
    /// The expected comparison value, as a tagged answer value.
    ///
    /// `exists` conditions carry a boolean expectation instead of a value;
    /// use [`EnableWhen::exists_expectation`] for those.
    pub fn expected_value(&self) -> Option<AnswerValue> {
        AnswerValue::from_enable_when(self)
    }

    /// For `exists` conditions, the expected presence flag
    pub fn exists_expectation(&self) -> Option<bool> {
        if self.operator == EnableWhenOperator::Exists {
            self.answer_boolean
        } else {
            None
        }
    }
}

/// A fixed answer option on a choice item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_integer: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_coding: Option<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_selected: Option<bool>,
}
