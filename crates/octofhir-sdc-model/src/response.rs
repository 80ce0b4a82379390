//! QuestionnaireResponse resource model
//!
//! The response tree mirrors the questionnaire's shape but only holds items
//! that carry an answer or a non-empty child subtree. Keeping that invariant
//! is the response synchroniser's job (engine crate); this module only
//! provides the wire shape and small structural helpers.

use serde::{Deserialize, Serialize};

use crate::answer::AnswerValue;
use crate::questionnaire::QuestionnaireItem;
use crate::types::{Attachment, Coding, Quantity, Reference};

/// The mutable answers document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    #[serde(rename = "resourceType", default = "QuestionnaireResponse::resource_type_name")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authored: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,
}

impl QuestionnaireResponse {
    fn resource_type_name() -> String {
        "QuestionnaireResponse".to_string()
    }

    /// An empty in-progress response
    pub fn empty() -> Self {
        Self {
            resource_type: Self::resource_type_name(),
            id: None,
            questionnaire: None,
            status: "in-progress".to_string(),
            subject: None,
            authored: None,
            author: None,
            item: Vec::new(),
        }
    }
}

impl Default for QuestionnaireResponse {
    fn default() -> Self {
        Self::empty()
    }
}

/// A node in the response tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponseItem {
    pub link_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer: Vec<QuestionnaireResponseAnswer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,
}

impl QuestionnaireResponseItem {
    /// A group shell for the given questionnaire item
    pub fn new_group(definition: &QuestionnaireItem) -> Self {
        Self {
            link_id: definition.link_id.clone(),
            text: definition.text.clone(),
            answer: Vec::new(),
            item: Vec::new(),
        }
    }

    /// An answer-less leaf shell for the given questionnaire item
    pub fn new_item(definition: &QuestionnaireItem) -> Self {
        Self {
            link_id: definition.link_id.clone(),
            text: definition.text.clone(),
            answer: Vec::new(),
            item: Vec::new(),
        }
    }

    /// An item with neither answers nor children carries no information and
    /// must not persist in the tree
    pub fn is_empty(&self) -> bool {
        self.answer.is_empty() && self.item.is_empty()
    }

    /// Replace this item's answers with the given tagged values
    pub fn set_answers<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = AnswerValue>,
    {
        self.answer = values
            .into_iter()
            .map(|v| v.to_wire())
            .collect();
    }

    /// The item's answers as tagged values, skipping malformed entries
    pub fn answer_values(&self) -> Vec<AnswerValue> {
        self.answer.iter().filter_map(AnswerValue::from_wire).collect()
    }
}

/// One answer slot; exactly one `value[x]` field is populated on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponseAnswer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_decimal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_integer: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_coding: Option<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_reference: Option<Reference>,
    /// Nested items under this answer (repeating groups)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,
}
