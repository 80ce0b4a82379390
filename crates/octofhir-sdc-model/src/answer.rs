//! Tagged answer values
//!
//! FHIR's wire shape for an answer is polymorphic-by-field
//! (`valueBoolean` / `valueInteger` / `valueCoding` / …, exactly one
//! present). Inside the engine that shape is miserable to work with, so it
//! is decoded once into this sum type and encoded back only at the wire
//! boundary.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::questionnaire::EnableWhen;
use crate::response::QuestionnaireResponseAnswer;
use crate::types::{Attachment, Coding, Quantity, Reference};

/// One typed answer value, exactly one variant populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AnswerValue {
    Boolean(bool),
    Integer(i32),
    Decimal(Decimal),
    /// FHIR date literal, possibly partial (`2024`, `2024-05`, `2024-05-01`)
    Date(String),
    DateTime(String),
    Time(String),
    String(String),
    Uri(String),
    Coding(Coding),
    Quantity(Quantity),
    Attachment(Attachment),
    Reference(Reference),
}

impl AnswerValue {
    /// Decode the first populated `value[x]` field, if any
    pub fn from_wire(answer: &QuestionnaireResponseAnswer) -> Option<Self> {
        if let Some(b) = answer.value_boolean {
            return Some(Self::Boolean(b));
        }
        if let Some(d) = answer.value_decimal {
            return Decimal::from_f64(d).map(Self::Decimal);
        }
        if let Some(i) = answer.value_integer {
            return Some(Self::Integer(i));
        }
        if let Some(d) = &answer.value_date {
            return Some(Self::Date(d.clone()));
        }
        if let Some(d) = &answer.value_date_time {
            return Some(Self::DateTime(d.clone()));
        }
        if let Some(t) = &answer.value_time {
            return Some(Self::Time(t.clone()));
        }
        if let Some(s) = &answer.value_string {
            return Some(Self::String(s.clone()));
        }
        if let Some(u) = &answer.value_uri {
            return Some(Self::Uri(u.clone()));
        }
        if let Some(c) = &answer.value_coding {
            return Some(Self::Coding(c.clone()));
        }
        if let Some(q) = &answer.value_quantity {
            return Some(Self::Quantity(q.clone()));
        }
        if let Some(a) = &answer.value_attachment {
            return Some(Self::Attachment(a.clone()));
        }
        if let Some(r) = &answer.value_reference {
            return Some(Self::Reference(r.clone()));
        }
        None
    }

    /// Encode into the polymorphic wire shape
    pub fn to_wire(&self) -> QuestionnaireResponseAnswer {
        let mut answer = QuestionnaireResponseAnswer::default();
        match self {
            Self::Boolean(b) => answer.value_boolean = Some(*b),
            Self::Integer(i) => answer.value_integer = Some(*i),
            Self::Decimal(d) => answer.value_decimal = d.to_f64(),
            Self::Date(d) => answer.value_date = Some(d.clone()),
            Self::DateTime(d) => answer.value_date_time = Some(d.clone()),
            Self::Time(t) => answer.value_time = Some(t.clone()),
            Self::String(s) => answer.value_string = Some(s.clone()),
            Self::Uri(u) => answer.value_uri = Some(u.clone()),
            Self::Coding(c) => answer.value_coding = Some(c.clone()),
            Self::Quantity(q) => answer.value_quantity = Some(q.clone()),
            Self::Attachment(a) => answer.value_attachment = Some(a.clone()),
            Self::Reference(r) => answer.value_reference = Some(r.clone()),
        }
        answer
    }

    /// Decode an enableWhen condition's expected `answer[x]` value
    pub fn from_enable_when(condition: &EnableWhen) -> Option<Self> {
        if let Some(b) = condition.answer_boolean {
            return Some(Self::Boolean(b));
        }
        if let Some(d) = condition.answer_decimal {
            return Decimal::from_f64(d).map(Self::Decimal);
        }
        if let Some(i) = condition.answer_integer {
            return Some(Self::Integer(i));
        }
        if let Some(d) = &condition.answer_date {
            return Some(Self::Date(d.clone()));
        }
        if let Some(d) = &condition.answer_date_time {
            return Some(Self::DateTime(d.clone()));
        }
        if let Some(t) = &condition.answer_time {
            return Some(Self::Time(t.clone()));
        }
        if let Some(s) = &condition.answer_string {
            return Some(Self::String(s.clone()));
        }
        if let Some(c) = &condition.answer_coding {
            return Some(Self::Coding(c.clone()));
        }
        if let Some(q) = &condition.answer_quantity {
            return Some(Self::Quantity(q.clone()));
        }
        if let Some(r) = &condition.answer_reference {
            return Some(Self::Reference(r.clone()));
        }
        None
    }

    /// Equality per questionnaire semantics.
    ///
    /// Numbers compare across Integer/Decimal; codings compare by
    /// system + code; everything else is structural.
    pub fn matches(&self, other: &AnswerValue) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Decimal(b)) | (Self::Decimal(b), Self::Integer(a)) => {
                Decimal::from(*a) == *b
            }
            (Self::Coding(a), Self::Coding(b)) => a.matches(b),
            (a, b) => a == b,
        }
    }

    /// Ordered comparison for the `>` `<` `>=` `<=` enableWhen operators.
    ///
    /// Dates, dateTimes and times are ISO-8601 literals, so lexicographic
    /// ordering is chronological at equal precision. Quantities compare by
    /// value when the unit matches (or either side has none). Unordered
    /// pairs return `None`.
    pub fn compare(&self, other: &AnswerValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Self::Decimal(a), Self::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Quantity(a), Self::Quantity(b)) => {
                let units_compatible =
                    a.unit.is_none() || b.unit.is_none() || a.unit == b.unit;
                if !units_compatible {
                    return None;
                }
                match (a.value, b.value) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Whether this value carries a code the option lists can match on
    pub fn as_coding(&self) -> Option<&Coding> {
        match self {
            Self::Coding(c) => Some(c),
            _ => None,
        }
    }
}
