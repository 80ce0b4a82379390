//! Calculated expression engine
//!
//! Recomputes derived answers whenever the response mutates. Dependency
//! tracking is deliberately coarse: every calculated expression re-runs on
//! any change, then the new value is compared structurally against the
//! answer currently in the response. An unchanged value produces no write,
//! which is what breaks the write → re-evaluate → write cycle for
//! converging expression graphs. The store drives this to a fixed point
//! with a hard pass cap.

use indexmap::IndexMap;
use rust_decimal::{Decimal, RoundingStrategy};

use octofhir_sdc_diagnostics::Issue;
use octofhir_sdc_fhirpath::{Collection, EvaluationContext, Value};
use octofhir_sdc_model::{AnswerValue, Coding, ItemType, Quantity, QuestionnaireResponse};

use crate::enable_when::answers_for;
use crate::evaluator::ExpressionEvaluator;
use crate::extract::QuestionnaireModel;
use crate::index::ItemIndex;

/// Hard cap on recompute passes per mutation. Converging forms reach their
/// fixed point in one pass; the cap only guards against mutually dependent
/// expressions that never settle (surfaced as a warning, see store).
pub const MAX_CALCULATED_PASSES: usize = 10;

/// One calculated expression and its last evaluated value
#[derive(Debug, Clone)]
pub struct CalculatedExpressionState {
    pub expression: String,
    pub precision: Option<u32>,
    /// `None` until first evaluated; `Some(vec![])` is an evaluated-empty
    /// result, which clears the answer
    pub value: Option<Vec<AnswerValue>>,
}

/// A write the engine wants applied to the response tree
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedWrite {
    pub link_id: String,
    /// Empty means clear the item's answers
    pub answers: Vec<AnswerValue>,
}

/// All calculated expressions of a form
#[derive(Debug, Clone, Default)]
pub struct CalculatedContext {
    expressions: IndexMap<String, CalculatedExpressionState>,
}

impl CalculatedContext {
    pub fn initialise(model: &QuestionnaireModel) -> Self {
        let expressions = model
            .calculated_expressions
            .iter()
            .map(|(link_id, calculated)| {
                (
                    link_id.clone(),
                    CalculatedExpressionState {
                        expression: calculated.expression.clone(),
                        precision: calculated.precision,
                        value: None,
                    },
                )
            })
            .collect();
        Self { expressions }
    }

    /// Evaluate every calculated expression once against the given context.
    ///
    /// A write is emitted only when the computed value differs by
    /// structural equality from the answer currently in the response —
    /// that suppression is the fixed-point guard: once a pass writes
    /// nothing, another pass would see an identical response. It also
    /// means a manual edit to a calculated item is simply overwritten on
    /// the next recompute.
    pub fn evaluate_pass(
        &mut self,
        evaluator: &mut ExpressionEvaluator,
        context: &EvaluationContext,
        index: &ItemIndex,
        response: &QuestionnaireResponse,
        issues: &mut Vec<Issue>,
    ) -> Vec<CalculatedWrite> {
        let mut writes = Vec::new();
        for (link_id, state) in &mut self.expressions {
            let result =
                evaluator.evaluate_or_empty(&state.expression, context, Some(link_id), issues);

            let item_type = index.get(link_id).map(|entry| entry.item_type);
            let answers = coerce_collection(&result, item_type, state.precision);
            let current = answers_for(response, link_id);
            state.value = Some(answers.clone());

            if current == answers {
                continue;
            }
            writes.push(CalculatedWrite {
                link_id: link_id.clone(),
                answers,
            });
        }
        writes
    }

    /// Forget evaluated values (used when a new response is loaded, so the
    /// next pass re-seeds instead of diffing against stale state)
    pub fn reset_values(&mut self) {
        for state in self.expressions.values_mut() {
            state.value = None;
        }
    }

    pub fn states(&self) -> &IndexMap<String, CalculatedExpressionState> {
        &self.expressions
    }

    pub fn is_calculated(&self, link_id: &str) -> bool {
        self.expressions.contains_key(link_id)
    }
}

/// Convert an evaluation result into answers for the target item's type.
///
/// Null/empty results produce an empty vec (the answer array is cleared,
/// the item is not removed from the tree). Numeric results are rounded to
/// the declared precision before compare-and-write so floating point noise
/// does not register as a change.
fn coerce_collection(
    result: &Collection,
    item_type: Option<ItemType>,
    precision: Option<u32>,
) -> Vec<AnswerValue> {
    result
        .iter()
        .filter_map(|value| coerce_value(value, item_type, precision))
        .collect()
}

fn coerce_value(
    value: &Value,
    item_type: Option<ItemType>,
    precision: Option<u32>,
) -> Option<AnswerValue> {
    match item_type {
        Some(ItemType::Integer) => {
            use rust_decimal::prelude::ToPrimitive;
            let decimal = value.as_decimal()?;
            decimal
                .round()
                .to_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(AnswerValue::Integer)
        }
        Some(ItemType::Decimal) => {
            let decimal = round_to_precision(value.as_decimal()?, precision);
            Some(AnswerValue::Decimal(wire_stable(decimal)))
        }
        Some(ItemType::Boolean) => match value {
            Value::Boolean(b) => Some(AnswerValue::Boolean(*b)),
            _ => None,
        },
        Some(ItemType::String) | Some(ItemType::Text) => {
            Some(AnswerValue::String(value_as_string(value)?))
        }
        Some(ItemType::Url) => Some(AnswerValue::Uri(value_as_string(value)?)),
        Some(ItemType::Date) => value.as_str().map(|s| AnswerValue::Date(s.to_string())),
        Some(ItemType::DateTime) => value.as_str().map(|s| AnswerValue::DateTime(s.to_string())),
        Some(ItemType::Time) => value.as_str().map(|s| AnswerValue::Time(s.to_string())),
        Some(ItemType::Choice) | Some(ItemType::OpenChoice) => coerce_coding(value),
        Some(ItemType::Quantity) => match value {
            Value::Quantity { value, unit } => {
                use rust_decimal::prelude::ToPrimitive;
                Some(AnswerValue::Quantity(Quantity {
                    value: round_to_precision(*value, precision).to_f64(),
                    unit: unit.clone(),
                    ..Quantity::default()
                }))
            }
            _ => None,
        },
        // Untyped targets (or groups, which should not carry calculated
        // values anyway): take the value as-is where a mapping exists
        _ => coerce_untyped(value),
    }
}

fn round_to_precision(value: Decimal, precision: Option<u32>) -> Decimal {
    match precision {
        Some(places) => {
            value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
        }
        None => value,
    }
}

/// The wire shape stores decimals as JSON numbers, so values written back
/// must survive the f64 round trip unchanged or the equality guard would
/// see a phantom difference on every pass
fn wire_stable(value: Decimal) -> Decimal {
    use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
    value
        .to_f64()
        .and_then(Decimal::from_f64)
        .unwrap_or(value)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) | Value::Date(s) | Value::DateTime(s) | Value::Time(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Decimal(d) => Some(d.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_coding(value: &Value) -> Option<AnswerValue> {
    match value {
        Value::Object(json) => {
            let coding: Coding = serde_json::from_value(json.clone()).ok()?;
            if coding.code.is_none() && coding.display.is_none() {
                return None;
            }
            Some(AnswerValue::Coding(coding))
        }
        Value::String(s) => Some(AnswerValue::String(s.clone())),
        _ => None,
    }
}

fn coerce_untyped(value: &Value) -> Option<AnswerValue> {
    match value {
        Value::Boolean(b) => Some(AnswerValue::Boolean(*b)),
        Value::Integer(i) => i32::try_from(*i).ok().map(AnswerValue::Integer),
        Value::Decimal(d) => Some(AnswerValue::Decimal(wire_stable(*d))),
        Value::String(s) => Some(AnswerValue::String(s.clone())),
        Value::Date(s) => Some(AnswerValue::Date(s.clone())),
        Value::DateTime(s) => Some(AnswerValue::DateTime(s.clone())),
        Value::Time(s) => Some(AnswerValue::Time(s.clone())),
        Value::Quantity { value, unit } => {
            use rust_decimal::prelude::ToPrimitive;
            Some(AnswerValue::Quantity(Quantity {
                value: value.to_f64(),
                unit: unit.clone(),
                ..Quantity::default()
            }))
        }
        Value::Object(json) => serde_json::from_value::<Coding>(json.clone())
            .ok()
            .filter(|coding| coding.code.is_some())
            .map(AnswerValue::Coding),
    }
}
