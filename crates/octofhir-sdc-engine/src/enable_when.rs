//! EnableWhen engine
//!
//! Tracks the Enabled/Disabled state of every conditionally-shown item.
//! Plain enableWhen conditions update incrementally through the reverse
//! dependency map (only the items linked to a changed source re-evaluate);
//! enableWhenExpression items re-evaluate against the current response
//! whenever it mutates, and a write is only reported when the activation
//! state actually flips.

use std::cmp::Ordering;

use indexmap::IndexMap;

use octofhir_sdc_diagnostics::Issue;
use octofhir_sdc_fhirpath::EvaluationContext;
use octofhir_sdc_model::{
    AnswerValue, EnableBehavior, EnableWhen, EnableWhenOperator, QuestionnaireResponse,
    QuestionnaireResponseItem,
};

use crate::evaluator::ExpressionEvaluator;
use crate::extract::QuestionnaireModel;

/// One condition plus the latest answers seen from its source question
#[derive(Debug, Clone)]
pub struct ConditionState {
    pub condition: EnableWhen,
    pub source_answers: Vec<AnswerValue>,
}

impl ConditionState {
    /// Whether the source answers currently satisfy this condition.
    ///
    /// An absent answer satisfies only `exists=false`; every value
    /// comparison against an absent answer is unsatisfied. A repeating
    /// source satisfies a comparison if any one answer does.
    pub fn is_satisfied(&self) -> bool {
        let operator = self.condition.operator;
        if operator == EnableWhenOperator::Exists {
            let expected = self.condition.exists_expectation().unwrap_or(true);
            return self.source_answers.is_empty() != expected;
        }

        let Some(expected) = self.condition.expected_value() else {
            return false;
        };
        self.source_answers.iter().any(|answer| match operator {
            EnableWhenOperator::Equals => answer.matches(&expected),
            EnableWhenOperator::NotEquals => !answer.matches(&expected),
            EnableWhenOperator::GreaterThan => {
                answer.compare(&expected) == Some(Ordering::Greater)
            }
            EnableWhenOperator::LessThan => answer.compare(&expected) == Some(Ordering::Less),
            EnableWhenOperator::GreaterOrEqual => matches!(
                answer.compare(&expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            EnableWhenOperator::LessOrEqual => matches!(
                answer.compare(&expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            EnableWhenOperator::Exists => unreachable!("handled above"),
        })
    }
}

/// Activation state of one enableWhen-governed item
#[derive(Debug, Clone)]
pub struct EnableWhenItemState {
    pub conditions: Vec<ConditionState>,
    pub behavior: EnableBehavior,
    pub is_enabled: bool,
}

impl EnableWhenItemState {
    fn evaluate(&self) -> bool {
        match self.behavior {
            EnableBehavior::All => self.conditions.iter().all(ConditionState::is_satisfied),
            EnableBehavior::Any => self.conditions.iter().any(ConditionState::is_satisfied),
        }
    }
}

/// Activation state of one enableWhenExpression-governed item
#[derive(Debug, Clone)]
pub struct EnableWhenExpressionState {
    pub expression: String,
    pub is_enabled: bool,
}

/// The activation state machine for the whole form
#[derive(Debug, Clone, Default)]
pub struct EnableWhenContext {
    items: IndexMap<String, EnableWhenItemState>,
    /// Source linkId → dependent item linkIds
    linked_questions: IndexMap<String, Vec<String>>,
    expressions: IndexMap<String, EnableWhenExpressionState>,
    /// Debug override: render everything as enabled without touching the
    /// stored states
    activated_override: bool,
}

impl EnableWhenContext {
    /// Assemble initial state from the model and seed source answers from
    /// an existing response
    pub fn initialise(model: &QuestionnaireModel, response: &QuestionnaireResponse) -> Self {
        let mut items = IndexMap::new();
        for (link_id, enable_when_item) in &model.enable_when_items {
            let conditions = enable_when_item
                .conditions
                .iter()
                .map(|condition| ConditionState {
                    source_answers: answers_for(response, &condition.question),
                    condition: condition.clone(),
                })
                .collect();
            let mut state = EnableWhenItemState {
                conditions,
                behavior: enable_when_item.behavior,
                is_enabled: false,
            };
            state.is_enabled = state.evaluate();
            items.insert(link_id.clone(), state);
        }

        let expressions = model
            .enable_when_expressions
            .iter()
            .map(|(link_id, expression)| {
                (
                    link_id.clone(),
                    EnableWhenExpressionState {
                        expression: expression.clone(),
                        is_enabled: false,
                    },
                )
            })
            .collect();

        // Expression states need an evaluation round before first use;
        // the store runs update_expressions right after initialise
        Self {
            items,
            linked_questions: model.linked_questions.clone(),
            expressions,
            activated_override: false,
        }
    }

    /// Push a source item's new answers to its dependents. Returns the
    /// linkIds whose activation state flipped.
    pub fn update_item_answer(&mut self, link_id: &str, answers: &[AnswerValue]) -> Vec<String> {
        let Some(dependents) = self.linked_questions.get(link_id).cloned() else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for dependent in dependents {
            let Some(state) = self.items.get_mut(&dependent) else {
                continue;
            };
            for condition_state in &mut state.conditions {
                if condition_state.condition.question == link_id {
                    condition_state.source_answers = answers.to_vec();
                }
            }
            let enabled = state.evaluate();
            if enabled != state.is_enabled {
                state.is_enabled = enabled;
                changed.push(dependent);
            }
        }
        changed
    }

    /// Re-evaluate every enableWhenExpression against the current response
    /// context. Returns the linkIds whose activation state flipped.
    pub fn update_expressions(
        &mut self,
        evaluator: &mut ExpressionEvaluator,
        context: &EvaluationContext,
        issues: &mut Vec<Issue>,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for (link_id, state) in &mut self.expressions {
            let enabled = evaluator
                .evaluate_boolean(&state.expression, context, Some(link_id), issues)
                .unwrap_or(false);
            if enabled != state.is_enabled {
                state.is_enabled = enabled;
                changed.push(link_id.clone());
            }
        }
        changed
    }

    /// Force everything enabled (debug view); stored states are untouched
    pub fn set_activated_override(&mut self, activated: bool) {
        self.activated_override = activated;
    }

    pub fn activated_override(&self) -> bool {
        self.activated_override
    }

    /// The stored activation state of one item, ignoring ancestors.
    /// Items with no governing condition are enabled.
    pub fn is_enabled_locally(&self, link_id: &str) -> bool {
        if self.activated_override {
            return true;
        }
        if let Some(state) = self.items.get(link_id) {
            return state.is_enabled;
        }
        if let Some(state) = self.expressions.get(link_id) {
            return state.is_enabled;
        }
        true
    }

    /// Whether a linkId has any governing condition
    pub fn governs(&self, link_id: &str) -> bool {
        self.items.contains_key(link_id) || self.expressions.contains_key(link_id)
    }

    pub fn item_states(&self) -> &IndexMap<String, EnableWhenItemState> {
        &self.items
    }

    pub fn expression_states(&self) -> &IndexMap<String, EnableWhenExpressionState> {
        &self.expressions
    }
}

/// Collect the answers for a linkId anywhere in the response tree
pub fn answers_for(response: &QuestionnaireResponse, link_id: &str) -> Vec<AnswerValue> {
    fn walk(items: &[QuestionnaireResponseItem], link_id: &str, out: &mut Vec<AnswerValue>) {
        for item in items {
            if item.link_id == link_id {
                out.extend(item.answer_values());
            }
            walk(&item.item, link_id, out);
            for answer in &item.answer {
                walk(&answer.item, link_id, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(&response.item, link_id, &mut out);
    out
}
