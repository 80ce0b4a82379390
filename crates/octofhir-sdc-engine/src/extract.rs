//! One-pass questionnaire artifact extraction
//!
//! Walks the definition tree once and pulls out everything the engine
//! derives state from: enableWhen conditions and their reverse-dependency
//! map, the SDC expression extensions, variables, launch contexts, tab
//! groups and contained value sets. Anything malformed is skipped with a
//! warning issue; extraction never fails a load.

use indexmap::IndexMap;
use log::warn;

use octofhir_sdc_diagnostics::{Issue, IssueSource};
use octofhir_sdc_model::{
    sdc, AnswerExpressionSpec, Coding, EnableBehavior, EnableWhen, ItemControl, ItemExtensions,
    ItemPopulationContextSpec, LaunchContextSpec, Questionnaire, QuestionnaireItem, ValueSet,
    VariableSpec,
};

use crate::index::ItemIndex;

/// The enableWhen conditions governing one item
#[derive(Debug, Clone)]
pub struct EnableWhenItem {
    pub link_id: String,
    pub conditions: Vec<EnableWhen>,
    pub behavior: EnableBehavior,
}

/// A calculated-expression declaration with its write-back precision
#[derive(Debug, Clone)]
pub struct CalculatedExpression {
    pub link_id: String,
    pub expression: String,
    /// Decimal places for numeric results (from maxDecimalPlaces)
    pub precision: Option<u32>,
}

/// Variable declarations, split by language.
///
/// FHIRPath variables keep declaration order so later ones can reference
/// earlier ones; x-fhir-query variables are resolved externally and their
/// results injected at runtime.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    pub fhirpath: Vec<VariableSpec>,
    pub x_fhir_query: IndexMap<String, VariableSpec>,
}

/// Everything derived from a questionnaire definition in one traversal
#[derive(Debug, Clone, Default)]
pub struct QuestionnaireModel {
    pub index: ItemIndex,
    /// Target linkId → its enableWhen conditions
    pub enable_when_items: IndexMap<String, EnableWhenItem>,
    /// Source linkId → the items whose visibility depends on it
    pub linked_questions: IndexMap<String, Vec<String>>,
    /// Target linkId → enableWhenExpression
    pub enable_when_expressions: IndexMap<String, String>,
    /// Target linkId → calculatedExpression
    pub calculated_expressions: IndexMap<String, CalculatedExpression>,
    /// Target linkId → answerExpression
    pub answer_expressions: IndexMap<String, AnswerExpressionSpec>,
    /// Group linkId → itemPopulationContext
    pub item_population_contexts: IndexMap<String, ItemPopulationContextSpec>,
    pub variables: Variables,
    /// Binding name → launch context request
    pub launch_contexts: IndexMap<String, LaunchContextSpec>,
    /// Tab group linkIds in declared order
    pub tab_link_ids: Vec<String>,
    /// Value-set URL (and contained id) → eagerly resolved codings
    pub processed_value_sets: IndexMap<String, Vec<Coding>>,
    /// linkId → preferred terminology server override
    pub preferred_terminology_servers: IndexMap<String, String>,
    /// Item-level rendering hints the engine passes through untouched
    pub item_controls: IndexMap<String, ItemControl>,
}

impl QuestionnaireModel {
    /// Extract every derived artifact from the questionnaire
    pub fn build(questionnaire: &Questionnaire, issues: &mut Vec<Issue>) -> Self {
        let mut model = Self {
            index: ItemIndex::build(questionnaire, issues),
            ..Self::default()
        };

        let questionnaire_extensions = sdc::QuestionnaireExtensions::decode(questionnaire, issues);
        for launch_context in questionnaire_extensions.launch_contexts {
            model
                .launch_contexts
                .insert(launch_context.name.clone(), launch_context);
        }
        for variable in questionnaire_extensions.variables {
            model.add_variable(variable);
        }

        for item in &questionnaire.item {
            model.extract_item(item, issues);
        }

        model.process_contained_value_sets(questionnaire, issues);
        model
    }

    fn extract_item(&mut self, item: &QuestionnaireItem, issues: &mut Vec<Issue>) {
        let link_id = &item.link_id;

        if !item.enable_when.is_empty() {
            let conditions: Vec<EnableWhen> = item
                .enable_when
                .iter()
                .filter(|condition| {
                    let known = self.index.contains(&condition.question);
                    if !known {
                        warn!(
                            "enableWhen on {link_id} references unknown question {}",
                            condition.question
                        );
                        issues.push(
                            Issue::warning(
                                IssueSource::Extraction,
                                format!(
                                    "enableWhen references unknown question '{}'",
                                    condition.question
                                ),
                            )
                            .with_link_id(link_id),
                        );
                    }
                    known
                })
                .cloned()
                .collect();

            if !conditions.is_empty() {
                for condition in &conditions {
                    self.linked_questions
                        .entry(condition.question.clone())
                        .or_default()
                        .push(link_id.clone());
                }
                self.enable_when_items.insert(
                    link_id.clone(),
                    EnableWhenItem {
                        link_id: link_id.clone(),
                        conditions,
                        behavior: item.enable_behavior.unwrap_or(EnableBehavior::All),
                    },
                );
            }
        }

        let extensions = ItemExtensions::decode(item, issues);

        if let Some(spec) = extensions.enable_when_expression {
            self.enable_when_expressions
                .insert(link_id.clone(), spec.expression);
        }
        if let Some(spec) = extensions.calculated_expression {
            self.calculated_expressions.insert(
                link_id.clone(),
                CalculatedExpression {
                    link_id: link_id.clone(),
                    expression: spec.expression,
                    precision: extensions
                        .max_decimal_places
                        .and_then(|p| u32::try_from(p).ok()),
                },
            );
        }
        if let Some(spec) = extensions.answer_expression {
            self.answer_expressions.insert(link_id.clone(), spec);
        }
        if let Some(spec) = extensions.item_population_context {
            self.item_population_contexts.insert(link_id.clone(), spec);
        }
        for variable in extensions.variables {
            self.add_variable(variable);
        }
        if let Some(server) = extensions.preferred_terminology_server {
            self.preferred_terminology_servers
                .insert(link_id.clone(), server);
        }
        if let Some(control) = extensions.item_control {
            if control == ItemControl::Tab && item.is_group() {
                self.tab_link_ids.push(link_id.clone());
            }
            self.item_controls.insert(link_id.clone(), control);
        }

        for child in &item.item {
            self.extract_item(child, issues);
        }
    }

    fn add_variable(&mut self, variable: VariableSpec) {
        match variable.language {
            octofhir_sdc_model::ExpressionLanguage::FhirPath => {
                self.variables.fhirpath.push(variable);
            }
            octofhir_sdc_model::ExpressionLanguage::XFhirQuery => {
                self.variables
                    .x_fhir_query
                    .insert(variable.name.clone(), variable);
            }
        }
    }

    /// Resolve contained ValueSets eagerly so no network round trip is
    /// needed at render time. Keyed by both `#id` reference target and
    /// canonical url.
    fn process_contained_value_sets(
        &mut self,
        questionnaire: &Questionnaire,
        issues: &mut Vec<Issue>,
    ) {
        for contained in &questionnaire.contained {
            let resource_type = contained.get("resourceType").and_then(|v| v.as_str());
            if resource_type != Some("ValueSet") {
                continue;
            }
            let value_set: ValueSet = match serde_json::from_value(contained.clone()) {
                Ok(value_set) => value_set,
                Err(e) => {
                    warn!("skipping undecodable contained ValueSet: {e}");
                    issues.push(Issue::warning(
                        IssueSource::Extraction,
                        format!("Contained ValueSet could not be decoded: {e}"),
                    ));
                    continue;
                }
            };
            let codings = value_set.codings();
            if codings.is_empty() {
                continue;
            }
            if let Some(id) = &value_set.id {
                self.processed_value_sets.insert(id.clone(), codings.clone());
            }
            if let Some(url) = &value_set.url {
                self.processed_value_sets.insert(url.clone(), codings);
            }
        }
    }
}
