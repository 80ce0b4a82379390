//! Form state store
//!
//! The aggregate owning one loaded form: the source questionnaire and its
//! extracted model, the source and updatable responses, tab state,
//! enableWhen and calculated-expression contexts, variables and the value
//! set cache. The store is an explicitly owned object — callers construct
//! it, pass it around and mutate it only through the operations here; every
//! mutation returns a [`ChangeSet`] and notifies registered observers.
//!
//! All mutation is serialized through the caller's single event loop; the
//! store only defends against re-entering a mutation from an observer.

use indexmap::IndexMap;
use log::warn;
use serde::Serialize;
use serde_json::Value as Json;

use octofhir_sdc_diagnostics::{Issue, IssueSource, Result, SdcError};
use octofhir_sdc_model::{
    AnswerValue, Coding, ItemType, Questionnaire, QuestionnaireResponse, QuestionnaireResponseItem,
};

use crate::calculated::{CalculatedContext, CalculatedWrite, MAX_CALCULATED_PASSES};
use crate::enable_when::{answers_for, EnableWhenContext};
use crate::evaluator::{build_context, ContextInputs, ExpressionEvaluator};
use crate::extract::QuestionnaireModel;
use crate::sync::{find_item, find_item_mut, merge_child, prune_empty};
use crate::value_set::ValueSetCache;

/// A navigable top-level section with a completeness flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tab {
    pub index: usize,
    pub is_complete: bool,
}

/// Which answers survive serialisation for save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Keep everything, including answers of currently disabled items
    Draft,
    /// Strip items whose enableWhen state is disabled
    Final,
}

/// Why an item is invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidKind {
    /// Required, enabled, and unanswered
    Required,
    /// A string answer exceeds the declared maxLength
    MaxLength,
}

/// Summary of one mutation, returned to the caller and sent to observers
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    /// The linkId whose answer the caller changed, if any
    pub source_link_id: Option<String>,
    /// Items whose activation state flipped
    pub enable_when_changed: Vec<String>,
    /// Items whose calculated value was rewritten
    pub calculated_changed: Vec<String>,
    /// Whether any tab lost completeness or the current tab moved
    pub tabs_changed: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.source_link_id.is_none()
            && self.enable_when_changed.is_empty()
            && self.calculated_changed.is_empty()
            && !self.tabs_changed
    }
}

type Observer = Box<dyn Fn(&ChangeSet) + Send>;

const CHANGE_HISTORY_LIMIT: usize = 50;

/// The aggregate form state
pub struct FormStore {
    questionnaire: Questionnaire,
    model: QuestionnaireModel,
    source_response: QuestionnaireResponse,
    updatable_response: QuestionnaireResponse,
    tabs: IndexMap<String, Tab>,
    current_tab_index: usize,
    enable_when: EnableWhenContext,
    calculated: CalculatedContext,
    evaluator: ExpressionEvaluator,
    launch_resources: IndexMap<String, Json>,
    query_variable_results: IndexMap<String, Json>,
    additional_variables: IndexMap<String, Json>,
    value_sets: ValueSetCache,
    issues: Vec<Issue>,
    observers: Vec<Observer>,
    change_history: Vec<ChangeSet>,
    in_mutation: bool,
}

impl FormStore {
    /// Build a form from a questionnaire, an optional pre-existing
    /// response, and extra named FHIRPath bindings
    pub fn build(
        questionnaire: Questionnaire,
        response: Option<QuestionnaireResponse>,
        additional_variables: IndexMap<String, Json>,
    ) -> Result<Self> {
        if questionnaire.item.is_empty() {
            return Err(SdcError::invalid_questionnaire("questionnaire has no items"));
        }

        let mut issues = Vec::new();
        let model = QuestionnaireModel::build(&questionnaire, &mut issues);

        let value_sets = ValueSetCache::new();
        value_sets.start_session();
        value_sets.set_processed(model.processed_value_sets.clone());

        let source_response = response.unwrap_or_default();
        let updatable_response = source_response.clone();

        let enable_when = EnableWhenContext::initialise(&model, &updatable_response);
        let calculated = CalculatedContext::initialise(&model);

        let tabs = model
            .tab_link_ids
            .iter()
            .enumerate()
            .map(|(index, link_id)| {
                (
                    link_id.clone(),
                    Tab {
                        index,
                        is_complete: false,
                    },
                )
            })
            .collect();

        let mut store = Self {
            questionnaire,
            model,
            source_response,
            updatable_response,
            tabs,
            current_tab_index: 0,
            enable_when,
            calculated,
            evaluator: ExpressionEvaluator::new(),
            launch_resources: IndexMap::new(),
            query_variable_results: IndexMap::new(),
            additional_variables,
            value_sets,
            issues,
            observers: Vec::new(),
            change_history: Vec::new(),
            in_mutation: false,
        };

        store.run_expression_round(&mut ChangeSet::default());
        store.current_tab_index = store.first_visible_tab();
        Ok(store)
    }

    // --- accessors -------------------------------------------------------

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    pub fn model(&self) -> &QuestionnaireModel {
        &self.model
    }

    pub fn source_response(&self) -> &QuestionnaireResponse {
        &self.source_response
    }

    pub fn updatable_response(&self) -> &QuestionnaireResponse {
        &self.updatable_response
    }

    pub fn tabs(&self) -> &IndexMap<String, Tab> {
        &self.tabs
    }

    pub fn current_tab_index(&self) -> usize {
        self.current_tab_index
    }

    pub fn enable_when(&self) -> &EnableWhenContext {
        &self.enable_when
    }

    pub fn calculated(&self) -> &CalculatedContext {
        &self.calculated
    }

    pub fn value_sets(&self) -> &ValueSetCache {
        &self.value_sets
    }

    /// Issues accumulated across extraction and evaluation
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn change_history(&self) -> &[ChangeSet] {
        &self.change_history
    }

    /// Register a change observer, called after every mutation
    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    /// An item is enabled when its own state and every ancestor's state is
    /// enabled (or the global debug override is on)
    pub fn is_item_enabled(&self, link_id: &str) -> bool {
        if self.enable_when.activated_override() {
            return true;
        }
        if !self.enable_when.is_enabled_locally(link_id) {
            return false;
        }
        self.model
            .index
            .ancestors(link_id)
            .iter()
            .all(|ancestor| self.enable_when.is_enabled_locally(ancestor))
    }

    /// Current answers of an item in the updatable response
    pub fn item_answers(&self, link_id: &str) -> Vec<AnswerValue> {
        answers_for(&self.updatable_response, link_id)
    }

    /// Codings for a choice item: processed/cached value sets first, then
    /// its answerExpression evaluated against the launch context
    pub fn answer_codings(&mut self, link_id: &str) -> Vec<Coding> {
        let value_set_url = self
            .model
            .index
            .get(link_id)
            .and_then(|_| self.question_value_set_url(link_id));
        if let Some(url) = value_set_url {
            if let Some(codings) = self.value_sets.get(&url) {
                return codings;
            }
        }

        let Some(spec) = self.model.answer_expressions.get(link_id).cloned() else {
            return Vec::new();
        };
        let empty_resource = Json::Null;
        let context_inputs = ContextInputs {
            resource: &empty_resource,
            launch_resources: &self.launch_resources,
            query_results: &self.query_variable_results,
            additional_variables: &self.additional_variables,
            fhirpath_variables: &[],
            population_contexts: &self.model.item_population_contexts,
        };
        let context = build_context(&mut self.evaluator, &context_inputs, &mut self.issues);
        let result = self.evaluator.evaluate_or_empty(
            &spec.expression,
            &context,
            Some(link_id),
            &mut self.issues,
        );
        codings_from_values(&result)
    }

    fn question_value_set_url(&self, link_id: &str) -> Option<String> {
        fn find_url<'a>(
            items: &'a [octofhir_sdc_model::QuestionnaireItem],
            link_id: &str,
        ) -> Option<&'a str> {
            for item in items {
                if item.link_id == link_id {
                    return item.answer_value_set.as_deref();
                }
                if let Some(found) = find_url(&item.item, link_id) {
                    return Some(found);
                }
            }
            None
        }
        find_url(&self.questionnaire.item, link_id).map(str::to_string)
    }

    // --- mutations -------------------------------------------------------

    /// Merge a changed answer into the response tree and re-derive all
    /// dependent state. This is the operation behind every form field edit.
    pub fn update_item_answer(
        &mut self,
        link_id: &str,
        answers: Vec<AnswerValue>,
    ) -> Result<ChangeSet> {
        if !self.model.index.contains(link_id) {
            return Err(SdcError::unknown_link_id(link_id));
        }
        self.enter_mutation()?;

        let mut change = ChangeSet {
            source_link_id: Some(link_id.to_string()),
            ..ChangeSet::default()
        };

        self.write_answers(link_id, &answers);
        change
            .enable_when_changed
            .extend(self.enable_when.update_item_answer(link_id, &answers));
        self.run_expression_round(&mut change);
        self.update_tab_completeness(&mut change);

        self.finish_mutation(change)
    }

    /// Switch the visible tab
    pub fn switch_tab(&mut self, new_index: usize) {
        self.current_tab_index = new_index;
    }

    /// Toggle a tab's completeness mark (explicit user action)
    pub fn mark_tab_complete(&mut self, tab_link_id: &str) -> Result<()> {
        match self.tabs.get_mut(tab_link_id) {
            Some(tab) => {
                tab.is_complete = !tab.is_complete;
                Ok(())
            }
            None => Err(SdcError::unknown_link_id(tab_link_id)),
        }
    }

    /// Force-render every item as enabled without touching stored state
    pub fn toggle_enable_when_activation(&mut self, activated: bool) {
        self.enable_when.set_activated_override(activated);
    }

    /// Inject the resolved resource of an x-fhir-query variable and
    /// re-derive expression state
    pub fn set_query_variable_result(&mut self, name: &str, resource: Json) -> Result<ChangeSet> {
        self.enter_mutation()?;
        self.query_variable_results.insert(name.to_string(), resource);
        let mut change = ChangeSet::default();
        self.run_expression_round(&mut change);
        self.update_tab_completeness(&mut change);
        self.finish_mutation(change)
    }

    /// Supply a launch context resource (`%patient`, `%user`, …)
    pub fn set_launch_resource(&mut self, name: &str, resource: Json) -> Result<ChangeSet> {
        self.enter_mutation()?;
        self.launch_resources.insert(name.to_string(), resource);
        let mut change = ChangeSet::default();
        self.run_expression_round(&mut change);
        self.finish_mutation(change)
    }

    /// Replace the updatable response with a populated one and re-derive
    /// everything from it
    pub fn set_populated_response(&mut self, response: QuestionnaireResponse) -> Result<ChangeSet> {
        self.enter_mutation()?;
        self.updatable_response = response;
        self.calculated.reset_values();
        self.enable_when = {
            let activated = self.enable_when.activated_override();
            let mut enable_when =
                EnableWhenContext::initialise(&self.model, &self.updatable_response);
            enable_when.set_activated_override(activated);
            enable_when
        };
        let mut change = ChangeSet::default();
        self.run_expression_round(&mut change);
        self.current_tab_index = self.first_visible_tab();
        change.tabs_changed = true;
        self.finish_mutation(change)
    }

    /// Adopt the server-acknowledged response as the new baseline
    pub fn set_response_as_saved(&mut self, response: QuestionnaireResponse) {
        self.source_response = response.clone();
        self.updatable_response = response;
        self.change_history.clear();
    }

    /// Clear all answers
    pub fn set_response_as_empty(&mut self) -> Result<ChangeSet> {
        self.set_populated_response(QuestionnaireResponse::empty())
    }

    /// Tear down this form instance. In-flight value-set requests keyed to
    /// the old session are discarded when they land.
    pub fn destroy(&mut self) {
        self.value_sets.start_session();
        self.questionnaire = Questionnaire::default();
        self.model = QuestionnaireModel::default();
        self.source_response = QuestionnaireResponse::empty();
        self.updatable_response = QuestionnaireResponse::empty();
        self.tabs.clear();
        self.current_tab_index = 0;
        self.enable_when = EnableWhenContext::default();
        self.calculated = CalculatedContext::default();
        self.launch_resources.clear();
        self.query_variable_results.clear();
        self.issues.clear();
        self.change_history.clear();
    }

    /// The response to hand to the save collaborator.
    ///
    /// Hidden-answer policy (documented decision): the updatable tree keeps
    /// answers of disabled items while editing; `Final` strips them at this
    /// boundary, `Draft` keeps them. Both prune empty items.
    pub fn response_for_save(&self, policy: SavePolicy) -> QuestionnaireResponse {
        let mut response = self.updatable_response.clone();
        if policy == SavePolicy::Final {
            self.strip_disabled(&mut response.item);
        }
        prune_empty(&mut response);
        response
    }

    /// Required/maxLength validation over enabled items
    pub fn validate(&self) -> IndexMap<String, InvalidKind> {
        let mut invalid = IndexMap::new();
        for link_id in self.model.index.link_ids() {
            let Some(entry) = self.model.index.get(link_id) else {
                continue;
            };
            if matches!(entry.item_type, ItemType::Group | ItemType::Display) {
                continue;
            }
            if !self.is_item_enabled(link_id) {
                continue;
            }
            let answers = self.item_answers(link_id);
            if entry.required && answers.is_empty() {
                invalid.insert(link_id.to_string(), InvalidKind::Required);
                continue;
            }
            if let Some(max_length) = entry.max_length {
                let too_long = answers.iter().any(|answer| match answer {
                    AnswerValue::String(s) => s.chars().count() as i64 > i64::from(max_length),
                    _ => false,
                });
                if too_long {
                    invalid.insert(link_id.to_string(), InvalidKind::MaxLength);
                }
            }
        }
        invalid
    }

    pub fn response_is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    // --- internals -------------------------------------------------------

    fn enter_mutation(&mut self) -> Result<()> {
        if self.in_mutation {
            return Err(SdcError::ReentrantMutation);
        }
        self.in_mutation = true;
        Ok(())
    }

    fn finish_mutation(&mut self, change: ChangeSet) -> Result<ChangeSet> {
        self.change_history.push(change.clone());
        if self.change_history.len() > CHANGE_HISTORY_LIMIT {
            self.change_history.remove(0);
        }
        self.in_mutation = false;
        for observer in &self.observers {
            observer(&change);
        }
        Ok(change)
    }

    /// Write answers into the tree at the item's structural position,
    /// creating ancestor group shells as needed
    fn write_answers(&mut self, link_id: &str, answers: &[AnswerValue]) {
        let Some(path) = self.model.index.path_to(link_id) else {
            return;
        };
        let existing_children = find_item(&self.updatable_response.item, link_id)
            .map(|item| item.item.clone())
            .unwrap_or_default();

        let mut new_item = QuestionnaireResponseItem {
            link_id: link_id.to_string(),
            text: self
                .model
                .index
                .get(link_id)
                .and_then(|entry| entry.text.clone()),
            answer: Vec::new(),
            item: existing_children,
        };
        new_item.set_answers(answers.iter().cloned());

        merge_at_path(
            &mut self.updatable_response.item,
            &path,
            new_item,
            &self.model.index,
            None,
        );
    }

    /// Re-evaluate enableWhen expressions and drive calculated expressions
    /// to a fixed point (bounded by [`MAX_CALCULATED_PASSES`])
    fn run_expression_round(&mut self, change: &mut ChangeSet) {
        for pass in 0.. {
            if pass >= MAX_CALCULATED_PASSES {
                warn!("calculated expressions did not converge after {MAX_CALCULATED_PASSES} passes");
                self.issues.push(Issue::warning(
                    IssueSource::Evaluation,
                    format!(
                        "Calculated expressions did not reach a fixed point after \
                         {MAX_CALCULATED_PASSES} passes; the expression graph may be cyclic"
                    ),
                ));
                break;
            }

            let resource = serde_json::to_value(&self.updatable_response).unwrap_or(Json::Null);
            let context_inputs = ContextInputs {
                resource: &resource,
                launch_resources: &self.launch_resources,
                query_results: &self.query_variable_results,
                additional_variables: &self.additional_variables,
                fhirpath_variables: &self.model.variables.fhirpath,
                population_contexts: &self.model.item_population_contexts,
            };
            let context = build_context(&mut self.evaluator, &context_inputs, &mut self.issues);

            let expression_changes = self.enable_when.update_expressions(
                &mut self.evaluator,
                &context,
                &mut self.issues,
            );
            let writes = self.calculated.evaluate_pass(
                &mut self.evaluator,
                &context,
                &self.model.index,
                &self.updatable_response,
                &mut self.issues,
            );

            change.enable_when_changed.extend(expression_changes);

            if writes.is_empty() {
                // Fixed point: no write happened this pass, so another
                // pass would see an identical response
                break;
            }

            for write in &writes {
                self.apply_calculated_write(write);
                change.calculated_changed.push(write.link_id.clone());
            }
        }
    }

    fn apply_calculated_write(&mut self, write: &CalculatedWrite) {
        if write.answers.is_empty() {
            // Null result: clear the answer array, keep the item in the
            // tree (it is pruned at the save boundary)
            if let Some(item) = find_item_mut(&mut self.updatable_response.item, &write.link_id) {
                item.answer.clear();
            }
            return;
        }

        let Some(path) = self.model.index.path_to(&write.link_id) else {
            return;
        };
        let existing_children = find_item(&self.updatable_response.item, &write.link_id)
            .map(|item| item.item.clone())
            .unwrap_or_default();
        let mut new_item = QuestionnaireResponseItem {
            link_id: write.link_id.clone(),
            text: self
                .model
                .index
                .get(&write.link_id)
                .and_then(|entry| entry.text.clone()),
            answer: Vec::new(),
            item: existing_children,
        };
        new_item.set_answers(write.answers.iter().cloned());

        merge_at_path(
            &mut self.updatable_response.item,
            &path,
            new_item,
            &self.model.index,
            None,
        );
    }

    /// A tab loses its completeness mark when a required item inside it is
    /// enabled and unanswered (e.g. newly revealed by an enableWhen flip)
    fn update_tab_completeness(&mut self, change: &mut ChangeSet) {
        if self.tabs.is_empty() || change.enable_when_changed.is_empty() {
            return;
        }
        for changed in change.enable_when_changed.clone() {
            if !self.is_item_enabled(&changed) {
                continue;
            }
            let Some(entry) = self.model.index.get(&changed) else {
                continue;
            };
            let newly_required_unanswered = (entry.required
                && self.item_answers(&changed).is_empty())
                || self.model.index.descendants(&changed).iter().any(|d| {
                    self.model.index.get(d).map(|e| e.required).unwrap_or(false)
                        && self.is_item_enabled(d)
                        && self.item_answers(d).is_empty()
                });
            if !newly_required_unanswered {
                continue;
            }
            let tab_key = self
                .model
                .index
                .ancestors(&changed)
                .iter()
                .chain(std::iter::once(&changed.as_str()))
                .find(|candidate| self.tabs.contains_key(**candidate))
                .map(|candidate| candidate.to_string());
            if let Some(tab) = tab_key.and_then(|key| self.tabs.get_mut(&key)) {
                if tab.is_complete {
                    tab.is_complete = false;
                    change.tabs_changed = true;
                }
            }
        }
    }

    fn strip_disabled(&self, items: &mut Vec<QuestionnaireResponseItem>) {
        items.retain(|item| self.is_item_enabled(&item.link_id));
        for item in items.iter_mut() {
            self.strip_disabled(&mut item.item);
            for answer in &mut item.answer {
                self.strip_disabled(&mut answer.item);
            }
        }
    }

    /// Index of the first tab whose group is enabled
    fn first_visible_tab(&self) -> usize {
        self.tabs
            .iter()
            .find(|(link_id, _)| self.is_item_enabled(link_id))
            .map(|(_, tab)| tab.index)
            .unwrap_or(0)
    }
}

/// Merge an item into the tree along its ancestor path, creating group
/// shells for ancestors the response does not contain yet
fn merge_at_path(
    children: &mut Vec<QuestionnaireResponseItem>,
    path: &[String],
    new_item: QuestionnaireResponseItem,
    index: &crate::index::ItemIndex,
    parent: Option<&str>,
) {
    let positions = index.child_positions(parent);
    if path.len() <= 1 {
        merge_child(children, new_item, &positions);
        return;
    }

    let group_id = &path[0];
    if let Some(position) = children.iter().position(|c| &c.link_id == group_id) {
        merge_at_path(
            &mut children[position].item,
            &path[1..],
            new_item,
            index,
            Some(group_id),
        );
        if children[position].is_empty() {
            children.remove(position);
        }
        return;
    }

    if new_item.is_empty() {
        return;
    }
    // Wrap in shells for every missing ancestor, deepest first
    let mut shell = new_item;
    for ancestor in path[..path.len() - 1].iter().rev() {
        shell = QuestionnaireResponseItem {
            link_id: ancestor.clone(),
            text: index.get(ancestor).and_then(|entry| entry.text.clone()),
            answer: Vec::new(),
            item: vec![shell],
        };
    }
    merge_child(children, shell, &positions);
}

/// Decode an answerExpression result into codings: either a coding list or
/// a CodeableConcept whose codings are taken
fn codings_from_values(values: &octofhir_sdc_fhirpath::Collection) -> Vec<Coding> {
    let mut out = Vec::new();
    for value in values {
        let octofhir_sdc_fhirpath::Value::Object(json) = value else {
            continue;
        };
        if json.get("coding").is_some() {
            if let Some(codings) = json.get("coding").and_then(Json::as_array) {
                for coding in codings {
                    if let Ok(coding) = serde_json::from_value::<Coding>(coding.clone()) {
                        out.push(coding);
                    }
                }
            }
            continue;
        }
        if let Ok(coding) = serde_json::from_value::<Coding>(json.clone()) {
            if coding.code.is_some() || coding.system.is_some() {
                out.push(coding);
            }
        }
    }
    out
}
