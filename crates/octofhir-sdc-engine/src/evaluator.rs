//! Expression evaluator wrapper
//!
//! Wraps the FHIRPath engine with the engine-level error policy: an
//! expression that fails to parse or evaluate becomes a warning issue and an
//! empty result, and the sibling expressions still run. The wrapper is also
//! where the `%variable` context map gets assembled.

use log::warn;
use serde_json::Value as Json;

use octofhir_sdc_diagnostics::{Issue, IssueSource};
use octofhir_sdc_fhirpath::{Collection, EvaluationContext, FhirPathEngine};

/// Shared FHIRPath engine with the per-expression degrade policy
#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
    engine: FhirPathEngine,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self {
            engine: FhirPathEngine::new(),
        }
    }

    /// Evaluate, surfacing failures as warning issues and an empty result
    pub fn evaluate_or_empty(
        &mut self,
        expression: &str,
        context: &EvaluationContext,
        link_id: Option<&str>,
        issues: &mut Vec<Issue>,
    ) -> Collection {
        match self.engine.evaluate(expression, context) {
            Ok(result) => result,
            Err(e) => {
                warn!("expression evaluation failed, treating as empty: {e}");
                let mut issue = Issue::warning(IssueSource::Evaluation, e.to_string())
                    .with_expression(expression);
                if let Some(link_id) = link_id {
                    issue = issue.with_link_id(link_id);
                }
                issues.push(issue);
                Collection::new()
            }
        }
    }

    /// Evaluate to a boolean, with the same degrade policy.
    ///
    /// Empty results and non-boolean singletons map through the FHIRPath
    /// singleton rules; a failed evaluation is `None`.
    pub fn evaluate_boolean(
        &mut self,
        expression: &str,
        context: &EvaluationContext,
        link_id: Option<&str>,
        issues: &mut Vec<Issue>,
    ) -> Option<bool> {
        let result = self.evaluate_or_empty(expression, context, link_id, issues);
        octofhir_sdc_fhirpath::to_boolean(&result)
    }

    /// Syntax-check an expression at extraction time
    pub fn check(&mut self, expression: &str) -> Result<(), octofhir_sdc_fhirpath::FhirPathError> {
        self.engine.check(expression)
    }
}

/// Inputs for building an evaluation context
pub struct ContextInputs<'a> {
    /// The current updatable response, serialised
    pub resource: &'a Json,
    /// Launch context resources by binding name
    pub launch_resources: &'a indexmap::IndexMap<String, Json>,
    /// Resolved x-fhir-query variable results by name
    pub query_results: &'a indexmap::IndexMap<String, Json>,
    /// Caller-supplied extra bindings
    pub additional_variables: &'a indexmap::IndexMap<String, Json>,
    /// Ordered FHIRPath variable declarations
    pub fhirpath_variables: &'a [octofhir_sdc_model::VariableSpec],
    /// Item population contexts, bound under their declared names
    pub population_contexts:
        &'a indexmap::IndexMap<String, octofhir_sdc_model::ItemPopulationContextSpec>,
}

/// Assemble the `%name` bindings for one evaluation round.
///
/// FHIRPath variables are evaluated in declaration order against the
/// partially-built context, so a variable can reference the ones declared
/// before it. A variable that fails stays unbound (its uses evaluate as
/// empty) rather than poisoning the round.
pub fn build_context(
    evaluator: &mut ExpressionEvaluator,
    inputs: &ContextInputs<'_>,
    issues: &mut Vec<Issue>,
) -> EvaluationContext {
    let mut context = EvaluationContext::new(inputs.resource.clone());

    for (name, resource) in inputs.launch_resources {
        context.set_variable_json(name.clone(), resource);
    }
    for (name, resource) in inputs.query_results {
        context.set_variable_json(name.clone(), resource);
    }
    for (name, value) in inputs.additional_variables {
        context.set_variable_json(name.clone(), value);
    }

    for variable in inputs.fhirpath_variables {
        let value = evaluator.evaluate_or_empty(&variable.expression, &context, None, issues);
        context.set_variable(variable.name.clone(), value);
    }

    for population_context in inputs.population_contexts.values() {
        let value = evaluator.evaluate_or_empty(
            &population_context.expression,
            &context,
            Some(&population_context.link_id),
            issues,
        );
        context.set_variable(population_context.name.clone(), value);
    }

    context
}
