//! SDC extension decoding
//!
//! FHIR encodes form behavior as extensions matched by URL string with
//! polymorphic `value[x]` payloads. All of that scanning happens here, once
//! per questionnaire load, producing strongly-typed specs the engine
//! consumes. A malformed extension is skipped with a warning issue; it never
//! fails the load.

use std::collections::HashSet;

use log::warn;
use once_cell::sync::Lazy;

use octofhir_sdc_diagnostics::{Issue, IssueSource};

use crate::questionnaire::{Questionnaire, QuestionnaireItem};
use crate::types::Extension;

pub const EXT_CALCULATED_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-calculatedExpression";
pub const EXT_ENABLE_WHEN_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-enableWhenExpression";
pub const EXT_ANSWER_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-answerExpression";
pub const EXT_ITEM_POPULATION_CONTEXT: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-itemPopulationContext";
pub const EXT_LAUNCH_CONTEXT: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-launchContext";
pub const EXT_PREFERRED_TERMINOLOGY_SERVER: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-preferredTerminologyServer";
pub const EXT_VARIABLE: &str = "http://hl7.org/fhir/StructureDefinition/variable";
pub const EXT_ITEM_CONTROL: &str =
    "http://hl7.org/fhir/StructureDefinition/questionnaire-itemControl";
pub const EXT_SLIDER_STEP_VALUE: &str =
    "http://hl7.org/fhir/StructureDefinition/questionnaire-sliderStepValue";
pub const EXT_CHOICE_ORIENTATION: &str =
    "http://hl7.org/fhir/StructureDefinition/questionnaire-choiceOrientation";
pub const EXT_HIDDEN: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-hidden";
pub const EXT_MAX_DECIMAL_PLACES: &str =
    "http://hl7.org/fhir/StructureDefinition/maxDecimalPlaces";

/// Extensions we recognise but deliberately carry no behavior for; seeing
/// one of these should not produce a warning.
static PASSTHROUGH_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "http://hl7.org/fhir/StructureDefinition/rendering-xhtml",
        "http://hl7.org/fhir/StructureDefinition/designNote",
        "http://hl7.org/fhir/StructureDefinition/entryFormat",
        "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-shortText",
        "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-initialExpression",
    ])
});

/// FHIRPath vs x-fhir-query variables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionLanguage {
    FhirPath,
    XFhirQuery,
}

impl ExpressionLanguage {
    fn from_mime(language: &str) -> Option<Self> {
        match language {
            "text/fhirpath" => Some(Self::FhirPath),
            "application/x-fhir-query" => Some(Self::XFhirQuery),
            _ => None,
        }
    }
}

/// A calculated-expression declaration on an item
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedExpressionSpec {
    pub link_id: String,
    pub expression: String,
}

/// An enableWhen FHIRPath expression declaration on an item
#[derive(Debug, Clone, PartialEq)]
pub struct EnableWhenExpressionSpec {
    pub link_id: String,
    pub expression: String,
}

/// An answer-expression declaration (answer options from an expression)
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerExpressionSpec {
    pub link_id: String,
    pub expression: String,
}

/// A named variable declaration
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub name: String,
    pub language: ExpressionLanguage,
    pub expression: String,
}

/// A launch context request (`%patient`, `%user`, `%encounter`, …)
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchContextSpec {
    /// Binding name exposed to expressions
    pub name: String,
    /// Requested resource type(s)
    pub resource_types: Vec<String>,
}

/// A population context declaration on a group item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPopulationContextSpec {
    pub link_id: String,
    pub name: String,
    pub expression: String,
}

/// Rendering control hints the engine cares about (tabs) plus the ones it
/// passes through to the UI layer untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemControl {
    Tab,
    TabContainer,
    Slider,
    RadioButton,
    CheckBox,
    DropDown,
    Autocomplete,
}

impl ItemControl {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "tab" => Some(Self::Tab),
            "tab-container" => Some(Self::TabContainer),
            "slider" => Some(Self::Slider),
            "radio-button" => Some(Self::RadioButton),
            "check-box" => Some(Self::CheckBox),
            "drop-down" => Some(Self::DropDown),
            "autocomplete" => Some(Self::Autocomplete),
            _ => None,
        }
    }
}

/// Decoded per-item extensions
#[derive(Debug, Clone, Default)]
pub struct ItemExtensions {
    pub calculated_expression: Option<CalculatedExpressionSpec>,
    pub enable_when_expression: Option<EnableWhenExpressionSpec>,
    pub answer_expression: Option<AnswerExpressionSpec>,
    pub item_population_context: Option<ItemPopulationContextSpec>,
    pub variables: Vec<VariableSpec>,
    pub item_control: Option<ItemControl>,
    pub slider_step: Option<i32>,
    pub choice_orientation: Option<String>,
    pub hidden: bool,
    pub max_decimal_places: Option<i32>,
    pub preferred_terminology_server: Option<String>,
}

impl ItemExtensions {
    /// Decode every recognised extension on the item.
    ///
    /// Problems are pushed onto `issues`; decode always succeeds.
    pub fn decode(item: &QuestionnaireItem, issues: &mut Vec<Issue>) -> Self {
        let mut decoded = Self::default();
        for extension in &item.extension {
            decoded.apply(&item.link_id, extension, issues);
        }
        decoded
    }

    fn apply(&mut self, link_id: &str, extension: &Extension, issues: &mut Vec<Issue>) {
        match extension.url.as_str() {
            EXT_CALCULATED_EXPRESSION => {
                match fhirpath_expression(extension) {
                    Some(expression) => {
                        self.calculated_expression = Some(CalculatedExpressionSpec {
                            link_id: link_id.to_string(),
                            expression,
                        });
                    }
                    None => skip(link_id, extension, issues),
                }
            }
            EXT_ENABLE_WHEN_EXPRESSION => match fhirpath_expression(extension) {
                Some(expression) => {
                    self.enable_when_expression = Some(EnableWhenExpressionSpec {
                        link_id: link_id.to_string(),
                        expression,
                    });
                }
                None => skip(link_id, extension, issues),
            },
            EXT_ANSWER_EXPRESSION => match fhirpath_expression(extension) {
                Some(expression) => {
                    self.answer_expression = Some(AnswerExpressionSpec {
                        link_id: link_id.to_string(),
                        expression,
                    });
                }
                None => skip(link_id, extension, issues),
            },
            EXT_ITEM_POPULATION_CONTEXT => {
                let spec = extension.value_expression.as_ref().and_then(|e| {
                    Some(ItemPopulationContextSpec {
                        link_id: link_id.to_string(),
                        name: e.name.clone()?,
                        expression: e.expression.clone()?,
                    })
                });
                match spec {
                    Some(spec) => self.item_population_context = Some(spec),
                    None => skip(link_id, extension, issues),
                }
            }
            EXT_VARIABLE => match variable_spec(extension) {
                Some(spec) => self.variables.push(spec),
                None => skip(link_id, extension, issues),
            },
            EXT_ITEM_CONTROL => {
                let control = extension
                    .value_codeable_concept
                    .as_ref()
                    .and_then(|concept| {
                        concept
                            .coding
                            .iter()
                            .filter_map(|coding| coding.code.as_deref())
                            .find_map(ItemControl::from_code)
                    });
                match control {
                    Some(control) => self.item_control = Some(control),
                    // Unrecognised control codes are a rendering concern only
                    None => {}
                }
            }
            EXT_SLIDER_STEP_VALUE => self.slider_step = extension.value_integer,
            EXT_CHOICE_ORIENTATION => {
                self.choice_orientation = extension.value_code.clone();
            }
            EXT_HIDDEN => self.hidden = extension.value_boolean.unwrap_or(false),
            EXT_MAX_DECIMAL_PLACES => self.max_decimal_places = extension.value_integer,
            EXT_PREFERRED_TERMINOLOGY_SERVER => {
                self.preferred_terminology_server = extension
                    .value_url
                    .clone()
                    .or_else(|| extension.value_uri.clone());
            }
            url if PASSTHROUGH_EXTENSIONS.contains(url) => {}
            _ => {}
        }
    }
}

/// Decoded questionnaire-level extensions
#[derive(Debug, Clone, Default)]
pub struct QuestionnaireExtensions {
    pub launch_contexts: Vec<LaunchContextSpec>,
    pub variables: Vec<VariableSpec>,
    pub preferred_terminology_server: Option<String>,
}

impl QuestionnaireExtensions {
    pub fn decode(questionnaire: &Questionnaire, issues: &mut Vec<Issue>) -> Self {
        let mut decoded = Self::default();
        for extension in &questionnaire.extension {
            match extension.url.as_str() {
                EXT_LAUNCH_CONTEXT => match launch_context_spec(extension) {
                    Some(spec) => decoded.launch_contexts.push(spec),
                    None => skip("Questionnaire", extension, issues),
                },
                EXT_VARIABLE => match variable_spec(extension) {
                    Some(spec) => decoded.variables.push(spec),
                    None => skip("Questionnaire", extension, issues),
                },
                EXT_PREFERRED_TERMINOLOGY_SERVER => {
                    decoded.preferred_terminology_server = extension
                        .value_url
                        .clone()
                        .or_else(|| extension.value_uri.clone());
                }
                _ => {}
            }
        }
        decoded
    }
}

/// Extract a text/fhirpath expression payload
fn fhirpath_expression(extension: &Extension) -> Option<String> {
    let expr = extension.value_expression.as_ref()?;
    if ExpressionLanguage::from_mime(&expr.language)? != ExpressionLanguage::FhirPath {
        return None;
    }
    expr.expression.clone()
}

fn variable_spec(extension: &Extension) -> Option<VariableSpec> {
    let expr = extension.value_expression.as_ref()?;
    Some(VariableSpec {
        name: expr.name.clone()?,
        language: ExpressionLanguage::from_mime(&expr.language)?,
        expression: expr.expression.clone()?,
    })
}

/// The launchContext extension carries `name` and `type` sub-extensions
fn launch_context_spec(extension: &Extension) -> Option<LaunchContextSpec> {
    let mut name = None;
    let mut resource_types = Vec::new();
    for sub in &extension.extension {
        match sub.url.as_str() {
            "name" => {
                name = sub
                    .value_coding
                    .as_ref()
                    .and_then(|c| c.code.clone())
                    .or_else(|| sub.value_id.clone())
                    .or_else(|| sub.value_code.clone());
            }
            "type" => {
                if let Some(code) = &sub.value_code {
                    resource_types.push(code.clone());
                }
            }
            _ => {}
        }
    }
    Some(LaunchContextSpec {
        name: name?,
        resource_types,
    })
}

fn skip(link_id: &str, extension: &Extension, issues: &mut Vec<Issue>) {
    warn!("skipping malformed extension {} on {link_id}", extension.url);
    issues.push(
        Issue::warning(
            IssueSource::Extraction,
            format!("Malformed extension {} skipped", extension.url),
        )
        .with_link_id(link_id),
    );
}
