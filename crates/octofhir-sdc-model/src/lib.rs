//! FHIR resource model for the SDC form engine
//!
//! This crate models the slice of FHIR R4 the form engine consumes:
//! Questionnaire, QuestionnaireResponse, ValueSet and their supporting
//! datatypes, plus the typed intermediate representation of the SDC
//! extensions (calculated expressions, enableWhen expressions, variables,
//! launch contexts, item controls).
//!
//! Two deliberate boundaries live here:
//!
//! - The polymorphic `value[x]` answer shape exists only at the wire level;
//!   everything past [`AnswerValue::from_wire`] works with a tagged union.
//! - Raw extension scanning happens once, in [`sdc`], producing typed specs.
//!   No other crate matches on extension URLs.

pub mod answer;
pub mod questionnaire;
pub mod response;
pub mod sdc;
pub mod types;
pub mod value_set;

pub use answer::AnswerValue;
pub use questionnaire::{
    EnableBehavior, EnableWhen, EnableWhenOperator, ItemType, Questionnaire, QuestionnaireItem,
};
pub use response::{QuestionnaireResponse, QuestionnaireResponseAnswer, QuestionnaireResponseItem};
pub use sdc::{
    AnswerExpressionSpec, CalculatedExpressionSpec, EnableWhenExpressionSpec, ExpressionLanguage,
    ItemControl, ItemExtensions, ItemPopulationContextSpec, LaunchContextSpec,
    QuestionnaireExtensions, VariableSpec,
};
pub use types::{Attachment, Coding, Expression, Extension, Quantity, Reference};
pub use value_set::{ValueSet, ValueSetExpansionContains};
