//! FHIR Structured Data Capture (SDC) form engine for Rust
//!
//! This crate re-exports the full forms stack:
//! - Render-model extraction from a Questionnaire (enableWhen conditions,
//!   calculated expressions, variables, launch contexts, tabs, contained
//!   value sets)
//! - A FHIRPath subset engine for the SDC expression extensions
//! - The incremental evaluation core: activation state, calculated values,
//!   order-preserving response merges, value-set caching
//! - The [`FormStore`] aggregate a hosting application owns and mutates
//!
//! # Example
//!
//! ```
//! use indexmap::IndexMap;
//! use octofhir_sdc::{AnswerValue, FormStore, Questionnaire};
//!
//! let questionnaire: Questionnaire = serde_json::from_value(serde_json::json!({
//!     "resourceType": "Questionnaire",
//!     "status": "active",
//!     "item": [
//!         {"linkId": "q-age", "type": "integer", "text": "Age"},
//!         {
//!             "linkId": "senior-note",
//!             "type": "display",
//!             "enableWhen": [
//!                 {"question": "q-age", "operator": ">=", "answerInteger": 65}
//!             ]
//!         }
//!     ]
//! })).unwrap();
//!
//! let mut form = FormStore::build(questionnaire, None, IndexMap::new()).unwrap();
//! assert!(!form.is_item_enabled("senior-note"));
//!
//! form.update_item_answer("q-age", vec![AnswerValue::Integer(70)]).unwrap();
//! assert!(form.is_item_enabled("senior-note"));
//! ```

// Re-export all public APIs from internal crates
pub use octofhir_sdc_diagnostics as diagnostics;
pub use octofhir_sdc_engine as engine;
pub use octofhir_sdc_fhirpath as fhirpath;
pub use octofhir_sdc_model as model;

// Convenience re-exports
pub use octofhir_sdc_diagnostics::{Issue, IssueSeverity, Result, SdcError};
pub use octofhir_sdc_engine::{
    ChangeSet, FormStore, InvalidKind, QuestionnaireModel, SavePolicy, StaticTerminology, Tab,
    TerminologyClient, ValueSetCache,
};
pub use octofhir_sdc_fhirpath::{EvaluationContext, FhirPathEngine};
pub use octofhir_sdc_model::{
    AnswerValue, Coding, Questionnaire, QuestionnaireItem, QuestionnaireResponse,
    QuestionnaireResponseItem, ValueSet,
};
