//! FHIRPath implementation for the SDC form engine
//!
//! A deliberately scoped subset of the FHIRPath expression language: the
//! operators, literals and function library that SDC questionnaires use in
//! `enableWhenExpression`, `calculatedExpression`, `answerExpression` and
//! `variable` extensions. Expressions are parsed once (cached) and evaluated
//! against a JSON resource plus `%name` variable bindings.
//!
//! ```
//! use octofhir_sdc_fhirpath::{EvaluationContext, FhirPathEngine};
//! use serde_json::json;
//!
//! let mut engine = FhirPathEngine::new();
//! let mut context = EvaluationContext::new(json!({}));
//! context.set_variable_json("weight", &json!(81));
//! context.set_variable_json("height", &json!(180));
//!
//! let result = engine
//!     .evaluate("(%weight / ((%height / 100).power(2))).round(1)", &context)
//!     .unwrap();
//! assert_eq!(result.len(), 1);
//! ```

pub mod ast;
mod combinators;
pub mod engine;
pub mod error;
pub mod expression;
mod functions;
pub mod value;

pub use ast::{BinaryOp, Expression, Literal, UnaryOp};
pub use engine::{EvaluationContext, FhirPathEngine};
pub use error::{EvalResult, FhirPathError};
pub use expression::parse_expression;
pub use value::{to_boolean, values_compare, values_equal, Collection, Value};
