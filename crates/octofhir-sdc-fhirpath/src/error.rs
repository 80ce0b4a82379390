//! Evaluation and parse errors for the FHIRPath subset

use thiserror::Error;

/// Result type for FHIRPath operations
pub type EvalResult<T> = Result<T, FhirPathError>;

/// Errors raised while parsing or evaluating an expression.
///
/// The form engine catches these per-expression and degrades; nothing here
/// should abort a whole form.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FhirPathError {
    /// The expression text failed to parse
    #[error("Parse error in '{expression}': {message}")]
    Parse { expression: String, message: String },

    /// A function the subset does not implement
    #[error("Unsupported function: {name}")]
    UnknownFunction { name: String },

    /// Wrong operand type for an operator or function
    #[error("Type mismatch in {operation}: {message}")]
    TypeMismatch { operation: String, message: String },

    /// An operator needed a singleton collection and got more
    #[error("Collection of {count} items where a single value was expected ({operation})")]
    SingletonRequired { operation: String, count: usize },

    /// Bad argument to a function (wrong count, bad regex, …)
    #[error("Invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },
}

impl FhirPathError {
    /// Create a parse error
    pub fn parse(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create an unknown-function error
    pub fn unknown_function(name: impl Into<String>) -> Self {
        Self::UnknownFunction { name: name.into() }
    }

    /// Create a type-mismatch error
    pub fn type_mismatch(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a singleton-required error
    pub fn singleton_required(operation: impl Into<String>, count: usize) -> Self {
        Self::SingletonRequired {
            operation: operation.into(),
            count,
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }
}
