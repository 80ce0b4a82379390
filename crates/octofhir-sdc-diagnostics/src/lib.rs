//! SDC diagnostics and error handling
//!
//! This crate provides the error handling infrastructure for the SDC form
//! engine: the top-level error type, and the OperationOutcome-style issue
//! records used to surface non-fatal extraction and evaluation problems.

mod error;
mod issue;

pub use error::*;
pub use issue::*;

/// Result type for SDC operations
pub type Result<T> = std::result::Result<T, SdcError>;
