//! OperationOutcome-style issue records
//!
//! Extraction and evaluation never abort the form over a single bad
//! extension or expression; they record an issue and carry on. These records
//! mirror the shape of FHIR OperationOutcome issues so callers can surface
//! them directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// The operation as a whole failed
    Error,
    /// Something was skipped or degraded, the operation continued
    Warning,
    /// Informational only
    Information,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSeverity::Error => write!(f, "error"),
            IssueSeverity::Warning => write!(f, "warning"),
            IssueSeverity::Information => write!(f, "information"),
        }
    }
}

/// Where an issue came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueSource {
    /// Scanning questionnaire extensions at build time
    Extraction,
    /// Evaluating a FHIRPath expression
    Evaluation,
    /// Merging response items
    ResponseSync,
    /// Resolving a value set
    ValueSet,
}

/// A single non-fatal problem, OperationOutcome style
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub source: IssueSource,
    /// Human-readable description
    pub message: String,
    /// The linkId the issue is attached to, when there is one
    pub link_id: Option<String>,
    /// The offending expression, when there is one
    pub expression: Option<String>,
}

impl Issue {
    /// Create a warning issue
    pub fn warning(source: IssueSource, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            source,
            message: message.into(),
            link_id: None,
            expression: None,
        }
    }

    /// Create an error issue
    pub fn error(source: IssueSource, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            source,
            message: message.into(),
            link_id: None,
            expression: None,
        }
    }

    /// Attach the linkId the issue relates to
    pub fn with_link_id(mut self, link_id: impl Into<String>) -> Self {
        self.link_id = Some(link_id.into());
        self
    }

    /// Attach the offending expression
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(link_id) = &self.link_id {
            write!(f, " (linkId {link_id})")?;
        }
        Ok(())
    }
}
