//! SDC error types

use thiserror::Error;

/// Errors that can cross the form engine's API boundary.
///
/// Per-expression evaluation problems and malformed extensions are *not*
/// errors: they are recorded as [`crate::Issue`]s and the form keeps
/// rendering in degraded form. `SdcError` covers the cases where an
/// operation as a whole cannot produce a usable result.
#[derive(Debug, Error)]
pub enum SdcError {
    /// The questionnaire resource is not usable at all
    #[error("Invalid questionnaire: {message}")]
    InvalidQuestionnaire { message: String },

    /// A resource failed to decode from its wire JSON shape
    #[error("Failed to decode {resource_type}: {source}")]
    Decode {
        resource_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A linkId was expected to exist in the item index
    #[error("Unknown linkId: {link_id}")]
    UnknownLinkId { link_id: String },

    /// A store mutation was attempted while another is in progress
    #[error("Re-entrant form mutation")]
    ReentrantMutation,

    /// The terminology collaborator failed; retryable by the caller
    #[error("Terminology request failed for {url}: {message}")]
    Terminology { url: String, message: String },
}

impl SdcError {
    /// Create an invalid-questionnaire error
    pub fn invalid_questionnaire(message: impl Into<String>) -> Self {
        Self::InvalidQuestionnaire {
            message: message.into(),
        }
    }

    /// Create an unknown-linkId error
    pub fn unknown_link_id(link_id: impl Into<String>) -> Self {
        Self::UnknownLinkId {
            link_id: link_id.into(),
        }
    }

    /// Create a terminology error
    pub fn terminology(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Terminology {
            url: url.into(),
            message: message.into(),
        }
    }
}
