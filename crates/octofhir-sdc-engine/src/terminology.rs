//! Terminology collaborator interface
//!
//! The engine only ever asks for `$expand` and only reads
//! `expansion.contains` from the result. The HTTP implementation lives
//! outside the engine; tests use a static in-memory provider.

use async_trait::async_trait;

use octofhir_sdc_diagnostics::Result;
use octofhir_sdc_model::ValueSet;

/// External terminology server interface consumed on value-set cache misses
#[async_trait]
pub trait TerminologyClient: Send + Sync {
    /// Expand a value set, optionally filtered by a search term and capped
    /// at `count` codings
    async fn expand(
        &self,
        value_set_url: &str,
        filter: Option<&str>,
        count: Option<u32>,
    ) -> Result<ValueSet>;
}

/// In-memory provider used by tests and offline tooling
#[derive(Debug, Default)]
pub struct StaticTerminology {
    value_sets: indexmap::IndexMap<String, ValueSet>,
}

impl StaticTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expansion for a url
    pub fn with_value_set(mut self, url: impl Into<String>, value_set: ValueSet) -> Self {
        self.value_sets.insert(url.into(), value_set);
        self
    }
}

#[async_trait]
impl TerminologyClient for StaticTerminology {
    async fn expand(
        &self,
        value_set_url: &str,
        _filter: Option<&str>,
        _count: Option<u32>,
    ) -> Result<ValueSet> {
        self.value_sets.get(value_set_url).cloned().ok_or_else(|| {
            octofhir_sdc_diagnostics::SdcError::terminology(value_set_url, "value set not found")
        })
    }
}
