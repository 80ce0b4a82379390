//! ValueSet model, limited to compose/expansion consumption
//!
//! Two paths feed the engine's coding caches: contained ValueSets with an
//! inline compose (resolved eagerly at extraction, no network) and `$expand`
//! results from a terminology server (`expansion.contains`).

use serde::{Deserialize, Serialize};

use crate::types::Coding;

/// FHIR `ValueSet`, the slice the engine reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSet {
    #[serde(rename = "resourceType", default)]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose: Option<ValueSetCompose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ValueSetExpansion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSetCompose {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<ValueSetInclude>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetInclude {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<ValueSetConcept>,
    /// Filter/value-set includes need a terminology server; the extractor
    /// leaves those to the runtime cache
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_set: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSetConcept {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSetExpansion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<ValueSetExpansionContains>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSetExpansionContains {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ValueSet {
    /// Flatten this value set into codings, preferring the expansion when
    /// present and falling back to directly-enumerated compose concepts
    pub fn codings(&self) -> Vec<Coding> {
        if let Some(expansion) = &self.expansion {
            if !expansion.contains.is_empty() {
                return expansion
                    .contains
                    .iter()
                    .map(|c| Coding {
                        system: c.system.clone(),
                        version: c.version.clone(),
                        code: c.code.clone(),
                        display: c.display.clone(),
                    })
                    .collect();
            }
        }

        let Some(compose) = &self.compose else {
            return Vec::new();
        };
        compose
            .include
            .iter()
            .flat_map(|include| {
                include.concept.iter().map(|concept| Coding {
                    system: include.system.clone(),
                    version: include.version.clone(),
                    code: Some(concept.code.clone()),
                    display: concept.display.clone(),
                })
            })
            .collect()
    }
}
