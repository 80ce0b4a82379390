//! Value set coding cache
//!
//! Two tiers keyed by value-set URL (leading `#` stripped for contained
//! references): `processed` is filled at extraction time from contained
//! ValueSets and is always available offline; `cached` is filled lazily
//! from terminology-server expansions. Lookup order is processed → cached
//! → miss; the caller goes to the network only on a miss. Entries never
//! expire within a form session.
//!
//! Expansion requests are keyed by their resolved query string: issuing a
//! request takes an [`ExpansionTicket`], and completing it only writes the
//! cache when the ticket is still current — a superseded query or a torn
//! down form session makes the completion a no-op instead of overwriting a
//! newer entry.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use parking_lot::RwLock;

use octofhir_sdc_diagnostics::Result;
use octofhir_sdc_model::Coding;

use crate::terminology::TerminologyClient;

#[derive(Debug, Default)]
struct CacheInner {
    processed: IndexMap<String, Vec<Coding>>,
    cached: IndexMap<String, Vec<Coding>>,
    /// Resolved query string → token of the newest request for it
    in_flight: IndexMap<String, u64>,
    next_token: u64,
    session: u64,
}

/// Claim on an in-flight expansion request
#[derive(Debug, Clone)]
pub struct ExpansionTicket {
    query_key: String,
    token: u64,
    session: u64,
}

/// Shared, clone-cheap cache handle
#[derive(Debug, Clone, Default)]
pub struct ValueSetCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl ValueSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the processed tier (contained value sets, resolved at
    /// extraction)
    pub fn set_processed(&self, processed: IndexMap<String, Vec<Coding>>) {
        self.inner.write().processed = processed;
    }

    /// Strip the contained-reference prefix
    fn clean_url(url: &str) -> &str {
        url.strip_prefix('#').unwrap_or(url)
    }

    /// Look up codings: processed tier first, then runtime cache
    pub fn get(&self, value_set_url: &str) -> Option<Vec<Coding>> {
        let url = Self::clean_url(value_set_url);
        let inner = self.inner.read();
        if let Some(codings) = inner.processed.get(url) {
            return Some(codings.clone());
        }
        inner.cached.get(url).cloned()
    }

    /// Insert runtime-resolved codings directly (the `addCodingToCache`
    /// path used when the caller did its own expansion)
    pub fn add_to_cache(&self, value_set_url: &str, codings: Vec<Coding>) {
        let url = Self::clean_url(value_set_url).to_string();
        self.inner.write().cached.insert(url, codings);
    }

    /// Invalidate everything tied to the current form instance. Requests
    /// issued before this call complete as no-ops.
    pub fn start_session(&self) {
        let mut inner = self.inner.write();
        inner.session += 1;
        inner.processed.clear();
        inner.cached.clear();
        inner.in_flight.clear();
    }

    /// Register an expansion request before issuing it. A later request
    /// for the same query supersedes this ticket.
    pub fn begin_expansion(&self, value_set_url: &str, filter: Option<&str>) -> ExpansionTicket {
        let url = Self::clean_url(value_set_url);
        let query_key = match filter {
            Some(filter) => format!("{url}?filter={filter}"),
            None => url.to_string(),
        };
        let mut inner = self.inner.write();
        inner.next_token += 1;
        let token = inner.next_token;
        inner.in_flight.insert(query_key.clone(), token);
        ExpansionTicket {
            query_key,
            token,
            session: inner.session,
        }
    }

    /// Apply an expansion result. Returns false (and writes nothing) when
    /// the ticket was superseded or its session torn down. Filtered
    /// expansions are never cached as the full value set, so `cacheable`
    /// is false for them.
    pub fn complete_expansion(
        &self,
        ticket: &ExpansionTicket,
        value_set_url: &str,
        codings: Vec<Coding>,
        cacheable: bool,
    ) -> bool {
        let mut inner = self.inner.write();
        let still_current = inner.session == ticket.session
            && inner.in_flight.get(&ticket.query_key) == Some(&ticket.token);
        if inner.in_flight.get(&ticket.query_key) == Some(&ticket.token) {
            inner.in_flight.shift_remove(&ticket.query_key);
        }
        if !still_current {
            debug!("discarding stale value set expansion for {}", ticket.query_key);
            return false;
        }
        if cacheable && !codings.is_empty() {
            let url = Self::clean_url(value_set_url).to_string();
            inner.cached.insert(url, codings);
        }
        true
    }

    /// Resolve a value set: cache hit, or expand through the terminology
    /// collaborator with stale-completion protection
    pub async fn resolve(
        &self,
        value_set_url: &str,
        filter: Option<&str>,
        count: Option<u32>,
        client: &dyn TerminologyClient,
    ) -> Result<Vec<Coding>> {
        if let Some(codings) = self.get(value_set_url) {
            return Ok(codings);
        }

        let ticket = self.begin_expansion(value_set_url, filter);
        let url = Self::clean_url(value_set_url).to_string();
        let expansion = client.expand(&url, filter, count).await;

        match expansion {
            Ok(value_set) => {
                let codings = value_set.codings();
                if self.complete_expansion(&ticket, value_set_url, codings.clone(), filter.is_none())
                {
                    Ok(codings)
                } else {
                    Ok(Vec::new())
                }
            }
            Err(e) => {
                self.complete_expansion(&ticket, value_set_url, Vec::new(), false);
                Err(e)
            }
        }
    }
}
