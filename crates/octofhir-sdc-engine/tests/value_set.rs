//! Value set cache behavior

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use octofhir_sdc_diagnostics::Result;
use octofhir_sdc_engine::{StaticTerminology, TerminologyClient, ValueSetCache};
use octofhir_sdc_model::{Coding, ValueSet};
use pretty_assertions::assert_eq;
use serde_json::json;

fn coding(code: &str, display: &str) -> Coding {
    Coding {
        system: Some("http://example.org/cs".to_string()),
        code: Some(code.to_string()),
        display: Some(display.to_string()),
        ..Coding::default()
    }
}

fn expansion(codes: &[(&str, &str)]) -> ValueSet {
    serde_json::from_value(json!({
        "resourceType": "ValueSet",
        "expansion": {
            "contains": codes.iter().map(|(code, display)| json!({
                "system": "http://example.org/cs",
                "code": code,
                "display": display
            })).collect::<Vec<_>>()
        }
    }))
    .unwrap()
}

/// Counts expand calls so tests can prove cache hits avoid the network
struct CountingTerminology {
    inner: StaticTerminology,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TerminologyClient for CountingTerminology {
    async fn expand(
        &self,
        value_set_url: &str,
        filter: Option<&str>,
        count: Option<u32>,
    ) -> Result<ValueSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.expand(value_set_url, filter, count).await
    }
}

#[test]
fn cache_hit_returns_without_network() {
    let cache = ValueSetCache::new();
    cache.add_to_cache("https://x/ValueSet/1", vec![coding("a", "Alpha")]);

    assert_eq!(
        cache.get("https://x/ValueSet/1"),
        Some(vec![coding("a", "Alpha")])
    );
}

#[test]
fn contained_reference_strips_hash_prefix() {
    let cache = ValueSetCache::new();
    let mut processed = IndexMap::new();
    processed.insert("yesno".to_string(), vec![coding("y", "Yes")]);
    cache.set_processed(processed);

    assert_eq!(cache.get("#yesno"), Some(vec![coding("y", "Yes")]));
    assert_eq!(cache.get("yesno"), Some(vec![coding("y", "Yes")]));
}

#[test]
fn processed_tier_wins_over_cached() {
    let cache = ValueSetCache::new();
    let mut processed = IndexMap::new();
    processed.insert("https://x/ValueSet/1".to_string(), vec![coding("p", "Processed")]);
    cache.set_processed(processed);
    cache.add_to_cache("https://x/ValueSet/1", vec![coding("c", "Cached")]);

    assert_eq!(
        cache.get("https://x/ValueSet/1"),
        Some(vec![coding("p", "Processed")])
    );
}

#[tokio::test]
async fn resolve_populates_cache_and_skips_network_after() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = CountingTerminology {
        inner: StaticTerminology::new()
            .with_value_set("https://x/ValueSet/1", expansion(&[("a", "Alpha")])),
        calls: calls.clone(),
    };
    let cache = ValueSetCache::new();

    let first = cache
        .resolve("https://x/ValueSet/1", None, None, &client)
        .await
        .unwrap();
    assert_eq!(first, vec![coding("a", "Alpha")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let second = cache
        .resolve("https://x/ValueSet/1", None, None, &client)
        .await
        .unwrap();
    assert_eq!(second, vec![coding("a", "Alpha")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second lookup must hit the cache");
}

#[test]
fn stale_session_result_is_discarded() {
    let cache = ValueSetCache::new();

    // Tear the form down while the request is in flight: a new session
    // invalidates every outstanding ticket
    let ticket = cache.begin_expansion("https://x/ValueSet/1", None);
    cache.start_session();

    let applied =
        cache.complete_expansion(&ticket, "https://x/ValueSet/1", vec![coding("a", "Alpha")], true);
    assert!(!applied);
    assert_eq!(cache.get("https://x/ValueSet/1"), None);
}

#[test]
fn superseded_request_is_discarded() {
    let cache = ValueSetCache::new();

    // Two requests for the same query: the older completion must not
    // overwrite the newer one
    let stale = cache.begin_expansion("https://x/ValueSet/1", None);
    let fresh = cache.begin_expansion("https://x/ValueSet/1", None);

    let applied =
        cache.complete_expansion(&stale, "https://x/ValueSet/1", vec![coding("old", "Old")], true);
    assert!(!applied);

    let applied =
        cache.complete_expansion(&fresh, "https://x/ValueSet/1", vec![coding("new", "New")], true);
    assert!(applied);
    assert_eq!(
        cache.get("https://x/ValueSet/1"),
        Some(vec![coding("new", "New")])
    );
}

#[tokio::test]
async fn expansion_failure_is_an_error_not_a_cache_write() {
    let client = StaticTerminology::new();
    let cache = ValueSetCache::new();

    let result = cache.resolve("https://x/ValueSet/unknown", None, None, &client).await;
    assert!(result.is_err());
    assert_eq!(cache.get("https://x/ValueSet/unknown"), None);
}

#[tokio::test]
async fn filtered_lookup_is_not_cached_as_full_expansion() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = CountingTerminology {
        inner: StaticTerminology::new()
            .with_value_set("https://x/ValueSet/1", expansion(&[("a", "Alpha")])),
        calls: calls.clone(),
    };
    let cache = ValueSetCache::new();

    cache
        .resolve("https://x/ValueSet/1", Some("alp"), Some(10), &client)
        .await
        .unwrap();
    assert_eq!(
        cache.get("https://x/ValueSet/1"),
        None,
        "a filtered expansion must not masquerade as the full value set"
    );
}
