//! Property-based tests using proptest
//!
//! These tests verify name resolution, identifier sanitization and
//! batch-size validation using randomized inputs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use forge_mcp::dispatcher::is_safe_identifier;
use forge_mcp::resolver::{is_numeric, select_matches, Candidate, Resolver};
use forge_mcp::resource::{Credentials, ResourceExecutor, ResourceKind};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Generate an arbitrary list of named candidates with unique ids
fn arb_candidates() -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::vec("[a-zA-Z][a-zA-Z0-9-]{0,12}", 0..30).prop_map(|names| {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Candidate {
                id: i as u64 + 1,
                name,
            })
            .collect()
    })
}

/// Executor that serves a fixed server listing and counts calls
struct CountingExecutor {
    servers: Vec<Value>,
    calls: AtomicUsize,
}

#[async_trait]
impl ResourceExecutor for CountingExecutor {
    async fn execute(
        &self,
        _kind: ResourceKind,
        _operation: &str,
        _args: &Map<String, Value>,
        _credentials: &Credentials,
    ) -> anyhow::Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Value::Array(self.servers.clone())))
    }
}

proptest! {
    /// Every selected candidate contains the query, case-insensitively
    #[test]
    fn selected_candidates_contain_query(
        candidates in arb_candidates(),
        query in "[a-zA-Z0-9-]{1,4}",
    ) {
        let needle = query.to_lowercase();
        for candidate in select_matches(&candidates, &query) {
            prop_assert!(candidate.name.to_lowercase().contains(&needle));
            prop_assert!(candidates.contains(&candidate));
        }
    }

    /// Nothing that partially matches is ever dropped unless a unique exact match wins
    #[test]
    fn partial_matches_are_complete(
        candidates in arb_candidates(),
        query in "[a-z]{1,3}",
    ) {
        let needle = query.to_lowercase();
        let exact = candidates.iter().filter(|c| c.name.to_lowercase() == needle).count();
        let partial = candidates.iter().filter(|c| c.name.to_lowercase().contains(&needle)).count();
        let selected = select_matches(&candidates, &query);

        if exact == 1 {
            prop_assert_eq!(selected.len(), 1);
            prop_assert_eq!(selected[0].name.to_lowercase(), needle);
        } else {
            prop_assert_eq!(selected.len(), partial);
        }
    }

    /// Adding a unique exact match always resolves to it
    #[test]
    fn unique_exact_match_wins(
        mut candidates in arb_candidates(),
        name in "[a-z]{3,8}",
    ) {
        candidates.retain(|c| c.name.to_lowercase() != name);
        candidates.push(Candidate { id: 999, name: name.to_uppercase() });
        let selected = select_matches(&candidates, &name);
        prop_assert_eq!(selected, vec![Candidate { id: 999, name: name.to_uppercase() }]);
    }

    /// Digit strings are numeric, anything with a non-digit is not
    #[test]
    fn numeric_detection(n in any::<u64>(), word in "[0-9]*[a-z_-][0-9a-z]*") {
        prop_assert!(is_numeric(&n.to_string()));
        prop_assert!(!is_numeric(&word));
    }

    /// Numeric queries pass through without a listing call
    #[test]
    fn numeric_query_never_lists(n in 1u64..1_000_000) {
        let executor = Arc::new(CountingExecutor { servers: vec![], calls: AtomicUsize::new(0) });
        let resolver = Resolver::new(executor.clone());
        let id = tokio_test::block_on(resolver.resolve_id(
            ResourceKind::Servers,
            None,
            &n.to_string(),
            &Credentials::new("t"),
        ));
        prop_assert_eq!(id.ok(), Some(n.to_string()));
        prop_assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    /// Search reports a total equal to its match count
    #[test]
    fn search_total_matches_length(
        names in prop::collection::vec("[a-z]{2,6}", 0..15),
        query in "[a-z]{1,2}",
    ) {
        let servers = names
            .iter()
            .enumerate()
            .map(|(i, name)| json!({"id": i + 1, "name": name}))
            .collect();
        let executor = Arc::new(CountingExecutor { servers, calls: AtomicUsize::new(0) });
        let resolver = Resolver::new(executor);
        let result = tokio_test::block_on(resolver.search(
            ResourceKind::Servers,
            None,
            &query,
            &Credentials::new("t"),
        ))
        .unwrap();
        prop_assert_eq!(result.total, result.matches.len());
    }

    /// Identifiers made of the allowed alphabet pass sanitization
    #[test]
    fn safe_identifiers_accepted(id in "[A-Za-z0-9_-]{1,40}") {
        prop_assert!(is_safe_identifier(&id));
    }

    /// Any separator or dot makes an identifier unsafe
    #[test]
    fn traversal_characters_rejected(
        prefix in "[a-z0-9]{0,8}",
        bad in prop_oneof!["/", "\\.", "\\.\\.", " ", "%", "\\?"],
        suffix in "[a-z0-9]{0,8}",
    ) {
        let id = format!("{}{}{}", prefix, bad, suffix);
        prop_assert!(!is_safe_identifier(&id));
    }
}
