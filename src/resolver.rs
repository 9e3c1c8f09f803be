//! Name Resolver
//!
//! Turns a human-entered name into the numeric identifier an executor
//! requires, by listing candidates and matching case-insensitively.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::resource::{Credentials, ResourceExecutor, ResourceKind, Scope};

/// One resolvable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub id: u64,
    pub name: String,
}

/// Resolution outcome; `total` always equals `matches.len()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveResult {
    pub query: String,
    pub matches: Vec<Candidate>,
    pub total: usize,
}

impl ResolveResult {
    fn new(query: &str, matches: Vec<Candidate>) -> Self {
        Self {
            query: query.to_string(),
            total: matches.len(),
            matches,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No {kind} found matching \"{query}\". Use action \"list\" to see what exists, or pass the numeric id.")]
    NotFound { kind: &'static str, query: String },

    #[error("{}", ambiguous_message(.kind, .query, .candidates))]
    Ambiguous {
        kind: &'static str,
        query: String,
        candidates: Vec<Candidate>,
    },

    #[error("Cannot resolve {kind} \"{query}\" without a numeric {parent_field}. Pass the parent's id or name first.")]
    MissingParent {
        kind: &'static str,
        query: String,
        parent_field: &'static str,
    },

    #[error("{kind} cannot be looked up by name; pass the numeric id")]
    NotResolvable { kind: &'static str },

    #[error("Failed to look up {kind}: {message}")]
    Lookup { kind: &'static str, message: String },
}

fn ambiguous_message(kind: &str, query: &str, candidates: &[Candidate]) -> String {
    let mut out = format!(
        "Multiple {} match \"{}\" ({}):\n",
        kind,
        query,
        candidates.len()
    );
    for c in candidates {
        out.push_str(&format!("  - {} (#{})\n", c.name, c.id));
    }
    out.push_str("Use the numeric id, or a more specific name (action \"resolve\" lists matches).");
    out
}

/// Numeric identifiers always pass through unresolved
pub fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Apply the selection rule: a single exact match wins, otherwise every
/// partial match is returned. Matching is case-insensitive.
pub fn select_matches(candidates: &[Candidate], query: &str) -> Vec<Candidate> {
    let needle = query.to_lowercase();

    let mut exact = Vec::new();
    let mut partial = Vec::new();
    for candidate in candidates {
        let name = candidate.name.to_lowercase();
        if name == needle {
            exact.push(candidate.clone());
        }
        if name.contains(&needle) {
            partial.push(candidate.clone());
        }
    }

    if exact.len() == 1 {
        exact
    } else {
        partial
    }
}

/// Field of the parent identifier for child kinds
fn parent_field(kind: ResourceKind) -> Option<&'static str> {
    match kind.def().scope {
        Scope::Root => None,
        Scope::Server => Some("server_id"),
        Scope::Site => Some("site_id"),
    }
}

fn candidate_id(item: &Value) -> Option<u64> {
    match item.get("id")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Resolver over a listing executor
#[derive(Clone)]
pub struct Resolver {
    executor: Arc<dyn ResourceExecutor>,
}

impl Resolver {
    pub fn new(executor: Arc<dyn ResourceExecutor>) -> Self {
        Self { executor }
    }

    /// Resolve `query` among the `kind` entities (scoped under `parent_id`
    /// for child kinds). Ambiguity and absence are errors.
    pub async fn resolve(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
        query: &str,
        credentials: &Credentials,
    ) -> Result<ResolveResult, ResolveError> {
        let def = kind.def();
        let matches = self.lookup(kind, parent_id, query, credentials).await?;

        match matches.len() {
            0 => Err(ResolveError::NotFound {
                kind: def.name,
                query: query.to_string(),
            }),
            1 => Ok(ResolveResult::new(query, matches)),
            _ => Err(ResolveError::Ambiguous {
                kind: def.name,
                query: query.to_string(),
                candidates: matches,
            }),
        }
    }

    /// Like [`Self::resolve`] but returns the selected set even when it is
    /// empty or has several members. Backs the `resolve` action.
    pub async fn search(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
        query: &str,
        credentials: &Credentials,
    ) -> Result<ResolveResult, ResolveError> {
        let matches = self.lookup(kind, parent_id, query, credentials).await?;
        Ok(ResolveResult::new(query, matches))
    }

    /// Resolve to a single identifier string
    pub async fn resolve_id(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
        query: &str,
        credentials: &Credentials,
    ) -> Result<String, ResolveError> {
        let result = self.resolve(kind, parent_id, query, credentials).await?;
        result
            .matches
            .first()
            .map(|c| c.id.to_string())
            .ok_or_else(|| ResolveError::NotFound {
                kind: kind.name(),
                query: query.to_string(),
            })
    }

    async fn lookup(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
        query: &str,
        credentials: &Credentials,
    ) -> Result<Vec<Candidate>, ResolveError> {
        let def = kind.def();

        if is_numeric(query) {
            let id = query.parse().map_err(|_| ResolveError::NotFound {
                kind: def.name,
                query: query.to_string(),
            })?;
            return Ok(vec![Candidate {
                id,
                name: query.to_string(),
            }]);
        }

        let Some(name_field) = def.name_field else {
            return Err(ResolveError::NotResolvable { kind: def.name });
        };

        let mut args = Map::new();
        if let Some(field) = parent_field(kind) {
            match parent_id {
                Some(parent) if is_numeric(parent) => {
                    args.insert(field.to_string(), Value::String(parent.to_string()));
                }
                _ => {
                    return Err(ResolveError::MissingParent {
                        kind: def.name,
                        query: query.to_string(),
                        parent_field: field,
                    })
                }
            }
        }

        tracing::debug!("resolving {} \"{}\"", def.name, query);

        let listing = self
            .executor
            .execute(kind, "list", &args, credentials)
            .await
            .map_err(|e| ResolveError::Lookup {
                kind: def.name,
                message: crate::forge::format_forge_error(&e),
            })?;

        let candidates: Vec<Candidate> = listing
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(Candidate {
                            id: candidate_id(item)?,
                            name: item.get(name_field)?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(select_matches(&candidates, query))
    }
}
