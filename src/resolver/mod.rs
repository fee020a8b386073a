//! Role dependency resolution
//!
//! Roles list their dependencies by qualified name (`namespace.name`). The
//! resolver turns those names into `(from_role_id, to_role_id)` edges:
//! - ids are first looked up in a map built from the roles being resolved
//!   plus the on-disk cache
//! - a role with an unknown dependency triggers one live lookup of that
//!   role, whose response embeds the dependency ids, and is retried in a
//!   second pass
//! - anything still unknown after the second pass is logged and dropped

mod cache;
mod lookup;

pub use cache::{load_mapping, save_mapping, ROLE_ID_MAPPING_FILE};
pub use lookup::{HttpRoleLookup, RoleLookup};

use crate::query::QueryError;
use crate::record::{record_id, role_dependencies, role_qualified_name, Record};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving dependencies
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("'{url}' returned {status}")]
    Status { url: String, status: u16 },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A directed dependency between two roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyEdge {
    pub from_role_id: i64,
    pub to_role_id: i64,
}

/// Resolves role dependency names into id edges
pub struct DependencyResolver<L> {
    lookup: L,
    id_map: HashMap<String, i64>,
    lookup_interval: Duration,
    mapping_file: Option<PathBuf>,
}

impl<L: RoleLookup> DependencyResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            id_map: HashMap::new(),
            lookup_interval: Duration::ZERO,
            mapping_file: None,
        }
    }

    /// Sleep after each live lookup
    pub fn with_lookup_interval(mut self, interval: Duration) -> Self {
        self.lookup_interval = interval;
        self
    }

    /// Loads `role_id_mapping.json` from `dir` and saves back to it after each resolve
    pub fn load_mapping(&mut self, dir: &Path) -> Result<(), ResolveError> {
        let path = dir.join(ROLE_ID_MAPPING_FILE);
        self.id_map.extend(load_mapping(&path)?);
        self.mapping_file = Some(path);
        Ok(())
    }

    /// Known qualified role names and their ids
    pub fn id_map(&self) -> &HashMap<String, i64> {
        &self.id_map
    }

    /// Resolves the dependency edges of `roles`
    ///
    /// Unresolvable dependencies never fail the call; only writing the
    /// on-disk cache can.
    pub async fn resolve(&mut self, roles: &[Record]) -> Result<Vec<DependencyEdge>, ResolveError> {
        for role in roles {
            if let (Some(name), Some(id)) = (role_qualified_name(role), record_id(role)) {
                self.id_map.insert(name, id);
            }
        }

        let mut edges = EdgeSet::default();
        let mut deferred = Vec::new();

        for role in roles {
            let Some(from_id) = record_id(role) else {
                continue;
            };
            if self.resolve_each(from_id, role, &mut edges).is_empty() {
                continue;
            }
            tracing::warn!(
                "Try to obtain actual depends of {} (id={}).",
                role_qualified_name(role).unwrap_or_default(),
                from_id
            );
            match self.lookup.dependencies_of(from_id).await {
                Ok(actual) => {
                    for dep in actual {
                        if let Some(id) = dep.id {
                            tracing::debug!("Update mapping => {}: {}", dep.name, id);
                            self.id_map.insert(dep.name, id);
                        }
                    }
                }
                Err(e) => tracing::warn!("Live lookup of role {} failed: {}", from_id, e),
            }
            if !self.lookup_interval.is_zero() {
                tokio::time::sleep(self.lookup_interval).await;
            }
            deferred.push((from_id, role));
        }

        for (from_id, role) in deferred {
            for name in self.resolve_each(from_id, role, &mut edges) {
                tracing::error!("{} (dependency of role {}) was not found", name, from_id);
            }
        }

        if let Some(path) = &self.mapping_file {
            save_mapping(path, &self.id_map)?;
        }

        Ok(edges.into_vec())
    }

    /// Adds every resolvable edge of `role`, returning the names that were not found
    fn resolve_each(&self, from_id: i64, role: &Record, edges: &mut EdgeSet) -> Vec<String> {
        let mut missing = Vec::new();
        for dep in role_dependencies(role) {
            match dep.id.or_else(|| self.id_map.get(&dep.name).copied()) {
                Some(to_id) => edges.insert(DependencyEdge {
                    from_role_id: from_id,
                    to_role_id: to_id,
                }),
                None => missing.push(dep.name),
            }
        }
        missing
    }
}

/// Insertion-ordered edge set
#[derive(Default)]
struct EdgeSet {
    seen: HashSet<DependencyEdge>,
    edges: Vec<DependencyEdge>,
}

impl EdgeSet {
    fn insert(&mut self, edge: DependencyEdge) {
        if self.seen.insert(edge) {
            self.edges.push(edge);
        }
    }

    fn into_vec(self) -> Vec<DependencyEdge> {
        self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DependencyRef;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Default, Clone)]
    struct MockLookup {
        answers: HashMap<i64, Vec<DependencyRef>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RoleLookup for MockLookup {
        async fn dependencies_of(&self, role_id: i64) -> Result<Vec<DependencyRef>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answers.get(&role_id).cloned().unwrap_or_default())
        }
    }

    fn role(id: i64, namespace: &str, name: &str, deps: Value) -> Record {
        json!({
            "id": id,
            "name": name,
            "summary_fields": {"namespace": {"name": namespace}, "dependencies": deps}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn edge(from: i64, to: i64) -> DependencyEdge {
        DependencyEdge {
            from_role_id: from,
            to_role_id: to,
        }
    }

    #[tokio::test]
    async fn test_three_role_cycle() {
        let roles = vec![
            role(1, "ns", "a", json!(["ns.b"])),
            role(2, "ns", "b", json!(["ns.c"])),
            role(3, "ns", "c", json!(["ns.a"])),
        ];
        let lookup = MockLookup::default();
        let calls = lookup.calls.clone();
        let mut resolver = DependencyResolver::new(lookup);

        let mut edges = resolver.resolve(&roles).await.unwrap();
        edges.sort();

        assert_eq!(edges, vec![edge(1, 2), edge(2, 3), edge(3, 1)]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_dropped() {
        let roles = vec![role(1, "ns", "a", json!(["other.missing"]))];
        let lookup = MockLookup::default();
        let calls = lookup.calls.clone();
        let mut resolver = DependencyResolver::new(lookup);

        let edges = resolver.resolve(&roles).await.unwrap();

        assert!(edges.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_live_lookup_fills_the_map() {
        let roles = vec![role(1, "ns", "a", json!(["other.base", "ns.b"])), role(2, "ns", "b", json!([]))];
        let mut lookup = MockLookup::default();
        lookup.answers.insert(
            1,
            vec![
                DependencyRef {
                    name: "other.base".to_string(),
                    id: Some(90),
                },
                DependencyRef {
                    name: "ns.b".to_string(),
                    id: Some(2),
                },
            ],
        );
        let mut resolver = DependencyResolver::new(lookup);

        let edges = resolver.resolve(&roles).await.unwrap();

        assert_eq!(edges, vec![edge(1, 2), edge(1, 90)]);
        assert_eq!(resolver.id_map().get("other.base"), Some(&90));
    }

    #[tokio::test]
    async fn test_embedded_ids_and_duplicates() {
        let roles = vec![role(
            5,
            "ns",
            "e",
            json!([{"name": "x.y", "id": 7}, "x.y", {"name": "x.y", "id": 7}]),
        )];
        let mut resolver = DependencyResolver::new(MockLookup::default());
        resolver.id_map.insert("x.y".to_string(), 7);

        let edges = resolver.resolve(&roles).await.unwrap();
        assert_eq!(edges, vec![edge(5, 7)]);
    }

    #[tokio::test]
    async fn test_mapping_file_is_used_and_updated() {
        let dir = TempDir::new().unwrap();
        let mut cached = HashMap::new();
        cached.insert("far.away".to_string(), 500);
        save_mapping(&dir.path().join(ROLE_ID_MAPPING_FILE), &cached).unwrap();

        let lookup = MockLookup::default();
        let calls = lookup.calls.clone();
        let mut resolver = DependencyResolver::new(lookup);
        resolver.load_mapping(dir.path()).unwrap();

        let roles = vec![role(1, "ns", "a", json!(["far.away"]))];
        let edges = resolver.resolve(&roles).await.unwrap();
        assert_eq!(edges, vec![edge(1, 500)]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let saved = load_mapping(&dir.path().join(ROLE_ID_MAPPING_FILE)).unwrap();
        assert_eq!(saved.get("ns.a"), Some(&1));
        assert_eq!(saved.get("far.away"), Some(&500));
    }
}
