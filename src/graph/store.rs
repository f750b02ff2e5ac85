//! Edge store: per-document explicit edges, the rule-expanded edge cache and
//! the target index, with incremental update, rename and delete.
//!
//! All state sits behind one mutex. Every write invalidates the cached
//! materialization before releasing the lock, so a later `materialize` always
//! observes it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traversal::{walk_incoming, AncestorNode};
use super::{relation_allowed, rules, RelationEdge, RelationType};
use crate::error::Result;

/// Reparse hook used by [`EdgeStore::ensure_fresh`].
pub trait DocumentSource {
    /// Every document currently in the corpus.
    fn document_paths(&self) -> Result<Vec<String>>;

    /// Explicit edges declared by `path`, or `None` when the document no
    /// longer exists.
    fn document_edges(&self, path: &str) -> Result<Option<Vec<RelationEdge>>>;
}

struct Materialized {
    edges: Arc<Vec<RelationEdge>>,
    edges_by_target: HashMap<String, Vec<usize>>,
    edges_by_origin: HashMap<String, Vec<usize>>,
}

impl Materialized {
    fn build(edges: Vec<RelationEdge>) -> Self {
        let mut edges_by_target: HashMap<String, Vec<usize>> = HashMap::new();
        let mut edges_by_origin: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            edges_by_target.entry(edge.to_path.clone()).or_default().push(i);
            edges_by_origin.entry(edge.from_path.clone()).or_default().push(i);
        }
        Self {
            edges: Arc::new(edges),
            edges_by_target,
            edges_by_origin,
        }
    }

    fn select<'a>(
        &'a self,
        index: &'a HashMap<String, Vec<usize>>,
        path: &str,
    ) -> impl Iterator<Item = &'a RelationEdge> + 'a {
        index
            .get(path)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }
}

#[derive(Default)]
struct StoreState {
    rules: Vec<RelationType>,
    /// Owner document -> explicit edges it declared. Ordered so flattening is
    /// deterministic.
    edges_by_source: BTreeMap<String, Vec<RelationEdge>>,
    cache: Option<Materialized>,
    all_stale: bool,
    stale_files: HashSet<String>,
    generation: u64,
}

impl StoreState {
    fn invalidate(&mut self) {
        self.cache = None;
        self.generation += 1;
    }

    fn replace_document(&mut self, path: &str, mut edges: Vec<RelationEdge>) {
        dedup_edges(&mut edges);
        if edges.is_empty() {
            self.edges_by_source.remove(path);
        } else {
            self.edges_by_source.insert(path.to_string(), edges);
        }
        self.invalidate();
    }

    fn remove_document(&mut self, path: &str) -> bool {
        let mut changed = self.edges_by_source.remove(path).is_some();
        for edges in self.edges_by_source.values_mut() {
            let before = edges.len();
            edges.retain(|e| !e.touches(path));
            changed |= edges.len() != before;
        }
        self.edges_by_source.retain(|_, edges| !edges.is_empty());
        if changed {
            self.invalidate();
        }
        changed
    }

    fn rename_document(&mut self, old_path: &str, new_path: &str) -> bool {
        let mut changed = false;
        if let Some(own) = self.edges_by_source.remove(old_path) {
            // Endpoints are rewritten by the pass below together with everyone else's.
            self.edges_by_source
                .entry(new_path.to_string())
                .or_default()
                .extend(own);
            changed = true;
        }
        for edges in self.edges_by_source.values_mut() {
            let mut touched = false;
            for edge in edges.iter_mut() {
                touched |= rewrite_endpoint(edge, old_path, new_path);
            }
            if touched {
                dedup_edges(edges);
                changed = true;
            }
        }
        if self.stale_files.remove(old_path) {
            self.stale_files.insert(new_path.to_string());
        }
        if changed {
            self.invalidate();
        }
        changed
    }

    fn materialized(&mut self) -> &Materialized {
        self.cache
            .get_or_insert_with(|| materialize_explicit(&self.edges_by_source, &self.rules))
    }
}

/// Flatten the per-document lists (first edge per key wins) and expand them.
fn materialize_explicit(
    edges_by_source: &BTreeMap<String, Vec<RelationEdge>>,
    rules: &[RelationType],
) -> Materialized {
    let mut seen = HashSet::new();
    let explicit: Vec<RelationEdge> = edges_by_source
        .values()
        .flatten()
        .filter(|e| seen.insert(e.edge_key()))
        .cloned()
        .collect();
    let edges = rules::apply(&explicit, rules);
    log::debug!(
        "materialized {} edges ({} explicit) from {} documents",
        edges.len(),
        explicit.len(),
        edges_by_source.len()
    );
    Materialized::build(edges)
}

/// Rewrites `old` endpoints to `new`; returns whether anything changed.
fn rewrite_endpoint(edge: &mut RelationEdge, old_path: &str, new_path: &str) -> bool {
    let mut changed = false;
    if edge.from_path == old_path {
        edge.from_path = new_path.to_string();
        changed = true;
    }
    if edge.to_path == old_path {
        edge.to_path = new_path.to_string();
        changed = true;
    }
    changed
}

/// Keeps the first edge for each edge key.
fn dedup_edges(edges: &mut Vec<RelationEdge>) {
    let mut seen: HashSet<(String, String, String, Option<String>)> = HashSet::new();
    edges.retain(|e| {
        seen.insert((
            e.from_path.clone(),
            e.to_path.clone(),
            e.relation_uid.clone(),
            e.label.clone(),
        ))
    });
}

/// Owner of the aggregate edge set. Cheap to share behind an `Arc`.
pub struct EdgeStore {
    state: Mutex<StoreState>,
}

impl EdgeStore {
    /// Create an empty store using `rules` for materialization.
    pub fn new(rules: Vec<RelationType>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                rules,
                ..StoreState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the explicit edges owned by `path`.
    pub fn update_file(&self, path: &str, edges: Vec<RelationEdge>) {
        let mut state = self.state();
        state.stale_files.remove(path);
        state.replace_document(path, edges);
    }

    /// Remove `path`'s edges and every other document's edges pointing at it.
    pub fn delete(&self, path: &str) {
        let mut state = self.state();
        state.stale_files.remove(path);
        if state.remove_document(path) {
            log::debug!("store: deleted {}", path);
        }
    }

    /// Move every edge endpoint from `old_path` to `new_path` in one step.
    pub fn rename(&self, old_path: &str, new_path: &str) {
        if old_path == new_path {
            return;
        }
        if self.state().rename_document(old_path, new_path) {
            log::debug!("store: renamed {} -> {}", old_path, new_path);
        }
    }

    /// Defer a reparse of `path` until the next [`ensure_fresh`](Self::ensure_fresh).
    pub fn mark_stale(&self, path: &str) {
        self.state().stale_files.insert(path.to_string());
    }

    /// Defer a reparse of the whole corpus.
    pub fn mark_all_stale(&self) {
        self.state().all_stale = true;
    }

    pub fn is_stale(&self) -> bool {
        let state = self.state();
        state.all_stale || !state.stale_files.is_empty()
    }

    /// Reparse whatever was marked stale. Returns the number of documents read.
    ///
    /// On a source error the remaining documents stay stale and the error is
    /// returned; documents already reparsed keep their new edges.
    pub fn ensure_fresh(&self, source: &dyn DocumentSource) -> Result<usize> {
        let mut state = self.state();

        if state.all_stale {
            let paths = source.document_paths()?;
            let mut fresh = BTreeMap::new();
            for path in &paths {
                if let Some(mut edges) = source.document_edges(path)? {
                    dedup_edges(&mut edges);
                    if !edges.is_empty() {
                        fresh.insert(path.clone(), edges);
                    }
                }
            }
            state.edges_by_source = fresh;
            state.all_stale = false;
            state.stale_files.clear();
            state.invalidate();
            log::debug!("store: rebuilt from {} documents", paths.len());
            return Ok(paths.len());
        }

        let mut stale: Vec<String> = state.stale_files.iter().cloned().collect();
        stale.sort();
        for path in &stale {
            match source.document_edges(path)? {
                Some(edges) => state.replace_document(path, edges),
                None => {
                    state.remove_document(path);
                }
            }
            state.stale_files.remove(path);
        }
        Ok(stale.len())
    }

    /// Replace the relation rule set. Explicit edges are kept.
    pub fn set_rules(&self, rules: Vec<RelationType>) {
        let mut state = self.state();
        state.rules = rules;
        state.invalidate();
    }

    pub fn rules(&self) -> Vec<RelationType> {
        self.state().rules.clone()
    }

    /// Bumped on every invalidation of the materialized graph.
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Number of documents that own at least one explicit edge.
    pub fn document_count(&self) -> usize {
        self.state().edges_by_source.len()
    }

    /// Explicit edges declared by `path`.
    pub fn explicit_edges(&self, path: &str) -> Vec<RelationEdge> {
        self.state()
            .edges_by_source
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Full explicit + implied edge set; cached until the next write.
    pub fn materialize(&self) -> Arc<Vec<RelationEdge>> {
        let mut state = self.state();
        Arc::clone(&state.materialized().edges)
    }

    /// Materialized edges leaving `path`, optionally restricted to some relations.
    pub fn outgoing(&self, path: &str, relation_filter: Option<&[String]>) -> Vec<RelationEdge> {
        let mut state = self.state();
        let m = state.materialized();
        m.select(&m.edges_by_origin, path)
            .filter(|e| relation_allowed(relation_filter, &e.relation_uid))
            .cloned()
            .collect()
    }

    /// Materialized edges arriving at `path`, optionally restricted to some relations.
    pub fn incoming(&self, path: &str, relation_filter: Option<&[String]>) -> Vec<RelationEdge> {
        let mut state = self.state();
        let m = state.materialized();
        m.select(&m.edges_by_target, path)
            .filter(|e| relation_allowed(relation_filter, &e.relation_uid))
            .cloned()
            .collect()
    }

    /// Outgoing materialized edges for each of `paths`, keyed by path.
    pub fn outgoing_by_path(&self, paths: &[String]) -> HashMap<String, Vec<RelationEdge>> {
        let mut state = self.state();
        let m = state.materialized();
        paths
            .iter()
            .map(|p| (p.clone(), m.select(&m.edges_by_origin, p).cloned().collect()))
            .collect()
    }

    /// BFS ancestors of `path` over the materialized graph.
    pub fn ancestors(&self, path: &str, relation_filter: Option<&[String]>) -> Vec<AncestorNode> {
        let mut state = self.state();
        let m = state.materialized();
        walk_incoming(path, relation_filter, |node| {
            m.select(&m.edges_by_target, node)
        })
    }
}

impl Default for EdgeStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
