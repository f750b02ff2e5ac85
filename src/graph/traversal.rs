//! BFS ancestor traversal over the reverse adjacency of a materialized graph.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use super::{relation_allowed, RelationEdge};

/// A node reached while walking incoming edges away from the start node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AncestorNode {
    pub path: String,
    /// Hops from the start node; direct parents are at depth 1.
    pub depth: usize,
    pub via_relation_uid: String,
    pub implied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_from_uid: Option<String>,
}

/// Traverse ancestors of `start` using BFS over incoming edges.
///
/// Every path is emitted at most once, at its shallowest depth; the start node
/// is never emitted. Ties within one node are broken by the order of `edges`.
pub fn ancestors(
    start: &str,
    edges: &[RelationEdge],
    relation_filter: Option<&[String]>,
) -> Vec<AncestorNode> {
    let mut by_target: HashMap<&str, Vec<&RelationEdge>> = HashMap::new();
    for edge in edges {
        by_target.entry(edge.to_path.as_str()).or_default().push(edge);
    }

    walk_incoming(start, relation_filter, |node| {
        by_target.get(node).into_iter().flatten().copied()
    })
}

/// BFS driver shared with the edge store, which keeps its own target index.
pub(crate) fn walk_incoming<'e, F, I>(
    start: &str,
    relation_filter: Option<&[String]>,
    incoming: F,
) -> Vec<AncestorNode>
where
    F: Fn(&str) -> I,
    I: IntoIterator<Item = &'e RelationEdge>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::new();
    let mut result = Vec::new();

    visited.insert(start.to_string());
    queue.push_back((start.to_string(), 0usize));

    while let Some((node, depth)) = queue.pop_front() {
        for edge in incoming(node.as_str()) {
            if !relation_allowed(relation_filter, &edge.relation_uid) {
                continue;
            }
            if visited.contains(&edge.from_path) {
                continue;
            }
            visited.insert(edge.from_path.clone());
            result.push(AncestorNode {
                path: edge.from_path.clone(),
                depth: depth + 1,
                via_relation_uid: edge.relation_uid.clone(),
                implied: edge.implied,
                implied_from_uid: edge.implied_from_uid.clone(),
            });
            queue.push_back((edge.from_path.clone(), depth + 1));
        }
    }

    result
}
