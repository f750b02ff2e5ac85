//! Sibling chains: reconstructs linear sequences from pairwise sequential
//! edges (e.g. `next`) between the members of one sibling group.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::RelationEdge;

/// Sibling group split into ordered chains and unchained paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiblingChains {
    /// Chain head -> chain members in sequence order, head first.
    pub chains: BTreeMap<String, Vec<String>>,
    /// Siblings not part of any chain, in input order.
    pub disconnected: Vec<String>,
}

/// File name without directory or extension, e.g. `notes/Intro.md` -> `Intro`.
pub fn basename(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// Group `siblings` into chains linked by `sequential` relations.
///
/// Each sibling gets at most one successor: the target of its first outgoing
/// edge, in `outgoing_by_path` order, whose relation is sequential and whose
/// target is also a sibling. A component without a head (a pure cycle) is
/// headed by the member whose basename sorts first.
pub fn build_chains(
    siblings: &[String],
    outgoing_by_path: &HashMap<String, Vec<RelationEdge>>,
    sequential: &[String],
) -> SiblingChains {
    let sibling_set: HashSet<&str> = siblings.iter().map(String::as_str).collect();

    let mut next: HashMap<&str, &str> = HashMap::new();
    for path in siblings {
        let Some(outgoing) = outgoing_by_path.get(path) else {
            continue;
        };
        let successor = outgoing.iter().find(|edge| {
            sequential.iter().any(|s| *s == edge.relation_uid)
                && sibling_set.contains(edge.to_path.as_str())
        });
        if let Some(edge) = successor {
            next.insert(path.as_str(), edge.to_path.as_str());
        }
    }

    if next.is_empty() {
        return SiblingChains {
            chains: BTreeMap::new(),
            disconnected: siblings.to_vec(),
        };
    }

    let has_incoming: HashSet<&str> = next.values().copied().collect();
    // Members in sibling order so head selection does not depend on hashing.
    let members: Vec<&str> = siblings
        .iter()
        .map(String::as_str)
        .filter(|p| next.contains_key(p) || has_incoming.contains(p))
        .collect();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut chains = BTreeMap::new();

    for &head in members.iter().filter(|p| !has_incoming.contains(*p)) {
        if visited.contains(head) {
            continue;
        }
        let chain = follow(head, &next, &mut visited);
        chains.insert(head.to_string(), chain);
    }

    // Whatever is left sits on cycles nothing leads into.
    loop {
        let head = members
            .iter()
            .copied()
            .filter(|p| !visited.contains(p))
            .min_by(|a, b| basename(a).cmp(basename(b)).then_with(|| a.cmp(b)));
        let Some(head) = head else {
            break;
        };
        let chain = follow(head, &next, &mut visited);
        chains.insert(head.to_string(), chain);
    }

    let disconnected = siblings
        .iter()
        .filter(|p| !visited.contains(p.as_str()))
        .cloned()
        .collect();

    SiblingChains {
        chains,
        disconnected,
    }
}

fn follow<'a>(
    head: &'a str,
    next: &HashMap<&'a str, &'a str>,
    visited: &mut HashSet<&'a str>,
) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = head;
    while visited.insert(current) {
        chain.push(current.to_string());
        match next.get(current) {
            Some(&successor) => current = successor,
            None => break,
        }
    }
    chain
}

/// Order a sibling group: each chain is one unit keyed by its head, each
/// disconnected sibling is a unit of its own. Units are stably sorted by
/// `sort_key` of their first path and flattened; chains are never split.
pub fn order_siblings<K, F>(chains: &SiblingChains, sort_key: F) -> Vec<String>
where
    K: Ord,
    F: Fn(&str) -> K,
{
    let mut units: Vec<(K, &[String])> = chains
        .chains
        .iter()
        .map(|(head, members)| (sort_key(head), members.as_slice()))
        .chain(
            chains
                .disconnected
                .iter()
                .map(|path| (sort_key(path), std::slice::from_ref(path))),
        )
        .collect();
    units.sort_by(|a, b| a.0.cmp(&b.0));
    units
        .into_iter()
        .flat_map(|(_, paths)| paths.iter().cloned())
        .collect()
}
