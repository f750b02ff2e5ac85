//! Implication rules: derives implied edges from explicit ones.
//!
//! Output is the input edges unchanged, followed by derived edges in a fixed
//! order: per-edge rules in input order, then shared-target siblings, then
//! shared-source siblings. Sibling groups are formed over the input plus the
//! per-edge derivations. Grouping keeps first-encounter order so repeated
//! runs over the same input produce identical output.

use std::collections::{HashMap, HashSet};

use super::{Direction, EdgeKey, RelationEdge, RelationType, RouteKey};

/// Apply `rules` to `edges`, returning the explicit edges followed by every
/// newly implied edge.
///
/// A candidate is dropped when its edge key already exists, or when an input
/// edge already occupies its route under any label.
pub fn apply(edges: &[RelationEdge], rules: &[RelationType]) -> Vec<RelationEdge> {
    if rules.is_empty() {
        return edges.to_vec();
    }

    let by_relation = index_rules(rules);
    if by_relation.is_empty() {
        return edges.to_vec();
    }

    let mut per_edge = Derivation::seeded(edges);

    for edge in edges {
        let Some(relation_rules) = by_relation.get(edge.relation_uid.as_str()) else {
            continue;
        };
        for &(target, direction) in relation_rules {
            if direction.derives_forward() {
                per_edge.offer(&edge.from_path, &edge.to_path, target, &edge.relation_uid);
            }
            if direction.derives_reverse() {
                per_edge.offer(&edge.to_path, &edge.from_path, target, &edge.relation_uid);
            }
        }
    }
    let expanded = per_edge.finish();

    let sibling_targets: HashMap<&str, Vec<&str>> = by_relation
        .iter()
        .filter_map(|(relation, rules)| {
            let targets: Vec<&str> = rules
                .iter()
                .filter(|(_, direction)| *direction == Direction::Sibling)
                .map(|(target, _)| *target)
                .collect();
            (!targets.is_empty()).then_some((*relation, targets))
        })
        .collect();

    let derived = if sibling_targets.is_empty() {
        expanded
    } else {
        // Groups see per-edge derivations too, so `up` edges alone still give
        // their parent's `down` children siblings. Implied edges are unlabeled,
        // so their routes block nothing their keys would not.
        let mut siblings = Derivation::seeded(&expanded);
        // Children pointing at a shared parent.
        let shared_target = group_peers(&expanded, &sibling_targets, |e| (&e.to_path, &e.from_path));
        // Children listed by a shared parent.
        let shared_source = group_peers(&expanded, &sibling_targets, |e| (&e.from_path, &e.to_path));

        for group in shared_target.iter().chain(shared_source.iter()) {
            derive_siblings(group, &sibling_targets, &mut siblings);
        }
        siblings.finish()
    };

    log::debug!(
        "rules: {} explicit edges, {} implied",
        edges.len(),
        derived.len() - edges.len()
    );
    derived
}

/// relation uid -> (target uid, direction) in declaration order.
/// Rules with an empty owner or target are skipped.
fn index_rules(rules: &[RelationType]) -> HashMap<&str, Vec<(&str, Direction)>> {
    let mut by_relation: HashMap<&str, Vec<(&str, Direction)>> = HashMap::new();
    for relation in rules {
        if relation.uid.is_empty() {
            continue;
        }
        for rule in &relation.implied {
            if rule.target.is_empty() {
                continue;
            }
            by_relation
                .entry(relation.uid.as_str())
                .or_default()
                .push((rule.target.as_str(), rule.direction));
        }
    }
    by_relation
}

struct Derivation<'a> {
    seen: HashSet<EdgeKey<'a>>,
    routes: HashSet<RouteKey<'a>>,
    out: Vec<RelationEdge>,
}

impl<'a> Derivation<'a> {
    fn seeded(edges: &'a [RelationEdge]) -> Self {
        Self {
            seen: edges.iter().map(RelationEdge::edge_key).collect(),
            routes: edges.iter().map(RelationEdge::route_key).collect(),
            out: edges.to_vec(),
        }
    }

    fn offer(&mut self, from: &'a str, to: &'a str, relation: &'a str, implied_from: &str) {
        let key = EdgeKey {
            from_path: from,
            to_path: to,
            relation_uid: relation,
            label: None,
        };
        let route = RouteKey {
            from_path: from,
            to_path: to,
            relation_uid: relation,
        };
        if self.seen.contains(&key) || self.routes.contains(&route) {
            return;
        }
        self.seen.insert(key);
        self.out
            .push(RelationEdge::derived(from, to, relation, implied_from));
    }

    fn finish(self) -> Vec<RelationEdge> {
        self.out
    }
}

/// Edges sharing one endpoint under one relation; `peers` are the other
/// endpoints in encounter order.
struct PeerGroup<'a> {
    relation: &'a str,
    peers: Vec<&'a str>,
}

fn group_peers<'a, F>(
    edges: &'a [RelationEdge],
    sibling_targets: &HashMap<&str, Vec<&str>>,
    endpoints: F,
) -> Vec<PeerGroup<'a>>
where
    F: Fn(&'a RelationEdge) -> (&'a String, &'a String),
{
    let mut index: HashMap<(&'a str, &'a str), usize> = HashMap::new();
    let mut groups: Vec<PeerGroup<'a>> = Vec::new();

    for edge in edges {
        if !sibling_targets.contains_key(edge.relation_uid.as_str()) {
            continue;
        }
        let (shared, peer) = endpoints(edge);
        let slot = *index
            .entry((shared.as_str(), edge.relation_uid.as_str()))
            .or_insert_with(|| {
                groups.push(PeerGroup {
                    relation: edge.relation_uid.as_str(),
                    peers: Vec::new(),
                });
                groups.len() - 1
            });
        groups[slot].peers.push(peer.as_str());
    }

    groups
}

fn derive_siblings<'a>(
    group: &PeerGroup<'a>,
    sibling_targets: &HashMap<&'a str, Vec<&'a str>>,
    derivation: &mut Derivation<'a>,
) {
    if group.peers.len() < 2 {
        return;
    }
    let Some(targets) = sibling_targets.get(group.relation) else {
        return;
    };
    for &target in targets {
        for (i, &a) in group.peers.iter().enumerate() {
            for &b in &group.peers[i + 1..] {
                // Two labels on the same pair put one node in the group twice.
                if a == b {
                    continue;
                }
                derivation.offer(a, b, target, group.relation);
                derivation.offer(b, a, target, group.relation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, relation: &str) -> RelationEdge {
        RelationEdge::new(from, to, relation)
    }

    fn has(edges: &[RelationEdge], from: &str, to: &str, relation: &str) -> bool {
        edges
            .iter()
            .any(|e| e.from_path == from && e.to_path == to && e.relation_uid == relation)
    }

    #[test]
    fn test_empty_rules_is_identity() {
        let edges = vec![edge("a", "b", "up"), edge("b", "c", "up")];
        assert_eq!(apply(&edges, &[]), edges);
    }

    #[test]
    fn test_self_implication_forward_is_noop() {
        let rules = vec![RelationType::new("r", "r").with_rule("r", Direction::Forward)];
        let edges = vec![edge("A", "B", "r")];
        assert_eq!(apply(&edges, &rules), edges);
    }

    #[test]
    fn test_self_implication_reverse_creates_mirror() {
        let rules = vec![RelationType::new("r", "r").with_rule("r", Direction::Reverse)];
        let out = apply(&[edge("A", "B", "r")], &rules);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], edge("A", "B", "r"));
        assert_eq!(out[1].from_path, "B");
        assert_eq!(out[1].to_path, "A");
        assert_eq!(out[1].relation_uid, "r");
        assert!(out[1].implied);
        assert_eq!(out[1].implied_from_uid.as_deref(), Some("r"));
    }

    #[test]
    fn test_both_direction() {
        let rules = vec![RelationType::new("link", "link").with_rule("related", Direction::Both)];
        let out = apply(&[edge("A", "B", "link")], &rules);
        assert_eq!(out.len(), 3);
        assert!(has(&out, "A", "B", "related"));
        assert!(has(&out, "B", "A", "related"));
    }

    #[test]
    fn test_sibling_shared_target() {
        let rules = vec![RelationType::new("up", "up").with_rule("sibling", Direction::Sibling)];
        let out = apply(&[edge("C1", "P", "up"), edge("C2", "P", "up")], &rules);
        assert_eq!(out.len(), 4);
        assert!(has(&out, "C1", "C2", "sibling"));
        assert!(has(&out, "C2", "C1", "sibling"));
        assert!(out[2..].iter().all(|e| e.implied));
        assert!(out[2..]
            .iter()
            .all(|e| e.implied_from_uid.as_deref() == Some("up")));
    }

    #[test]
    fn test_sibling_shared_source() {
        let rules = vec![RelationType::new("down", "down").with_rule("same", Direction::Sibling)];
        let out = apply(&[edge("P", "A", "down"), edge("P", "B", "down")], &rules);
        assert_eq!(out.len(), 4);
        assert!(has(&out, "A", "B", "same"));
        assert!(has(&out, "B", "A", "same"));
    }

    #[test]
    fn test_sibling_fan_out() {
        let rules = vec![RelationType::new("up", "up").with_rule("sibling", Direction::Sibling)];
        let edges = vec![edge("C1", "P", "up"), edge("C2", "P", "up"), edge("C3", "P", "up")];
        let out = apply(&edges, &rules);
        assert_eq!(out.len(), 9);
    }

    #[test]
    fn test_sibling_no_cross_parent_leakage() {
        let rules = vec![RelationType::new("up", "up").with_rule("sibling", Direction::Sibling)];
        let edges = vec![
            edge("A1", "Parent1", "up"),
            edge("A2", "Parent1", "up"),
            edge("B1", "Parent2", "up"),
            edge("B2", "Parent2", "up"),
        ];
        let out = apply(&edges, &rules);
        assert_eq!(out.len(), 8);
        for e in out.iter().filter(|e| e.relation_uid == "sibling") {
            let same_family = e.from_path.chars().next() == e.to_path.chars().next();
            assert!(same_family, "leaked sibling edge {:?}", e);
        }
    }

    #[test]
    fn test_single_child_has_no_siblings() {
        let rules = vec![RelationType::new("up", "up").with_rule("sibling", Direction::Sibling)];
        let out = apply(&[edge("C1", "P", "up")], &rules);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_route_protection_against_explicit_edge() {
        let rules = vec![RelationType::new("up", "up").with_rule("down", Direction::Reverse)];
        let edges = vec![edge("A", "B", "up"), edge("B", "A", "down")];
        let out = apply(&edges, &rules);
        assert_eq!(out, edges);
    }

    #[test]
    fn test_route_protection_ignores_label() {
        let rules = vec![RelationType::new("up", "up").with_rule("down", Direction::Reverse)];
        let edges = vec![
            edge("A", "B", "up"),
            edge("B", "A", "down").with_label("series"),
        ];
        let out = apply(&edges, &rules);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_duplicate_candidates_collapse() {
        // Two labeled explicit edges on one route imply the same unlabeled mirror once.
        let rules = vec![RelationType::new("up", "up").with_rule("down", Direction::Reverse)];
        let edges = vec![
            edge("A", "B", "up").with_label("author"),
            edge("A", "B", "up").with_label("series"),
        ];
        let out = apply(&edges, &rules);
        assert_eq!(out.len(), 3);
        assert!(has(&out, "B", "A", "down"));
    }

    #[test]
    fn test_malformed_rules_are_skipped() {
        let rules = vec![
            RelationType::new("", "nameless").with_rule("down", Direction::Reverse),
            RelationType::new("up", "up").with_rule("", Direction::Reverse),
        ];
        let edges = vec![edge("A", "B", "up"), edge("C", "D", "")];
        assert_eq!(apply(&edges, &rules), edges);
    }

    #[test]
    fn test_cyclic_rule_set_terminates() {
        let rules = vec![
            RelationType::new("a", "a").with_rule("b", Direction::Forward),
            RelationType::new("b", "b").with_rule("a", Direction::Forward),
        ];
        let out = apply(&[edge("X", "Y", "a")], &rules);
        assert_eq!(out.len(), 2);
        assert!(has(&out, "X", "Y", "b"));
    }

    #[test]
    fn test_materialization_is_idempotent() {
        let rules = RelationType::defaults();
        let edges = vec![
            edge("child.md", "parent.md", "up"),
            edge("parent.md", "other.md", "down"),
            edge("x.md", "y.md", "same"),
        ];
        let once = apply(&edges, &rules);
        let twice = apply(&once, &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_output_is_deterministic() {
        let rules = RelationType::defaults();
        let edges: Vec<RelationEdge> = (0..20)
            .map(|i| edge(&format!("c{}", i), &format!("p{}", i % 3), "up"))
            .chain((0..10).map(|i| edge(&format!("p{}", i % 3), &format!("d{}", i), "down")))
            .collect();
        let first = apply(&edges, &rules);
        for _ in 0..5 {
            assert_eq!(apply(&edges, &rules), first);
        }
    }

    #[test]
    fn test_no_duplicate_edge_keys() {
        let rules = RelationType::defaults();
        let edges = vec![
            edge("P", "A", "down"),
            edge("P", "B", "down"),
            edge("A", "B", "same"),
            edge("A", "P", "up"),
        ];
        let out = apply(&edges, &rules);
        let keys: HashSet<_> = out.iter().map(RelationEdge::edge_key).collect();
        assert_eq!(keys.len(), out.len());
    }
    #[test]
    fn test_derived_down_edges_form_sibling_groups() {
        // Children only declare `up`; their `same` edges come from the implied `down`.
        let rules = RelationType::defaults();
        let out = apply(&[edge("c1", "p", "up"), edge("c2", "p", "up")], &rules);
        assert!(has(&out, "p", "c1", "down"));
        assert!(has(&out, "p", "c2", "down"));
        assert!(has(&out, "c1", "c2", "same"));
        assert!(has(&out, "c2", "c1", "same"));
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_mixed_declarations_are_idempotent() {
        let rules = RelationType::defaults();
        let edges = vec![edge("c1", "p", "up"), edge("p", "c2", "down")];
        let once = apply(&edges, &rules);
        assert_eq!(once.len(), 6);
        assert_eq!(once.iter().filter(|e| e.relation_uid == "same").count(), 2);
        assert_eq!(apply(&once, &rules), once);
    }

    #[test]
    fn test_one_relation_yields_both_sibling_styles() {
        let rules = vec![RelationType::new("r", "r").with_rule("sib", Direction::Sibling)];
        let edges = vec![
            edge("A", "P", "r"),
            edge("B", "P", "r"),
            edge("P", "X", "r"),
            edge("P", "Y", "r"),
        ];
        let out = apply(&edges, &rules);
        assert!(has(&out, "A", "B", "sib"));
        assert!(has(&out, "B", "A", "sib"));
        assert!(has(&out, "X", "Y", "sib"));
        assert!(has(&out, "Y", "X", "sib"));
        assert!(!has(&out, "A", "X", "sib"));
        assert_eq!(out.len(), 8);
        let keys: HashSet<_> = out.iter().map(RelationEdge::edge_key).collect();
        assert_eq!(keys.len(), out.len());
    }
}
