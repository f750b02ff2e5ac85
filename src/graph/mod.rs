//! Relation graph engine: edge model, implication rules, ancestor traversal,
//! sibling chains and the incrementally maintained edge store.
//!
//! Everything in this module is in-memory and free of I/O. Documents feed
//! explicit edges into [`EdgeStore`]; reads materialize the full graph by
//! running [`rules::apply`] over the explicit set.

pub mod chains;
pub mod rules;
pub mod store;
pub mod traversal;

pub use chains::{build_chains, order_siblings, SiblingChains};
pub use rules::apply as apply_rules;
pub use store::{DocumentSource, EdgeStore};
pub use traversal::{ancestors, AncestorNode};

use serde::{Deserialize, Serialize};

/// Direction in which an implied rule derives edges from a source edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `from -> to` under the target relation.
    Forward,
    /// `to -> from` under the target relation.
    Reverse,
    /// Both of the above.
    Both,
    /// Peers sharing a common target or a common source.
    Sibling,
}

impl Direction {
    pub fn derives_forward(self) -> bool {
        matches!(self, Direction::Forward | Direction::Both)
    }

    pub fn derives_reverse(self) -> bool {
        matches!(self, Direction::Reverse | Direction::Both)
    }
}

/// A rule attached to a relation type: edges of the owning relation imply
/// edges of `target` in the given direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpliedRule {
    /// Uid of the implied relation. May equal the owning relation's uid.
    pub target: String,
    pub direction: Direction,
}

impl ImpliedRule {
    pub fn new(target: impl Into<String>, direction: Direction) -> Self {
        Self {
            target: target.into(),
            direction,
        }
    }
}

/// A relation type, addressed by its stable `uid`. The display `name` can be
/// renamed freely and never takes part in graph identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationType {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub implied: Vec<ImpliedRule>,
}

impl RelationType {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            implied: Vec::new(),
        }
    }

    pub fn with_rule(mut self, target: impl Into<String>, direction: Direction) -> Self {
        self.implied.push(ImpliedRule::new(target, direction));
        self
    }

    /// Built-in relation set used when no relations are configured.
    ///
    /// `up`/`down` and `next`/`prev` imply each other in reverse, `same` is
    /// symmetric, and children sharing a parent through `down` are `same`.
    pub fn defaults() -> Vec<RelationType> {
        vec![
            RelationType::new("up", "up").with_rule("down", Direction::Reverse),
            RelationType::new("down", "down")
                .with_rule("up", Direction::Reverse)
                .with_rule("same", Direction::Sibling),
            RelationType::new("same", "same").with_rule("same", Direction::Reverse),
            RelationType::new("next", "next").with_rule("prev", Direction::Reverse),
            RelationType::new("prev", "prev").with_rule("next", Direction::Reverse),
        ]
    }
}

/// A directed, typed edge between two documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationEdge {
    pub from_path: String,
    pub to_path: String,
    pub relation_uid: String,
    /// Subdivides a relation, e.g. `author` vs `series` under the same type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// True when derived by the rule engine rather than authored.
    #[serde(default)]
    pub implied: bool,
    /// Relation of the edge this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implied_from_uid: Option<String>,
}

impl RelationEdge {
    /// An explicit, unlabeled edge.
    pub fn new(
        from_path: impl Into<String>,
        to_path: impl Into<String>,
        relation_uid: impl Into<String>,
    ) -> Self {
        Self {
            from_path: from_path.into(),
            to_path: to_path.into(),
            relation_uid: relation_uid.into(),
            label: None,
            implied: false,
            implied_from_uid: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn derived(
        from_path: &str,
        to_path: &str,
        relation_uid: &str,
        implied_from_uid: &str,
    ) -> Self {
        Self {
            from_path: from_path.to_string(),
            to_path: to_path.to_string(),
            relation_uid: relation_uid.to_string(),
            label: None,
            implied: true,
            implied_from_uid: Some(implied_from_uid.to_string()),
        }
    }

    /// Full identity used for duplicate detection.
    pub fn edge_key(&self) -> EdgeKey<'_> {
        EdgeKey {
            from_path: &self.from_path,
            to_path: &self.to_path,
            relation_uid: &self.relation_uid,
            label: self.label.as_deref(),
        }
    }

    /// Label-insensitive identity used to keep implied edges off explicit routes.
    pub fn route_key(&self) -> RouteKey<'_> {
        RouteKey {
            from_path: &self.from_path,
            to_path: &self.to_path,
            relation_uid: &self.relation_uid,
        }
    }

    pub fn touches(&self, path: &str) -> bool {
        self.from_path == path || self.to_path == path
    }
}

/// `(from, to, relation, label)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeKey<'a> {
    pub from_path: &'a str,
    pub to_path: &'a str,
    pub relation_uid: &'a str,
    pub label: Option<&'a str>,
}

/// `(from, to, relation)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey<'a> {
    pub from_path: &'a str,
    pub to_path: &'a str,
    pub relation_uid: &'a str,
}

/// Returns true when `relation_uid` passes `filter`. `None` or an empty
/// filter accepts every relation.
pub fn relation_allowed(filter: Option<&[String]>, relation_uid: &str) -> bool {
    match filter {
        Some(uids) if !uids.is_empty() => uids.iter().any(|u| u == relation_uid),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_key_includes_label() {
        let a = RelationEdge::new("a.md", "b.md", "up").with_label("author");
        let b = RelationEdge::new("a.md", "b.md", "up").with_label("series");
        assert_ne!(a.edge_key(), b.edge_key());
        assert_eq!(a.route_key(), b.route_key());
    }

    #[test]
    fn test_direction_flags() {
        assert!(Direction::Both.derives_forward());
        assert!(Direction::Both.derives_reverse());
        assert!(!Direction::Sibling.derives_forward());
        assert!(!Direction::Sibling.derives_reverse());
        assert!(Direction::Reverse.derives_reverse());
    }

    #[test]
    fn test_relation_filter() {
        let filter = vec!["up".to_string()];
        assert!(relation_allowed(None, "down"));
        assert!(relation_allowed(Some(&[][..]), "down"));
        assert!(relation_allowed(Some(filter.as_slice()), "up"));
        assert!(!relation_allowed(Some(filter.as_slice()), "down"));
    }

    #[test]
    fn test_edge_serde_shape() {
        let edge = RelationEdge::new("a.md", "b.md", "up");
        let json = serde_json::to_string(&edge).unwrap();
        assert!(!json.contains("label"));
        assert!(json.contains("\"implied\":false"));

        let rule: ImpliedRule =
            serde_json::from_str(r#"{"target":"same","direction":"sibling"}"#).unwrap();
        assert_eq!(rule.direction, Direction::Sibling);
    }

    #[test]
    fn test_defaults_have_unique_uids() {
        let defaults = RelationType::defaults();
        let mut uids: Vec<_> = defaults.iter().map(|r| r.uid.as_str()).collect();
        uids.sort();
        uids.dedup();
        assert_eq!(uids.len(), defaults.len());
    }
}
