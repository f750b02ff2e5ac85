pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod vault;
pub mod watch;

pub use config::Config;
pub use error::{RelgraphError, Result};
pub use graph::{
    ancestors, apply_rules, build_chains, order_siblings, AncestorNode, Direction, EdgeStore,
    ImpliedRule, RelationEdge, RelationType, SiblingChains,
};
pub use vault::{TouchOutcome, Vault};
