use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::graph::RelationType;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vault: VaultConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    /// Relation types and their implied rules. Empty means built-in defaults.
    #[serde(default)]
    pub relations: Vec<RelationType>,
}

/// Vault-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Root directory of the markdown documents.
    pub root: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Graph behaviour configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Relations that link siblings into ordered chains.
    #[serde(default = "default_sequential_relations")]
    pub sequential_relations: Vec<String>,
    /// Quiet period before a changed file is reparsed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sequential_relations: default_sequential_relations(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_sequential_relations() -> Vec<String> {
    vec!["next".to_string()]
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELGRAPH_CONFIG environment variable
    /// 2. ./relgraph.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RELGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("relgraph.toml"));

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !self.vault.root.exists() {
            anyhow::bail!(
                "vault.root path does not exist: {}. Set root in relgraph.toml to your notes directory.",
                self.vault.root.display()
            );
        }

        if !self.vault.root.is_dir() {
            anyhow::bail!(
                "vault.root must be a directory, not a file: {}",
                self.vault.root.display()
            );
        }

        if self.graph.debounce_ms == 0 {
            anyhow::bail!("graph.debounce_ms must be greater than 0");
        }

        let mut uids = HashSet::new();
        for relation in &self.relations {
            if relation.uid.trim().is_empty() {
                anyhow::bail!("relation '{}' has an empty uid", relation.name);
            }
            if !uids.insert(relation.uid.as_str()) {
                anyhow::bail!("duplicate relation uid: {}", relation.uid);
            }
        }

        let known: HashSet<String> = self.relation_types().into_iter().map(|r| r.uid).collect();
        for uid in &self.graph.sequential_relations {
            if !known.contains(uid) {
                anyhow::bail!("graph.sequential_relations names unknown relation: {}", uid);
            }
        }

        Ok(())
    }

    /// Configured relation types, or the built-in set when none are configured
    pub fn relation_types(&self) -> Vec<RelationType> {
        if self.relations.is_empty() {
            RelationType::defaults()
        } else {
            self.relations.clone()
        }
    }

    /// Get the vault root path
    pub fn root(&self) -> &Path {
        &self.vault.root
    }
}
