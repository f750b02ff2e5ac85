//! Vault: a folder of markdown documents wired to an [`EdgeStore`].
//!
//! The vault owns the link index and the edge parser, and serves as the
//! store's [`DocumentSource`] so `ensure_fresh` can reparse stale documents.
//! Every read goes through `ensure_fresh` first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::Config;
use crate::error::{RelgraphError, Result};
use crate::graph::chains::basename;
use crate::graph::{
    build_chains, order_siblings, AncestorNode, DocumentSource, EdgeStore, RelationEdge,
    RelationType, SiblingChains,
};
use crate::ingest::{
    compute_file_hash, discover_documents, hash_bytes, relative_document_path, EdgeParser,
    LinkIndex,
};
use crate::watch::FsChange;

/// What a filesystem notification meant for the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    /// Known document with identical content.
    Unchanged,
    /// Known document with new content; marked stale.
    Modified,
    /// New document; the whole vault is marked stale.
    Added,
    /// Document disappeared; its edges were dropped.
    Removed,
    /// Document moved within the vault.
    Renamed,
    /// Neither known nor present.
    Ignored,
}

pub struct Vault {
    root: PathBuf,
    relations: Vec<RelationType>,
    sequential: Vec<String>,
    parser: EdgeParser,
    index: LinkIndex,
    /// Content hash of each document as last parsed.
    hashes: Mutex<HashMap<String, String>>,
    store: Arc<EdgeStore>,
}

impl Vault {
    /// Open the vault described by `config`. Nothing is parsed until the
    /// first read.
    pub fn open(config: &Config) -> Result<Self> {
        Self::new(
            config.root(),
            config.relation_types(),
            config.graph.sequential_relations.clone(),
        )
    }

    pub fn new(root: &Path, relations: Vec<RelationType>, sequential: Vec<String>) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            RelgraphError::Config(format!("vault root {}: {}", root.display(), e))
        })?;
        let parser = EdgeParser::new(&relations)?;
        let store = Arc::new(EdgeStore::new(relations.clone()));
        store.mark_all_stale();

        let mut vault = Self {
            root,
            relations,
            sequential,
            parser,
            index: LinkIndex::default(),
            hashes: Mutex::new(HashMap::new()),
            store,
        };
        vault.refresh_index()?;
        Ok(vault)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<EdgeStore> {
        &self.store
    }

    pub fn document_count(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains(path)
    }

    /// Rediscover documents on disk. Does not mark anything stale.
    pub fn refresh_index(&mut self) -> Result<()> {
        let files = discover_documents(&self.root)?;
        self.index = LinkIndex::new(files.into_iter().map(|f| f.relative_path));
        Ok(())
    }

    /// Replace the relation set. When only implied rules change the explicit
    /// edges are kept; renamed or new relation keys require a full reparse.
    pub fn set_relations(&mut self, relations: Vec<RelationType>) -> Result<()> {
        let keys = |rs: &[RelationType]| -> Vec<(String, String)> {
            rs.iter().map(|r| (r.uid.clone(), r.name.clone())).collect()
        };
        let keys_changed = keys(&self.relations) != keys(&relations);

        self.parser = EdgeParser::new(&relations)?;
        self.store.set_rules(relations.clone());
        self.relations = relations;
        if keys_changed {
            self.store.mark_all_stale();
        }
        Ok(())
    }

    /// Reparse stale documents. Returns how many were read.
    pub fn ensure_fresh(&self) -> Result<usize> {
        let reader = VaultReader { vault: self };
        self.store.ensure_fresh(&reader)
    }

    /// Explicit and implied edges of the whole vault.
    pub fn edges(&self) -> Result<Arc<Vec<RelationEdge>>> {
        self.ensure_fresh()?;
        Ok(self.store.materialize())
    }

    pub fn ancestors(&self, path: &str, relation_filter: Option<&[String]>) -> Result<Vec<AncestorNode>> {
        self.ensure_fresh()?;
        Ok(self.store.ancestors(path, relation_filter))
    }

    /// Targets of `parent`'s outgoing `relation` edges, in edge order.
    pub fn children(&self, parent: &str, relation: &str) -> Result<Vec<String>> {
        self.ensure_fresh()?;
        let filter = [relation.to_string()];
        let mut children: Vec<String> = Vec::new();
        for edge in self.store.outgoing(parent, Some(&filter[..])) {
            if !children.contains(&edge.to_path) {
                children.push(edge.to_path);
            }
        }
        Ok(children)
    }

    /// Chains among the `relation` children of `parent`.
    pub fn chains(&self, parent: &str, relation: &str) -> Result<SiblingChains> {
        let siblings = self.children(parent, relation)?;
        let outgoing = self.store.outgoing_by_path(&siblings);
        Ok(build_chains(&siblings, &outgoing, &self.sequential))
    }

    /// Children of `parent` with chains kept in sequence and everything
    /// sorted by basename.
    pub fn ordered_children(&self, parent: &str, relation: &str) -> Result<Vec<String>> {
        let chains = self.chains(parent, relation)?;
        Ok(order_siblings(&chains, |p| basename(p).to_lowercase()))
    }

    /// Handle a create, modify or delete notification for `path`.
    pub fn document_touched(&mut self, path: &str) -> Result<TouchOutcome> {
        let absolute = self.root.join(path);
        let known = self.index.contains(path);
        let exists = absolute.is_file();

        let outcome = match (known, exists) {
            (true, true) => {
                let current = compute_file_hash(&absolute)?;
                let stored = self.hashes().get(path).cloned();
                if stored.as_deref() == Some(current.as_str()) {
                    TouchOutcome::Unchanged
                } else {
                    self.store.mark_stale(path);
                    TouchOutcome::Modified
                }
            }
            (false, true) => {
                // A new name can turn dangling or ambiguous links elsewhere into edges.
                self.refresh_index()?;
                self.store.mark_all_stale();
                TouchOutcome::Added
            }
            (true, false) => {
                self.store.delete(path);
                self.hashes().remove(path);
                self.refresh_index()?;
                self.store.mark_all_stale();
                TouchOutcome::Removed
            }
            (false, false) => TouchOutcome::Ignored,
        };
        log::debug!("vault: {} {:?}", path, outcome);
        Ok(outcome)
    }

    /// Handle a rename inside the vault. Links elsewhere keep pointing at the
    /// document under its new path.
    pub fn document_renamed(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        self.store.rename(old_path, new_path);
        {
            let mut hashes = self.hashes();
            if let Some(hash) = hashes.remove(old_path) {
                hashes.insert(new_path.to_string(), hash);
            }
        }
        self.refresh_index()?;
        self.store.mark_stale(new_path);
        log::info!("vault: renamed {} -> {}", old_path, new_path);
        Ok(())
    }

    /// Apply one filesystem change. Paths outside the vault and non-markdown
    /// files are ignored. A rename across the vault boundary is treated as a
    /// delete or a create.
    pub fn apply_change(&mut self, change: &FsChange) -> Result<TouchOutcome> {
        match change {
            FsChange::Touched(absolute) => match self.relative(absolute) {
                Some(path) => self.document_touched(&path),
                None => Ok(TouchOutcome::Ignored),
            },
            FsChange::Renamed { from, to } => {
                match (self.relative(from), self.relative(to)) {
                    (Some(old_path), Some(new_path)) => {
                        self.document_renamed(&old_path, &new_path)?;
                        Ok(TouchOutcome::Renamed)
                    }
                    (Some(old_path), None) => self.document_touched(&old_path),
                    (None, Some(new_path)) => self.document_touched(&new_path),
                    (None, None) => Ok(TouchOutcome::Ignored),
                }
            }
        }
    }

    fn relative(&self, absolute: &Path) -> Option<String> {
        relative_document_path(absolute, &self.root)
    }

    fn hashes(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.hashes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_document(&self, path: &str) -> Result<Option<Vec<RelationEdge>>> {
        let absolute = self.root.join(path);
        if !absolute.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&absolute).map_err(RelgraphError::Io)?;
        self.hashes().insert(path.to_string(), hash_bytes(&bytes));
        let content = String::from_utf8_lossy(&bytes);
        Ok(Some(self.parser.extract_document_edges(path, &content, &self.index)))
    }
}

struct VaultReader<'a> {
    vault: &'a Vault,
}

impl DocumentSource for VaultReader<'_> {
    fn document_paths(&self) -> Result<Vec<String>> {
        Ok(self.vault.index.paths().cloned().collect())
    }

    fn document_edges(&self, path: &str) -> Result<Option<Vec<RelationEdge>>> {
        self.vault.read_document(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    /// Home with three chapters linked by `next`, plus an appendix.
    fn sample_vault() -> (TempDir, Vault) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "Home.md", "# Home\n");
        write(root, "book/Ch1.md", "---\nup: \"[[Home]]\"\nnext: \"[[Ch2]]\"\n---\n");
        write(root, "book/Ch2.md", "---\nup: \"[[Home]]\"\n---\nnext:: [[Ch3]]\n");
        write(root, "book/Ch3.md", "up:: [[Home]]\n");
        write(root, "Appendix.md", "up:: [[Home]]\n");
        let vault = Vault::new(root, RelationType::defaults(), vec!["next".to_string()]).unwrap();
        (temp, vault)
    }

    #[test]
    fn test_vault_materializes_documents() {
        let (_temp, vault) = sample_vault();
        assert_eq!(vault.document_count(), 5);
        let edges = vault.edges().unwrap();
        assert!(edges
            .iter()
            .any(|e| e.from_path == "Home.md" && e.to_path == "book/Ch1.md" && e.relation_uid == "down" && e.implied));
        assert!(edges
            .iter()
            .any(|e| e.from_path == "book/Ch2.md" && e.to_path == "book/Ch1.md" && e.relation_uid == "prev"));
    }

    #[test]
    fn test_children_declaring_parent_become_siblings() {
        let (_temp, vault) = sample_vault();
        let edges = vault.edges().unwrap();
        let same = |from: &str, to: &str| {
            edges
                .iter()
                .any(|e| e.from_path == from && e.to_path == to && e.relation_uid == "same")
        };
        assert!(same("Appendix.md", "book/Ch3.md"));
        assert!(same("book/Ch3.md", "Appendix.md"));
        assert!(same("book/Ch1.md", "book/Ch2.md"));
        assert!(!same("Home.md", "Appendix.md"));

        let mut peers = vault.children("book/Ch1.md", "same").unwrap();
        peers.sort();
        assert_eq!(peers, vec!["Appendix.md", "book/Ch2.md", "book/Ch3.md"]);
    }

    #[test]
    fn test_vault_chains_and_ordering() {
        let (_temp, vault) = sample_vault();
        let chains = vault.chains("Home.md", "down").unwrap();
        assert_eq!(
            chains.chains["book/Ch1.md"],
            vec!["book/Ch1.md", "book/Ch2.md", "book/Ch3.md"]
        );
        assert_eq!(chains.disconnected, vec!["Appendix.md"]);

        let ordered = vault.ordered_children("Home.md", "down").unwrap();
        assert_eq!(ordered, vec!["Appendix.md", "book/Ch1.md", "book/Ch2.md", "book/Ch3.md"]);
    }

    #[test]
    fn test_vault_ancestors() {
        let (_temp, vault) = sample_vault();
        let up = vec!["down".to_string()];
        let ancestors = vault.ancestors("book/Ch3.md", Some(up.as_slice())).unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].path, "Home.md");
        assert_eq!(ancestors[0].depth, 1);
        assert!(ancestors[0].implied);
        assert_eq!(ancestors[0].implied_from_uid.as_deref(), Some("up"));
    }

    #[test]
    fn test_touch_modified_reparses_document() {
        let (temp, mut vault) = sample_vault();
        vault.ensure_fresh().unwrap();

        assert_eq!(vault.document_touched("Appendix.md").unwrap(), TouchOutcome::Unchanged);

        write(temp.path(), "Appendix.md", "same:: [[Ch1]]\n");
        assert_eq!(vault.document_touched("Appendix.md").unwrap(), TouchOutcome::Modified);
        assert_eq!(vault.ensure_fresh().unwrap(), 1);
        assert_eq!(
            vault.store().explicit_edges("Appendix.md"),
            vec![RelationEdge::new("Appendix.md", "book/Ch1.md", "same")]
        );
    }

    #[test]
    fn test_touch_added_resolves_previously_dangling_links() {
        let (temp, mut vault) = sample_vault();
        write(temp.path(), "Home.md", "next:: [[Later]]\n");
        vault.ensure_fresh().unwrap();
        assert!(vault.store().explicit_edges("Home.md").is_empty());

        write(temp.path(), "Later.md", "# Later\n");
        assert_eq!(vault.document_touched("Later.md").unwrap(), TouchOutcome::Added);
        vault.ensure_fresh().unwrap();
        assert_eq!(
            vault.store().explicit_edges("Home.md"),
            vec![RelationEdge::new("Home.md", "Later.md", "next")]
        );
    }

    #[test]
    fn test_touch_removed_drops_edges() {
        let (temp, mut vault) = sample_vault();
        vault.ensure_fresh().unwrap();
        fs::remove_file(temp.path().join("Home.md")).unwrap();
        assert_eq!(vault.document_touched("Home.md").unwrap(), TouchOutcome::Removed);
        let edges = vault.edges().unwrap();
        assert!(edges.iter().all(|e| !e.touches("Home.md")));
        assert!(!vault.contains("Home.md"));
        assert_eq!(vault.document_touched("Nope.md").unwrap(), TouchOutcome::Ignored);
    }

    #[test]
    fn test_rename_moves_edges() {
        let (temp, mut vault) = sample_vault();
        vault.ensure_fresh().unwrap();
        fs::rename(temp.path().join("Home.md"), temp.path().join("Index.md")).unwrap();
        vault.document_renamed("Home.md", "Index.md").unwrap();

        let edges = vault.edges().unwrap();
        assert!(edges.iter().all(|e| !e.touches("Home.md")));
        assert!(edges
            .iter()
            .any(|e| e.from_path == "book/Ch3.md" && e.to_path == "Index.md" && e.relation_uid == "up"));
        assert!(vault.contains("Index.md"));
    }

    #[test]
    fn test_apply_change_maps_absolute_paths() {
        let (temp, mut vault) = sample_vault();
        vault.ensure_fresh().unwrap();
        let root = vault.root().to_path_buf();

        write(temp.path(), "notes.txt", "up:: [[Home]]\n");
        let outcome = vault
            .apply_change(&FsChange::Touched(root.join("notes.txt")))
            .unwrap();
        assert_eq!(outcome, TouchOutcome::Ignored);

        write(temp.path(), "book/Ch4.md", "up:: [[Home]]\n");
        let outcome = vault
            .apply_change(&FsChange::Touched(root.join("book/Ch4.md")))
            .unwrap();
        assert_eq!(outcome, TouchOutcome::Added);
        assert!(vault.children("Home.md", "down").unwrap().contains(&"book/Ch4.md".to_string()));

        fs::rename(root.join("book/Ch4.md"), root.join("book/Epilogue.md")).unwrap();
        vault
            .apply_change(&FsChange::Renamed {
                from: root.join("book/Ch4.md"),
                to: root.join("book/Epilogue.md"),
            })
            .unwrap();
        let children = vault.children("Home.md", "down").unwrap();
        assert!(children.contains(&"book/Epilogue.md".to_string()));
        assert!(!children.contains(&"book/Ch4.md".to_string()));
    }

    #[test]
    fn test_set_relations_rule_change_keeps_explicit_edges() {
        let (_temp, mut vault) = sample_vault();
        let before = vault.edges().unwrap().len();

        let mut relations = RelationType::defaults();
        for relation in &mut relations {
            relation.implied.clear();
        }
        vault.set_relations(relations).unwrap();
        assert!(!vault.store().is_stale());
        let after = vault.edges().unwrap();
        assert!(after.len() < before);
        assert!(after.iter().all(|e| !e.implied));
    }
}
