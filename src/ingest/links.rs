//! Link resolution: maps the text of a wiki link or markdown link to the
//! relative path of a document in the vault.

use std::collections::{BTreeSet, HashMap};

use crate::graph::chains::basename;
use crate::ingest::metadata::{normalize_path, parent_dir};

/// Index of every document path in the vault, used to resolve links.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    paths: BTreeSet<String>,
    by_lower_path: HashMap<String, String>,
    by_basename: HashMap<String, Vec<String>>,
}

impl LinkIndex {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::default();
        for path in paths {
            index.insert(path.into());
        }
        index
    }

    fn insert(&mut self, path: String) {
        self.by_lower_path
            .insert(path.to_lowercase(), path.clone());
        self.by_basename
            .entry(basename(&path).to_lowercase())
            .or_default()
            .push(path.clone());
        self.paths.insert(path);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// All indexed paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.paths.iter()
    }

    /// Resolve `link` as written in document `from`.
    ///
    /// Tries, in order: the path relative to `from`'s directory, the path from
    /// the vault root, each of those with `.md` appended, then a unique
    /// basename match. Matching is case-insensitive. Returns `None` for
    /// dangling or ambiguous links.
    pub fn resolve(&self, link: &str, from: &str) -> Option<String> {
        let target = link_target(link)?;

        let dir = parent_dir(from);
        let mut candidates = Vec::with_capacity(4);
        if !dir.is_empty() {
            candidates.push(normalize_path(&format!("{}/{}", dir, target)));
        }
        candidates.push(normalize_path(&target));

        for candidate in &candidates {
            for variant in [candidate.clone(), format!("{}.md", candidate)] {
                if let Some(path) = self.by_lower_path.get(&variant.to_lowercase()) {
                    return Some(path.clone());
                }
            }
        }

        // Bare names like [[Intro]] resolve by basename when unambiguous.
        if target.contains('/') {
            return None;
        }
        match self.by_basename.get(&basename(&target).to_lowercase()) {
            Some(matches) if matches.len() == 1 => Some(matches[0].clone()),
            Some(matches) => {
                log::debug!("ambiguous link '{}' matches {} documents", link, matches.len());
                None
            }
            None => None,
        }
    }
}

/// Strip link syntax down to the target: `[[Note#Heading|alias]]` -> `Note`,
/// `[text](dir/Note%20One.md)` -> `dir/Note One.md`.
pub fn link_target(link: &str) -> Option<String> {
    let link = link.trim();
    let inner = if let Some(rest) = link.strip_prefix("[[") {
        rest.strip_suffix("]]").unwrap_or(rest)
    } else if link.starts_with('[') && link.ends_with(')') {
        let open = link.find("](")?;
        &link[open + 2..link.len() - 1]
    } else {
        link
    };

    let inner = inner.split('|').next().unwrap_or(inner);
    let inner = inner.split('#').next().unwrap_or(inner);
    let inner = inner.replace("%20", " ");
    let inner = inner.trim();
    if inner.is_empty() || inner.contains("://") {
        return None;
    }
    Some(inner.to_string())
}
