use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::error::{RelgraphError, Result};
use crate::ingest::metadata::normalize_path;

/// Metadata for a discovered document
#[derive(Debug, Clone)]
pub struct DocumentFile {
    /// Path relative to the vault root, `/`-separated. Used as the graph node id.
    pub relative_path: String,
    pub file_size: u64,
}

/// Extension of documents that take part in the graph.
pub const DOCUMENT_EXTENSION: &str = "md";

/// True for paths with the document extension (case-insensitive).
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Discover every markdown document under `root`.
///
/// Hidden files and directories (leading `.`, e.g. `.git`, `.obsidian`) are
/// skipped. The result is sorted by relative path.
pub fn discover_documents(root: &Path) -> Result<Vec<DocumentFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || !is_document(path) {
            continue;
        }

        let metadata = std::fs::metadata(path).map_err(RelgraphError::Io)?;

        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| {
                RelgraphError::Config(format!(
                    "Failed to compute relative path for: {}",
                    path.display()
                ))
            })?
            .to_string_lossy()
            .to_string();

        files.push(DocumentFile {
            relative_path: normalize_path(&relative_path),
            file_size: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    log::info!(
        "Discovered {} documents ({} bytes) in {}",
        files.len(),
        files.iter().map(|f| f.file_size).sum::<u64>(),
        root.display()
    );
    Ok(files)
}

/// Relative document id for an absolute path under `root`.
///
/// Returns `None` when the path is outside the root, hidden, or not a document.
/// The file does not need to exist (deleted files still map to their id).
pub fn relative_document_path(absolute_path: &Path, root: &Path) -> Option<String> {
    let relative = absolute_path.strip_prefix(root).ok()?;
    if !is_document(relative) {
        return None;
    }
    let hidden = relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
    });
    if hidden {
        return None;
    }
    Some(normalize_path(&relative.to_string_lossy()))
}
