use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::Result;

/// Compute SHA256 hash of file contents
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = std::fs::read(path).map_err(crate::error::RelgraphError::Io)?;
    Ok(hash_bytes(&content))
}

/// SHA256 hex digest of raw bytes
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Normalize a vault-relative path: forward slashes, no `./` segments,
/// `..` folded into its parent.
///
/// ```text
/// "Guides\\api\\intro.md"   → "Guides/api/intro.md"
/// "./notes/../todo.md"      → "todo.md"
/// ```
///
/// A `..` that would climb above the root is dropped.
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory part of a normalized relative path (`""` for root-level files).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}
