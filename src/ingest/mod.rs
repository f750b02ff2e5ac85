pub mod frontmatter;
pub mod links;
pub mod metadata;
pub mod walker;

pub use frontmatter::{split_frontmatter, Declaration, EdgeParser, FieldKey};
pub use links::{link_target, LinkIndex};
pub use metadata::{compute_file_hash, hash_bytes, normalize_path};
pub use walker::{discover_documents, is_document, relative_document_path, DocumentFile};
