use thiserror::Error;

/// Main error type for relgraph
#[derive(Error, Debug)]
pub enum RelgraphError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document or front-matter parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// File watcher errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Document not found in the vault
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
}

impl From<notify::Error> for RelgraphError {
    fn from(err: notify::Error) -> Self {
        RelgraphError::Watch(err.to_string())
    }
}

/// Convenient Result type using RelgraphError
pub type Result<T> = std::result::Result<T, RelgraphError>;
