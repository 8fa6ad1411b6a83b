use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("Snapshot I/O failed at {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence { path: path.into(), reason: reason.to_string() }
    }

    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Extraction { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
