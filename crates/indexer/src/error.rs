use crate::stack::RepoStatus;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

/// Catalog failures. `Conflict` is the expected outcome of losing a race for
/// a repository and is handled by skipping it.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Repository already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Status conflict on {name}: expected {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: RepoStatus,
        actual: RepoStatus,
    },

    #[error("Illegal status transition on {name}: {from} -> {to}")]
    IllegalTransition {
        name: String,
        from: RepoStatus,
        to: RepoStatus,
    },

    #[error("Catalog {} is corrupt: {reason}", .path.display())]
    CatalogCorrupt { path: PathBuf, reason: String },

    #[error("Timed out waiting for catalog lock {}", .0.display())]
    LockTimeout(PathBuf),

    #[error("Catalog lock {} was taken over by another writer", .0.display())]
    LockLost(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Stack(#[from] StackError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] codestack_vector_store::VectorStoreError),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] codestack_code_chunker::ChunkerError),

    #[error("Dependency analysis error: {0}")]
    GraphError(#[from] codestack_graph::GraphError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Repository path is not a directory: {}", .0.display())]
    RepoPathInvalid(PathBuf),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Repository {0} has an interrupted indexing run; run recovery first")]
    InterruptedRun(String),

    #[error("Failed to clone {url}: {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("Invalid repository source: {0}")]
    InvalidSource(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// True when another run already owns the repository.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Stack(StackError::Conflict { .. }))
    }
}
