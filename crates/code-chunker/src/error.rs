use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChunkerError>;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid chunker configuration: {0}")]
    InvalidConfig(String),

    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}

impl ChunkerError {
    pub fn unsupported_language(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(language.into())
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

/// Per-file parse failure. Recorded by the indexer and never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to parse {}: {reason}", .path.display())]
pub struct ParseError {
    pub path: PathBuf,
    pub reason: String,
}

impl ParseError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
