use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Invalid organization prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("{0}")]
    Other(String),
}
