//! # Codestack Vector Store
//!
//! Embedding and chunk storage collaborators used by the repository indexer.
//!
//! [`Embedder`] turns chunk text into vectors in batches; [`VectorStore`]
//! keeps `(Chunk, vector)` pairs keyed by chunk identity and answers
//! similarity queries. [`HashingEmbedder`] and [`JsonVectorStore`] are the
//! bundled variants; with the `fastembed` feature, `FastEmbedder` runs a
//! local transformer model instead of hashing identifiers.

mod embedder;
mod error;
mod model;
#[cfg(feature = "fastembed")]
mod onnx;
mod store;

pub use embedder::{Embedder, HashingEmbedder, DEFAULT_DIMENSION};
pub use error::{Result, VectorStoreError};
pub use model::EmbeddingModelKind;
#[cfg(feature = "fastembed")]
pub use onnx::FastEmbedder;
pub use store::{JsonVectorStore, QueryFilters, RepoChunkStats, SearchResult, VectorStore};
