//! # Codestack Indexer
//!
//! Repository catalog, indexing passes and catalog-wide maintenance.
//!
//! ## Pipeline
//!
//! ```text
//! StackCoordinator
//!     │
//!     ├──> StackManager (catalog, status machine, file lock)
//!     │
//!     └──> RepoIndexer
//!            ├─> FileScanner (.gitignore aware) + FileFilter
//!            ├─> CodeParser -> Chunker          (parallel per file)
//!            ├─> Embedder -> VectorStore        (serial batches)
//!            └─> ImportLedger -> DependencyAnalyzer
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use codestack_indexer::{StackCoordinator, StackSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = StackCoordinator::open(StackSettings::load(None)?).await?;
//!     coordinator.add_repo("/path/to/repo", None, true).await?;
//!
//!     for outcome in coordinator.reindex_changed().await? {
//!         println!("{}", outcome.repo_name());
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod coordinator;
mod error;
mod filter;
mod git;
mod ledger;
mod lock;
mod repo_indexer;
mod scanner;
mod stack;

pub use config::{
    CatalogSettings, ChunkingSettings, DependencySettings, EmbeddingProvider, EmbeddingSettings,
    IndexingSettings, StackSettings, CONFIG_ENV, HOME_ENV,
};
pub use coordinator::{
    embedder_from_settings, repo_name_from_url, AddedRepo, Collaborators, StackCoordinator,
    SweepOutcome,
};
pub use error::{IndexerError, Result, StackError};
pub use filter::FileFilter;
pub use git::{GitCli, GitRepo};
pub use ledger::ImportLedger;
pub use lock::CatalogLock;
pub use repo_indexer::{
    FileError, IndexResult, RepoIndexer, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT_FILES,
};
pub use scanner::FileScanner;
pub use stack::{RepoRecord, RepoStatus, StackManager, StackStats, CATALOG_VERSION};

pub use codestack_graph::{CrossRepoEdge, MissingRepoSuggestion, RepoDependencies};
pub use codestack_vector_store::EmbeddingModelKind;
