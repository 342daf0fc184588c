//! # Codestack Graph
//!
//! Dependency analysis over the imports produced while indexing.
//!
//! ```text
//! (repo_name, imports)*
//!     │
//!     ├──> analyze                  per-repo counts, packages, file edges
//!     ├──> cross_repo_dependencies  package -> catalog repository edges
//!     ├──> suggest_missing_repos    prefixed packages with no repository
//!     └──> circular_dependencies    file cycles (petgraph SCC)
//! ```
//!
//! Results are derived on demand and never persisted, so they cannot drift
//! from the import sets they were computed from.

mod analyzer;
mod error;
mod package;

pub use analyzer::{CrossRepoEdge, DependencyAnalyzer, MissingRepoSuggestion, RepoDependencies};
pub use error::{GraphError, Result};
pub use package::package_name;
