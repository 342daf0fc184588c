//! # Codestack Code Chunker
//!
//! Symbol model, source parsers and the token-budgeted chunker.
//!
//! ## Pipeline
//!
//! ```text
//! Source file
//!     │
//!     ├──> CodeParser (tree-sitter / import lines)
//!     │      └─> Symbols + classified imports
//!     │
//!     └──> Chunker (symbol-aligned, 100..300 tokens)
//!            └─> Chunks ready for embedding
//! ```
//!
//! ## Example
//!
//! ```
//! use codestack_code_chunker::{Chunker, ChunkerConfig, Language, SourceFile, Symbol, SymbolKind};
//!
//! let chunker = Chunker::new(ChunkerConfig::default());
//! let file = SourceFile {
//!     repo_name: "demo",
//!     file_path: "src/lib.rs",
//!     language: Language::Rust,
//!     text: "fn main() {}\n",
//! };
//! let chunks = chunker.chunk(&file, &[Symbol::new("main", SymbolKind::Function, 1, 1)]);
//! assert_eq!(chunks.len(), 1);
//! ```

mod chunker;
mod config;
pub mod contextual_imports;
mod error;
mod language;
pub mod parser;
mod types;

pub use chunker::{Chunker, SourceFile};
pub use config::{
    ChunkerConfig, DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_CHUNK_TOKENS, DEFAULT_MIN_CHUNK_TOKENS,
};
pub use error::{ChunkerError, ParseError, Result};
pub use language::Language;
pub use parser::{CodeParser, ParseRequest, ParsedFile, SourceParser};
pub use types::{Chunk, Import, ImportKind, Symbol, SymbolKind};
