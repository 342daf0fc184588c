//! Source parsers that turn a file into symbols and imports.
//!
//! [`CodeParser`] is the seam the indexer consumes. [`SourceParser`] routes
//! AST-capable languages to [`TreeSitterParser`] and everything else to
//! [`LineImportParser`], which recovers imports only.

mod ast;
mod line;
mod resolve;

pub use ast::TreeSitterParser;
pub use line::LineImportParser;
pub use resolve::{classify_import, relative_to_root};

use crate::error::ParseError;
use crate::language::Language;
use crate::types::{Import, Symbol};
use std::path::Path;

/// One file to parse. `file_path` lies under `repo_root`.
#[derive(Debug, Clone, Copy)]
pub struct ParseRequest<'a> {
    pub repo_root: &'a Path,
    pub file_path: &'a Path,
    pub language: Language,
    pub source: &'a str,
}

impl ParseRequest<'_> {
    /// Repository-relative path with `/` separators.
    #[must_use]
    pub fn relative_path(&self) -> String {
        relative_to_root(self.repo_root, self.file_path)
    }

    /// Classified import of `raw_module` from this file.
    #[must_use]
    pub fn import(&self, raw_module: &str) -> Import {
        let (kind, resolved) =
            classify_import(self.language, raw_module, self.repo_root, self.file_path);
        let import = Import::new(raw_module.trim(), kind, self.relative_path(), self.language);
        match resolved {
            Some(path) => import.resolved_to(path),
            None => import,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    /// Symbols in source order.
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
}

pub trait CodeParser: Send + Sync {
    /// Malformed-but-readable source must still yield a result; an error is
    /// reserved for input the parser cannot read at all.
    fn parse(&self, request: &ParseRequest<'_>) -> Result<ParsedFile, ParseError>;
}

/// Default parser: tree-sitter where available, import lines otherwise.
#[derive(Debug, Default, Clone)]
pub struct SourceParser {
    ast: TreeSitterParser,
    lines: LineImportParser,
}

impl SourceParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodeParser for SourceParser {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<ParsedFile, ParseError> {
        if request.language.supports_ast() {
            self.ast.parse(request)
        } else {
            self.lines.parse(request)
        }
    }
}
