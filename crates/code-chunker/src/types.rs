use crate::language::Language;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Module,
}

impl SymbolKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::Module => "module",
        }
    }

    /// Class-like symbols may be split by their nested methods when oversized.
    #[must_use]
    pub const fn is_class_like(self) -> bool {
        matches!(self, Self::Class | Self::Module)
    }
}

/// A named syntactic construct with an inclusive, 1-based line range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: usize,
    pub end_line: usize,
    /// Name of the enclosing symbol, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_symbol: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, start_line: usize, end_line: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            start_line,
            end_line,
            parent_symbol: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_symbol = Some(parent.into());
        self
    }

    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.start_line <= other.start_line && other.end_line <= self.end_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Internal,
    External,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub raw_module: String,
    pub resolved_kind: ImportKind,
    /// Repository-relative path of the importing file.
    pub source_file: String,
    pub language: Language,
    /// Repository-relative file an internal import resolved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
}

impl Import {
    pub fn new(
        raw_module: impl Into<String>,
        resolved_kind: ImportKind,
        source_file: impl Into<String>,
        language: Language,
    ) -> Self {
        Self {
            raw_module: raw_module.into(),
            resolved_kind,
            source_file: source_file.into(),
            language,
            resolved_path: None,
        }
    }

    #[must_use]
    pub fn resolved_to(mut self, path: impl Into<String>) -> Self {
        self.resolved_path = Some(path.into());
        self
    }
}

/// A token-budgeted unit of source text prepared for embedding.
///
/// `text` is self-contained: when a header was duplicated into the chunk it
/// is stored in `leading_context` and also prefixes `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub repo_name: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_kind: Option<SymbolKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading_context: Option<String>,
    pub text: String,
    pub token_estimate: usize,
}

impl Chunk {
    /// Identity within one catalog generation: `repo:file:start_line`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.repo_name, self.file_path, self.start_line)
    }

    /// Source text of the chunk without the duplicated leading context.
    #[must_use]
    pub fn body(&self) -> &str {
        match self.leading_context.as_deref() {
            Some(ctx) => self.text.strip_prefix(ctx).unwrap_or(&self.text),
            None => &self.text,
        }
    }

    /// Text handed to the embedder: a locator header followed by the chunk.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![format!("File: {}", self.file_path)];
        if let Some(parent) = &self.parent_symbol {
            parts.push(format!("Class: {parent}"));
        }
        if let Some(name) = &self.symbol_name {
            let label = match self.symbol_kind {
                Some(SymbolKind::Method) => "Method",
                Some(SymbolKind::Class) => "Class",
                Some(SymbolKind::Module) => "Module",
                _ if self.parent_symbol.is_some() => "Method",
                _ => "Function",
            };
            if self.parent_symbol.as_deref() != Some(name.as_str()) {
                parts.push(format!("{label}: {name}"));
            }
        }
        format!("{}\n\n{}", parts.join(" | "), self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(text: &str, context: Option<&str>) -> Chunk {
        Chunk {
            repo_name: "web-app".to_string(),
            file_path: "src/user.py".to_string(),
            start_line: 12,
            end_line: 20,
            symbol_name: Some("save".to_string()),
            symbol_kind: Some(SymbolKind::Method),
            parent_symbol: Some("User".to_string()),
            symbols: vec!["save".to_string()],
            language: Language::Python,
            leading_context: context.map(str::to_string),
            text: text.to_string(),
            token_estimate: 4,
        }
    }

    #[test]
    fn id_is_repo_file_and_start_line() {
        assert_eq!(chunk("x", None).id(), "web-app:src/user.py:12");
    }

    #[test]
    fn body_strips_leading_context() {
        let c = chunk("class User:\n    def save(self):\n", Some("class User:\n"));
        assert_eq!(c.body(), "    def save(self):\n");
        assert_eq!(chunk("plain\n", None).body(), "plain\n");
    }

    #[test]
    fn embedding_text_names_class_and_method() {
        let text = chunk("def save(self): pass\n", None).embedding_text();
        assert!(text.starts_with("File: src/user.py | Class: User | Method: save\n\n"));
    }

    #[test]
    fn symbol_containment() {
        let class = Symbol::new("User", SymbolKind::Class, 1, 30);
        let method = Symbol::new("save", SymbolKind::Method, 5, 9).with_parent("User");
        assert!(class.contains(&method));
        assert!(!method.contains(&class));
    }
}
