use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Source language of a file, detected from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Ruby,
    Java,
    C,
    Cpp,
    CSharp,
    Swift,
    Kotlin,
    Unknown,
}

/// Extension table, lowercase. Anything not listed is `Unknown`.
const EXTENSIONS: &[(&str, Language)] = &[
    ("rs", Language::Rust),
    ("py", Language::Python),
    ("pyi", Language::Python),
    ("pyw", Language::Python),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("cts", Language::TypeScript),
    ("go", Language::Go),
    ("rb", Language::Ruby),
    ("java", Language::Java),
    ("c", Language::C),
    ("h", Language::C),
    ("cc", Language::Cpp),
    ("cpp", Language::Cpp),
    ("cxx", Language::Cpp),
    ("hh", Language::Cpp),
    ("hpp", Language::Cpp),
    ("hxx", Language::Cpp),
    ("cs", Language::CSharp),
    ("swift", Language::Swift),
    ("kt", Language::Kotlin),
    ("kts", Language::Kotlin),
];

impl Language {
    /// Every detectable language, `Unknown` excluded.
    pub const KNOWN: [Self; 12] = [
        Self::Rust,
        Self::Python,
        Self::JavaScript,
        Self::TypeScript,
        Self::Go,
        Self::Ruby,
        Self::Java,
        Self::C,
        Self::Cpp,
        Self::CSharp,
        Self::Swift,
        Self::Kotlin,
    ];

    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.');
        EXTENSIONS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(ext))
            .map_or(Self::Unknown, |&(_, language)| language)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::Unknown, Self::from_extension)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Ruby => "ruby",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Unknown => "unknown",
        }
    }

    /// Languages with a tree-sitter grammar; the rest use the line parser.
    pub const fn supports_ast(self) -> bool {
        matches!(
            self,
            Self::Rust | Self::Python | Self::JavaScript | Self::TypeScript
        )
    }

    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        let grammar = match self {
            Self::Rust => tree_sitter_rust::LANGUAGE,
            Self::Python => tree_sitter_python::LANGUAGE,
            Self::JavaScript => tree_sitter_javascript::LANGUAGE,
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
            other => return Err(ChunkerError::unsupported_language(other.as_str())),
        };
        Ok(grammar.into())
    }

    /// Line prefixes that open an import statement.
    pub fn import_patterns(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["use ", "pub use ", "pub(crate) use ", "extern crate "],
            Self::Python => &["import ", "from "],
            Self::JavaScript | Self::TypeScript => &["import ", "export * from ", "require("],
            Self::Go | Self::Java | Self::Swift | Self::Kotlin => &["import "],
            Self::CSharp => &["using "],
            Self::Ruby => &["require ", "require_relative "],
            Self::C | Self::Cpp => &["#include "],
            Self::Unknown => &[],
        }
    }
}

impl FromStr for Language {
    type Err = ChunkerError;

    /// Accepts canonical names plus the usual short forms (`js`, `c++`, ...).
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        if let Some(language) = Self::KNOWN.iter().find(|l| l.as_str() == name) {
            return Ok(*language);
        }
        match name.as_str() {
            "js" => Ok(Self::JavaScript),
            "ts" => Ok(Self::TypeScript),
            "golang" => Ok(Self::Go),
            "py" => Ok(Self::Python),
            "rs" => Ok(Self::Rust),
            "c++" => Ok(Self::Cpp),
            "c#" | "cs" => Ok(Self::CSharp),
            _ => Err(ChunkerError::unsupported_language(name)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
