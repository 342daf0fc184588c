use super::{CodeParser, ParseRequest, ParsedFile};
use crate::contextual_imports::is_import_line;
use crate::error::ParseError;
use crate::language::Language;

/// Import-only parser for languages without a tree-sitter grammar here.
///
/// Produces no symbols, so the chunker falls back to line windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineImportParser;

impl LineImportParser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodeParser for LineImportParser {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<ParsedFile, ParseError> {
        let mut modules = Vec::new();
        let mut in_go_block = false;

        for line in request.source.lines() {
            let trimmed = line.trim();
            if request.language == Language::Go {
                if in_go_block {
                    if trimmed.starts_with(')') {
                        in_go_block = false;
                    } else if let Some(module) = go_block_entry(trimmed) {
                        modules.push(module);
                    }
                    continue;
                }
                if trimmed == "import (" || trimmed.starts_with("import (") {
                    in_go_block = true;
                    continue;
                }
            }
            if !is_import_line(request.language, trimmed) {
                continue;
            }
            if let Some(module) = module_of(request.language, trimmed) {
                modules.push(module);
            }
        }

        Ok(ParsedFile {
            symbols: Vec::new(),
            imports: modules.iter().map(|raw| request.import(raw)).collect(),
        })
    }
}

/// Module string of a single import line.
fn module_of(language: Language, line: &str) -> Option<String> {
    let line = line.trim_end_matches(';').trim();
    let module = match language {
        Language::Go => go_block_entry(line.strip_prefix("import")?.trim())?,
        Language::Ruby => line
            .strip_prefix("require_relative")
            .map(|r| format!("./{}", unquote(r)))
            .or_else(|| line.strip_prefix("require").map(|r| unquote(r).to_string()))
            .or_else(|| line.strip_prefix("load").map(|r| unquote(r).to_string()))?,
        Language::C | Language::Cpp => {
            let target = line.strip_prefix("#include")?.trim();
            // Quoted includes keep their quotes so classification sees them as local.
            if target.starts_with('<') {
                target.trim_matches(|c| c == '<' || c == '>').to_string()
            } else {
                target.to_string()
            }
        }
        Language::CSharp => {
            let rest = line.strip_prefix("using")?.trim();
            let rest = rest.strip_prefix("static ").unwrap_or(rest);
            rest.rsplit('=').next().unwrap_or(rest).trim().to_string()
        }
        _ => {
            // Java, Kotlin and Swift: `import a.b.C`
            let rest = line.strip_prefix("import")?.trim();
            let rest = rest.strip_prefix("static ").unwrap_or(rest);
            rest.split_whitespace().next().unwrap_or(rest).trim_end_matches(".*").to_string()
        }
    };
    let module = module.trim();
    (!module.is_empty()).then(|| module.to_string())
}

/// `alias "path/to/pkg"` or `"fmt"`.
fn go_block_entry(entry: &str) -> Option<String> {
    let start = entry.find('"')?;
    let rest = &entry[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn unquote(text: &str) -> &str {
    text.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn modules(language: Language, file: &str, source: &str) -> Vec<String> {
        let root = Path::new("/nonexistent-repo");
        let path = root.join(file);
        LineImportParser::new()
            .parse(&ParseRequest {
                repo_root: root,
                file_path: &path,
                language,
                source,
            })
            .unwrap()
            .imports
            .into_iter()
            .map(|i| i.raw_module)
            .collect()
    }

    #[test]
    fn go_single_and_block_imports() {
        let source = "package main\n\nimport \"fmt\"\nimport (\n\t\"os\"\n\tlog \"github.com/sirupsen/logrus\"\n)\n";
        assert_eq!(
            modules(Language::Go, "main.go", source),
            vec!["fmt", "os", "github.com/sirupsen/logrus"]
        );
    }

    #[test]
    fn ruby_requires() {
        let source = "require 'json'\nrequire_relative 'lib/helper'\n";
        assert_eq!(
            modules(Language::Ruby, "app.rb", source),
            vec!["json", "./lib/helper"]
        );
    }

    #[test]
    fn java_and_c_includes() {
        assert_eq!(
            modules(Language::Java, "A.java", "import java.util.List;\nimport static org.x.Y.*;\n"),
            vec!["java.util.List", "org.x.Y"]
        );
        assert_eq!(
            modules(Language::C, "a.c", "#include <stdio.h>\n#include \"local.h\"\n"),
            vec!["stdio.h", "\"local.h\""]
        );
    }

    #[test]
    fn no_symbols_are_reported() {
        let root = Path::new("/r");
        let path = root.join("x.go");
        let parsed = LineImportParser::new()
            .parse(&ParseRequest {
                repo_root: root,
                file_path: &path,
                language: Language::Go,
                source: "func main() {}\n",
            })
            .unwrap();
        assert!(parsed.symbols.is_empty());
        assert!(parsed.imports.is_empty());
    }
}
