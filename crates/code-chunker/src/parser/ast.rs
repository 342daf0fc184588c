use super::{CodeParser, ParseRequest, ParsedFile};
use crate::error::ParseError;
use crate::language::Language;
use crate::types::{Symbol, SymbolKind};
use tree_sitter::{Node, Parser};

/// AST parser for Rust, Python, JavaScript and TypeScript.
///
/// A fresh `tree_sitter::Parser` is created per call, so one instance can be
/// shared across worker tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterParser;

impl TreeSitterParser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodeParser for TreeSitterParser {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<ParsedFile, ParseError> {
        let ts_lang = request
            .language
            .tree_sitter_language()
            .map_err(|e| ParseError::new(request.file_path, e.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&ts_lang)
            .map_err(|e| ParseError::new(request.file_path, format!("Failed to set language: {e}")))?;

        let tree = parser
            .parse(request.source, None)
            .ok_or_else(|| ParseError::new(request.file_path, "parser produced no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            log::debug!(
                "Syntax errors in {}, keeping recoverable symbols",
                request.file_path.display()
            );
        }

        let mut walker = Walker {
            language: request.language,
            source: request.source,
            scope: Vec::new(),
            symbols: Vec::new(),
            raw_imports: Vec::new(),
        };
        walker.visit_children(root);

        let imports = walker
            .raw_imports
            .iter()
            .map(|raw| request.import(raw))
            .collect();

        Ok(ParsedFile {
            symbols: walker.symbols,
            imports,
        })
    }
}

struct Walker<'s> {
    language: Language,
    source: &'s str,
    /// Enclosing symbols, innermost last.
    scope: Vec<(String, SymbolKind)>,
    symbols: Vec<Symbol>,
    raw_imports: Vec<String>,
}

impl<'s> Walker<'s> {
    fn visit_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        if self.collect_imports(node) {
            return;
        }

        let Some((kind, name, body)) = self.symbol_of(node) else {
            self.visit_children(node);
            return;
        };

        let kind = match (kind, self.scope.last()) {
            (SymbolKind::Function, Some((_, parent_kind))) if parent_kind.is_class_like() => {
                SymbolKind::Method
            }
            _ => kind,
        };

        let (start_line, end_line) = line_range(node);
        let mut symbol = Symbol::new(name.clone(), kind, start_line, end_line);
        if let Some((parent, _)) = self.scope.last() {
            symbol = symbol.with_parent(parent.clone());
        }
        self.symbols.push(symbol);

        self.scope.push((name, kind));
        self.visit_children(body);
        self.scope.pop();
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.text(n).trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Symbol kind, name and the node whose children hold nested symbols.
    fn symbol_of<'t>(&self, node: Node<'t>) -> Option<(SymbolKind, String, Node<'t>)> {
        let named = |kind| self.field_text(node, "name").map(|name| (kind, name, node));

        match (self.language, node.kind()) {
            (Language::Rust, "function_item" | "function_signature_item") => {
                named(SymbolKind::Function)
            }
            (Language::Rust, "struct_item" | "enum_item" | "union_item" | "trait_item") => {
                named(SymbolKind::Class)
            }
            (Language::Rust, "impl_item") => self
                .field_text(node, "type")
                .map(|name| (SymbolKind::Class, name, node)),
            (Language::Rust, "mod_item") => {
                node.child_by_field_name("body")?;
                named(SymbolKind::Module)
            }

            (Language::Python, "function_definition") => named(SymbolKind::Function),
            (Language::Python, "class_definition") => named(SymbolKind::Class),
            (Language::Python, "decorated_definition") => {
                let inner = node.child_by_field_name("definition")?;
                let (kind, name, _) = self.symbol_of(inner)?;
                Some((kind, name, inner))
            }

            (
                Language::JavaScript | Language::TypeScript,
                "function_declaration" | "generator_function_declaration" | "method_definition",
            ) => named(SymbolKind::Function),
            (
                Language::JavaScript | Language::TypeScript,
                "class_declaration" | "abstract_class_declaration" | "interface_declaration"
                | "enum_declaration",
            ) => named(SymbolKind::Class),
            (Language::TypeScript, "internal_module" | "module") => named(SymbolKind::Module),
            (
                Language::JavaScript | Language::TypeScript,
                "lexical_declaration" | "variable_declaration",
            ) => self.function_binding(node),

            _ => None,
        }
    }

    /// `const handler = () => {}` names a function.
    fn function_binding<'t>(&self, node: Node<'t>) -> Option<(SymbolKind, String, Node<'t>)> {
        if node.named_child_count() != 1 {
            return None;
        }
        let declarator = node.named_child(0)?;
        let value = declarator.child_by_field_name("value")?;
        if !matches!(
            value.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        ) {
            return None;
        }
        let name = self.field_text(declarator, "name")?;
        Some((SymbolKind::Function, name, value))
    }

    /// Records module strings of an import node. Returns true when the node
    /// was an import statement and needs no further traversal.
    fn collect_imports(&mut self, node: Node<'_>) -> bool {
        match (self.language, node.kind()) {
            (Language::Rust, "use_declaration") => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    self.rust_use_paths(argument);
                }
                true
            }
            (Language::Rust, "extern_crate_declaration") => {
                if let Some(name) = self.field_text(node, "name") {
                    self.raw_imports.push(name);
                }
                true
            }

            (Language::Python, "import_statement") => {
                let mut cursor = node.walk();
                let modules: Vec<String> = node
                    .named_children(&mut cursor)
                    .filter_map(|child| match child.kind() {
                        "dotted_name" => Some(self.text(child).to_string()),
                        "aliased_import" => self.field_text(child, "name"),
                        _ => None,
                    })
                    .collect();
                self.raw_imports.extend(modules);
                true
            }
            (Language::Python, "import_from_statement") => {
                if let Some(module) = self.field_text(node, "module_name") {
                    self.raw_imports.push(module);
                }
                true
            }

            (Language::JavaScript | Language::TypeScript, "import_statement") => {
                if let Some(source) = self.field_text(node, "source") {
                    self.raw_imports.push(strip_quotes(&source).to_string());
                }
                true
            }
            (Language::JavaScript | Language::TypeScript, "export_statement") => {
                // Re-exports carry a source; plain exports wrap declarations.
                match self.field_text(node, "source") {
                    Some(source) => {
                        self.raw_imports.push(strip_quotes(&source).to_string());
                        true
                    }
                    None => false,
                }
            }
            (Language::JavaScript | Language::TypeScript, "call_expression") => {
                let is_require = node
                    .child_by_field_name("function")
                    .is_some_and(|f| self.text(f) == "require");
                if is_require {
                    let first_arg = node
                        .child_by_field_name("arguments")
                        .and_then(|args| args.named_child(0))
                        .filter(|arg| arg.kind() == "string");
                    if let Some(arg) = first_arg {
                        self.raw_imports.push(strip_quotes(self.text(arg)).to_string());
                    }
                }
                false
            }
            _ => false,
        }
    }

    fn rust_use_paths(&mut self, node: Node<'_>) {
        match node.kind() {
            // std::collections::{HashMap, HashSet}
            "scoped_use_list" => match node.child_by_field_name("path") {
                Some(path) => self.raw_imports.push(self.text(path).to_string()),
                None => {
                    if let Some(list) = node.child_by_field_name("list") {
                        self.rust_use_paths(list);
                    }
                }
            },
            "use_list" => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.rust_use_paths(child);
                }
            }
            "use_as_clause" => {
                if let Some(path) = node.child_by_field_name("path") {
                    self.raw_imports.push(self.text(path).to_string());
                }
            }
            _ => {
                let text = self.text(node).trim().trim_end_matches("::*");
                if !text.is_empty() {
                    self.raw_imports.push(text.to_string());
                }
            }
        }
    }
}

fn line_range(node: Node<'_>) -> (usize, usize) {
    let start = node.start_position();
    let end = node.end_position();
    let start_line = start.row + 1;
    // A node ending at column 0 stops before that row's first character.
    let end_line = if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    };
    (start_line, end_line.max(start_line))
}

fn strip_quotes(text: &str) -> &str {
    text.trim().trim_matches(|c| c == '\'' || c == '"' || c == '`')
}
