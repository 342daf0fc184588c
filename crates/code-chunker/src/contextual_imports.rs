//! Import lines duplicated into method chunks so a chunk stays self-contained.

use crate::language::Language;
use std::collections::HashSet;

/// Identifiers an import line brings into scope.
pub fn extract_identifiers_from_import(language: Language, import: &str) -> Vec<String> {
    let mut identifiers = Vec::new();

    match language {
        Language::Rust => {
            // use std::collections::{HashMap, HashSet}; -> HashMap, HashSet
            let import = import.trim_end_matches(';');
            if let Some(last_part) = import.split("::").last() {
                let last_part = last_part.trim();
                match last_part.strip_prefix('{') {
                    Some(inner) => push_idents(&mut identifiers, inner.trim_end_matches('}')),
                    None => push_idents(&mut identifiers, last_part),
                }
            }
        }
        Language::Python => {
            // from x import A, B -> A, B; import x.y -> y
            match import.split_once(" import ") {
                Some((_, names)) => push_idents(&mut identifiers, names.trim_matches(|c| c == '(' || c == ')')),
                None => {
                    if let Some(module) = import.strip_prefix("import ") {
                        for part in module.split(',') {
                            let part = part.rsplit(" as ").next().unwrap_or(part).trim();
                            if let Some(leaf) = part.rsplit('.').next() {
                                identifiers.push(leaf.to_string());
                            }
                        }
                    }
                }
            }
        }
        Language::JavaScript | Language::TypeScript => {
            // import { A, B } from 'x' -> A, B; import Foo from 'x' -> Foo
            if let (Some(start), Some(end)) = (import.find('{'), import.find('}')) {
                if end > start + 1 {
                    push_idents(&mut identifiers, &import[start + 1..end]);
                }
            } else if let Some(rest) = import.strip_prefix("import ") {
                if let Some((binding, _)) = rest.split_once(" from ") {
                    push_idents(&mut identifiers, binding.trim_start_matches("* as "));
                }
            }
        }
        _ => {}
    }

    identifiers
}

fn push_idents(out: &mut Vec<String>, inner: &str) {
    for ident in inner.split(',') {
        // `A as B` binds B
        let ident = ident.rsplit(" as ").next().unwrap_or(ident).trim();
        if !ident.is_empty() && ident != "*" {
            out.push(ident.to_string());
        }
    }
}

/// Imports whose bound identifiers occur in `body`, at most `limit`. Languages
/// without an identifier heuristic keep the first `limit` imports.
pub fn filter_relevant_imports(
    language: Language,
    file_imports: &[String],
    body: &str,
    limit: usize,
) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    let has_heuristic = matches!(
        language,
        Language::Rust | Language::Python | Language::JavaScript | Language::TypeScript
    );
    file_imports
        .iter()
        .filter(|import| {
            !has_heuristic
                || extract_identifiers_from_import(language, import)
                    .iter()
                    .any(|ident| body.contains(ident.as_str()))
        })
        .take(limit)
        .cloned()
        .collect()
}

/// Distinct import lines, trimmed, in source order.
pub fn extract_imports_from_lines(language: Language, lines: &[&str], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    lines
        .iter()
        .copied()
        .map(str::trim)
        .filter(|line| is_import_line(language, line))
        .map(|line| line.trim_end_matches(';').trim_end())
        .filter(|line| !line.is_empty() && seen.insert(*line))
        .take(limit)
        .map(str::to_string)
        .collect()
}

pub fn is_import_line(language: Language, line: &str) -> bool {
    language
        .import_patterns()
        .iter()
        .any(|pattern| line.starts_with(pattern) || (*pattern == "require(" && line.contains(pattern)))
}
