//! Internal/external classification of import strings.

use crate::language::Language;
use crate::types::ImportKind;
use std::path::{Component, Path, PathBuf};

const JS_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts"];
const RUST_PRELUDE_CRATES: &[&str] = &["std", "core", "alloc", "proc_macro", "test"];

/// Repository-relative path with `/` separators.
pub fn relative_to_root(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut normalized = relative.to_string_lossy().to_string();
    if normalized.contains('\\') {
        normalized = normalized.replace('\\', "/");
    }
    normalized
}

/// Classify `raw` as imported from `file_path`. Internal imports that map to
/// an existing file also return its repository-relative path.
pub fn classify_import(
    language: Language,
    raw: &str,
    repo_root: &Path,
    file_path: &Path,
) -> (ImportKind, Option<String>) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (ImportKind::Unresolved, None);
    }
    let file_dir = file_path.parent().unwrap_or(repo_root);

    match language {
        Language::Rust => classify_rust(raw, repo_root, file_dir),
        Language::Python => classify_python(raw, repo_root, file_dir),
        Language::JavaScript | Language::TypeScript => classify_relative_path(
            raw,
            repo_root,
            file_dir,
            JS_EXTENSIONS,
            &["index.ts", "index.tsx", "index.js"],
        ),
        Language::Ruby => classify_ruby(raw, repo_root, file_dir),
        Language::C | Language::Cpp => {
            if let Some(local) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                classify_relative_path(&format!("./{local}"), repo_root, file_dir, &[], &[])
            } else {
                (ImportKind::External, None)
            }
        }
        Language::Go => {
            // Module-local packages are recognised by the go.mod module path.
            match go_module_path(repo_root) {
                Some(module) if raw == module || raw.starts_with(&format!("{module}/")) => {
                    let sub = raw.trim_start_matches(&module).trim_start_matches('/');
                    let dir = repo_root.join(sub);
                    let resolved = dir.is_dir().then(|| relative_to_root(repo_root, &dir));
                    (ImportKind::Internal, resolved)
                }
                _ => (ImportKind::External, None),
            }
        }
        _ => (ImportKind::External, None),
    }
}

fn classify_rust(raw: &str, repo_root: &Path, file_dir: &Path) -> (ImportKind, Option<String>) {
    let path = raw.split(" as ").next().unwrap_or(raw);
    let path = path.split('{').next().unwrap_or(path).trim_end_matches("::");
    let mut segments = path.split("::").map(str::trim).filter(|s| !s.is_empty());
    let Some(first) = segments.next() else {
        return (ImportKind::Unresolved, None);
    };

    let src_root = nearest_src_dir(file_dir, repo_root);
    match first {
        "crate" => {
            let resolved = segments
                .next()
                .and_then(|module| rust_module_file(&src_root, module))
                .map(|p| relative_to_root(repo_root, &p));
            (ImportKind::Internal, resolved)
        }
        "self" | "super" => (ImportKind::Internal, None),
        name if RUST_PRELUDE_CRATES.contains(&name) => (ImportKind::External, None),
        name => match rust_module_file(&src_root, name) {
            Some(p) => (ImportKind::Internal, Some(relative_to_root(repo_root, &p))),
            None => (ImportKind::External, None),
        },
    }
}

fn nearest_src_dir(file_dir: &Path, repo_root: &Path) -> PathBuf {
    file_dir
        .ancestors()
        .take_while(|dir| dir.starts_with(repo_root))
        .find(|dir| dir.file_name().is_some_and(|n| n == "src"))
        .map_or_else(|| repo_root.join("src"), Path::to_path_buf)
}

fn rust_module_file(src_root: &Path, module: &str) -> Option<PathBuf> {
    [
        src_root.join(format!("{module}.rs")),
        src_root.join(module).join("mod.rs"),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

fn classify_python(raw: &str, repo_root: &Path, file_dir: &Path) -> (ImportKind, Option<String>) {
    if raw.starts_with('.') {
        let levels = raw.chars().take_while(|&c| c == '.').count();
        let suffix = &raw[levels..];
        let mut base = file_dir.to_path_buf();
        for _ in 0..levels.saturating_sub(1) {
            base = base.parent().map_or_else(|| base.clone(), Path::to_path_buf);
        }
        let resolved = python_module_file(&base, suffix).map(|p| relative_to_root(repo_root, &p));
        return (ImportKind::Internal, resolved);
    }

    for base in [repo_root.to_path_buf(), repo_root.join("src"), file_dir.to_path_buf()] {
        if let Some(p) = python_module_file(&base, raw) {
            if p.starts_with(repo_root) {
                return (ImportKind::Internal, Some(relative_to_root(repo_root, &p)));
            }
        }
        // `from pkg.mod import name` where only the package exists locally.
        let top = raw.split('.').next().unwrap_or(raw);
        if top != raw {
            if let Some(p) = python_module_file(&base, top) {
                if p.starts_with(repo_root) {
                    return (ImportKind::Internal, Some(relative_to_root(repo_root, &p)));
                }
            }
        }
    }
    (ImportKind::External, None)
}

fn python_module_file(base: &Path, dotted: &str) -> Option<PathBuf> {
    if dotted.is_empty() {
        let init = base.join("__init__.py");
        return init.is_file().then_some(init);
    }
    let rel = dotted.replace('.', "/");
    [base.join(format!("{rel}.py")), base.join(&rel).join("__init__.py")]
        .into_iter()
        .find(|p| p.is_file())
}

fn classify_ruby(raw: &str, repo_root: &Path, file_dir: &Path) -> (ImportKind, Option<String>) {
    let name = raw.trim_matches(|c| c == '\'' || c == '"');
    if name.starts_with('.') {
        return classify_relative_path(name, repo_root, file_dir, &["rb"], &[]);
    }
    for base in [repo_root.join("lib"), repo_root.to_path_buf()] {
        let candidate = base.join(format!("{name}.rb"));
        if candidate.is_file() {
            return (ImportKind::Internal, Some(relative_to_root(repo_root, &candidate)));
        }
    }
    (ImportKind::External, None)
}

fn classify_relative_path(
    raw: &str,
    repo_root: &Path,
    file_dir: &Path,
    extensions: &[&str],
    index_files: &[&str],
) -> (ImportKind, Option<String>) {
    let is_relative = raw.starts_with("./") || raw.starts_with("../") || raw == "." || raw == "..";
    if !is_relative && !raw.starts_with('/') {
        // Path aliases (`@/x`, `~/x`) depend on bundler config we do not read.
        if raw.starts_with("@/") || raw.starts_with("~/") {
            return (ImportKind::Unresolved, None);
        }
        return (ImportKind::External, None);
    }

    let joined = if raw.starts_with('/') {
        repo_root.join(raw.trim_start_matches('/'))
    } else {
        file_dir.join(raw)
    };
    let target = normalize_lexically(&joined);
    if !target.starts_with(repo_root) {
        return (ImportKind::Unresolved, None);
    }

    let mut candidates = vec![target.clone()];
    for ext in extensions {
        let mut with_ext = target.clone().into_os_string();
        with_ext.push(format!(".{ext}"));
        candidates.push(PathBuf::from(with_ext));
    }
    candidates.extend(index_files.iter().map(|index| target.join(index)));

    let resolved = candidates
        .into_iter()
        .find(|p| p.is_file())
        .map(|p| relative_to_root(repo_root, &p));
    (ImportKind::Internal, resolved)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn go_module_path(repo_root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(repo_root.join("go.mod")).ok()?;
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("module "))
        .map(|m| m.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/app")).unwrap();
        fs::write(dir.path().join("src/app/models.py"), "").unwrap();
        fs::write(dir.path().join("src/app/__init__.py"), "").unwrap();
        fs::write(dir.path().join("src/config.rs"), "").unwrap();
        fs::write(dir.path().join("src/app/util.ts"), "").unwrap();
        dir
    }

    #[test]
    fn python_relative_and_absolute() {
        let dir = repo();
        let root = dir.path();
        let file = root.join("src/app/views.py");

        assert_eq!(
            classify_import(Language::Python, ".models", root, &file),
            (ImportKind::Internal, Some("src/app/models.py".to_string()))
        );
        assert_eq!(
            classify_import(Language::Python, "app.models", root, &file),
            (ImportKind::Internal, Some("src/app/models.py".to_string()))
        );
        assert_eq!(
            classify_import(Language::Python, "requests", root, &file),
            (ImportKind::External, None)
        );
    }

    #[test]
    fn rust_crate_paths_are_internal() {
        let dir = repo();
        let root = dir.path();
        let file = root.join("src/main.rs");

        assert_eq!(
            classify_import(Language::Rust, "crate::config::Settings", root, &file),
            (ImportKind::Internal, Some("src/config.rs".to_string()))
        );
        assert_eq!(
            classify_import(Language::Rust, "super::helpers", root, &file).0,
            ImportKind::Internal
        );
        assert_eq!(
            classify_import(Language::Rust, "std::collections::HashMap", root, &file).0,
            ImportKind::External
        );
        assert_eq!(
            classify_import(Language::Rust, "serde::Deserialize", root, &file).0,
            ImportKind::External
        );
    }

    #[test]
    fn javascript_relative_resolves_extensions() {
        let dir = repo();
        let root = dir.path();
        let file = root.join("src/app/index.ts");

        assert_eq!(
            classify_import(Language::TypeScript, "./util", root, &file),
            (ImportKind::Internal, Some("src/app/util.ts".to_string()))
        );
        assert_eq!(
            classify_import(Language::TypeScript, "@acme/shared-lib", root, &file),
            (ImportKind::External, None)
        );
        assert_eq!(
            classify_import(Language::TypeScript, "../../../outside", root, &file).0,
            ImportKind::Unresolved
        );
        assert_eq!(
            classify_import(Language::TypeScript, "@/components/x", root, &file).0,
            ImportKind::Unresolved
        );
    }

    #[test]
    fn empty_module_is_unresolved() {
        let dir = repo();
        let file = dir.path().join("a.py");
        assert_eq!(
            classify_import(Language::Python, "  ", dir.path(), &file),
            (ImportKind::Unresolved, None)
        );
    }
}
