use codestack_code_chunker::{Import, ImportKind, Language};
use codestack_graph::{CrossRepoEdge, DependencyAnalyzer, MissingRepoSuggestion};
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, BTreeSet};

fn external(module: &str, file: &str) -> Import {
    Import::new(module, ImportKind::External, file, Language::TypeScript)
}

fn internal(module: &str, file: &str, target: &str) -> Import {
    Import::new(module, ImportKind::Internal, file, Language::TypeScript).resolved_to(target)
}

fn catalog(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

fn web_app_imports() -> BTreeMap<String, Vec<Import>> {
    let mut by_repo = BTreeMap::new();
    by_repo.insert(
        "web-app".to_string(),
        vec![
            external("@acme/shared-lib/client", "src/api.ts"),
            external("@acme/shared-lib", "src/index.ts"),
            external("react", "src/index.ts"),
            internal("./api", "src/index.ts", "src/api.ts"),
        ],
    );
    by_repo
}

#[test]
fn missing_prefixed_package_becomes_suggestion() {
    let analyzer = DependencyAnalyzer::with_org_prefixes(["@acme/"]).unwrap();
    let imports = web_app_imports();
    let catalog = catalog(&["web-app"]);

    assert_eq!(
        analyzer.suggest_missing_repos(&imports, &catalog),
        vec![MissingRepoSuggestion {
            package: "shared-lib".to_string(),
            referenced_by: vec!["web-app".to_string()],
        }]
    );
    assert!(analyzer.cross_repo_dependencies(&imports, &catalog).is_empty());
}

#[test]
fn catalog_repository_becomes_edge() {
    let analyzer = DependencyAnalyzer::with_org_prefixes(["@acme/"]).unwrap();
    let imports = web_app_imports();
    let catalog = catalog(&["web-app", "shared-lib"]);

    assert_eq!(
        analyzer.cross_repo_dependencies(&imports, &catalog),
        vec![CrossRepoEdge {
            source_repo: "web-app".to_string(),
            target_repo: "shared-lib".to_string(),
            package: "@acme/shared-lib".to_string(),
        }]
    );
    assert!(analyzer.suggest_missing_repos(&imports, &catalog).is_empty());
}

#[test]
fn suggestions_aggregate_referencing_repos() {
    let analyzer = DependencyAnalyzer::with_org_prefixes(["@acme/"]).unwrap();
    let mut imports = web_app_imports();
    imports.insert(
        "admin".to_string(),
        vec![external("@acme/shared-lib/forms", "src/forms.ts")],
    );

    let suggestions = analyzer.suggest_missing_repos(&imports, &catalog(&["web-app", "admin"]));
    assert_eq!(suggestions.len(), 1);
    assert_eq!(
        suggestions[0].referenced_by,
        vec!["admin".to_string(), "web-app".to_string()]
    );
}

#[test]
fn without_prefixes_only_exact_names_link() {
    let analyzer = DependencyAnalyzer::new();
    let mut imports = BTreeMap::new();
    imports.insert(
        "api".to_string(),
        vec![
            Import::new("billing.client", ImportKind::External, "app.py", Language::Python),
            Import::new("requests", ImportKind::External, "app.py", Language::Python),
            Import::new("api", ImportKind::External, "app.py", Language::Python),
        ],
    );
    let catalog = catalog(&["api", "billing"]);

    assert_eq!(
        analyzer.cross_repo_dependencies(&imports, &catalog),
        vec![CrossRepoEdge {
            source_repo: "api".to_string(),
            target_repo: "billing".to_string(),
            package: "billing".to_string(),
        }]
    );
    assert!(analyzer.suggest_missing_repos(&imports, &catalog).is_empty());
}

#[test]
fn analyze_counts_each_kind_and_keeps_unresolved() {
    let analyzer = DependencyAnalyzer::new();
    let imports = vec![
        internal("./a", "src/b.ts", "src/a.ts"),
        internal("./a", "src/c.ts", "src/a.ts"),
        internal("./missing", "src/c.ts", "src/missing.ts"),
        external("lodash/map", "src/c.ts"),
        Import::new("@/alias", ImportKind::Unresolved, "src/c.ts", Language::TypeScript),
    ];
    let summary = analyzer.analyze("web", &imports);

    assert_eq!(summary.internal_import_count, 3);
    assert_eq!(summary.external_import_count, 1);
    assert_eq!(summary.unresolved_import_count, 1);
    assert_eq!(
        summary.external_packages,
        ["@/alias", "lodash"].iter().map(|s| (*s).to_string()).collect()
    );
    assert_eq!(summary.most_depended_files[0], ("src/a.ts".to_string(), 2));
    assert_eq!(summary.internal_edges.len(), 3);
}

#[test]
fn cycles_are_found_with_scc() {
    let analyzer = DependencyAnalyzer::new();
    let imports = vec![
        internal("./b", "a.ts", "b.ts"),
        internal("./c", "b.ts", "c.ts"),
        internal("./a", "c.ts", "a.ts"),
        internal("./d", "c.ts", "d.ts"),
        internal("./e", "e.ts", "e.ts"),
    ];
    assert_eq!(
        analyzer.circular_dependencies(&imports),
        vec![
            vec!["a.ts".to_string(), "b.ts".to_string(), "c.ts".to_string()],
            vec!["e.ts".to_string()],
        ]
    );
}

#[test]
fn package_usages_list_importing_sites() {
    let analyzer = DependencyAnalyzer::new();
    let imports = web_app_imports().remove("web-app").unwrap();
    let usages = analyzer.package_usages(&imports, "@acme/shared-lib");
    let files: Vec<&str> = usages.iter().map(|i| i.source_file.as_str()).collect();
    assert_eq!(files, vec!["src/api.ts", "src/index.ts"]);
}

#[test]
fn blank_prefix_is_rejected() {
    assert!(DependencyAnalyzer::with_org_prefixes([" "]).is_err());
}
