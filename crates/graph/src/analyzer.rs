use crate::error::{GraphError, Result};
use crate::package::package_name;
use codestack_code_chunker::{Import, ImportKind};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const MOST_DEPENDED_LIMIT: usize = 5;

/// Per-repository import summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDependencies {
    pub repo_name: String,
    pub internal_import_count: usize,
    pub external_import_count: usize,
    pub unresolved_import_count: usize,
    /// Packages of external and unresolved imports.
    pub external_packages: BTreeSet<String>,
    /// `(source_file, resolved_file)` for internal imports that resolved.
    pub internal_edges: Vec<(String, String)>,
    /// Files with the most incoming internal edges, with their counts.
    pub most_depended_files: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CrossRepoEdge {
    pub source_repo: String,
    pub target_repo: String,
    pub package: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRepoSuggestion {
    /// De-prefixed package name, i.e. the repository name to add.
    pub package: String,
    pub referenced_by: Vec<String>,
}

/// Derives dependency facts from `(repo_name, imports)` sets.
///
/// Every query is recomputed from its inputs; nothing is cached between calls.
#[derive(Debug, Clone, Default)]
pub struct DependencyAnalyzer {
    org_prefixes: Vec<String>,
}

impl DependencyAnalyzer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            org_prefixes: Vec::new(),
        }
    }

    /// Organization prefixes such as `@acme/`. Packages carrying one are
    /// candidate references to repositories named after the remainder.
    pub fn with_org_prefixes<I, S>(prefixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut org_prefixes = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.into();
            if prefix.trim().is_empty() {
                return Err(GraphError::InvalidPrefix(prefix));
            }
            org_prefixes.push(prefix);
        }
        // Longest first so `@acme/platform-` wins over `@acme/`.
        org_prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        org_prefixes.dedup();
        Ok(Self { org_prefixes })
    }

    #[must_use]
    pub fn org_prefixes(&self) -> &[String] {
        &self.org_prefixes
    }

    #[must_use]
    pub fn analyze(&self, repo_name: &str, imports: &[Import]) -> RepoDependencies {
        let mut summary = RepoDependencies {
            repo_name: repo_name.to_string(),
            ..RepoDependencies::default()
        };
        let mut edges = BTreeSet::new();

        for import in imports {
            match import.resolved_kind {
                ImportKind::Internal => {
                    summary.internal_import_count += 1;
                    if let Some(target) = &import.resolved_path {
                        if *target != import.source_file {
                            edges.insert((import.source_file.clone(), target.clone()));
                        }
                    }
                }
                ImportKind::External | ImportKind::Unresolved => {
                    if import.resolved_kind == ImportKind::External {
                        summary.external_import_count += 1;
                    } else {
                        summary.unresolved_import_count += 1;
                    }
                    let package = package_name(import.language, &import.raw_module);
                    if !package.is_empty() {
                        summary.external_packages.insert(package);
                    }
                }
            }
        }

        let mut incoming: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, target) in &edges {
            *incoming.entry(target.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<(String, usize)> = incoming
            .into_iter()
            .map(|(file, count)| (file.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(MOST_DEPENDED_LIMIT);
        summary.most_depended_files = ranked;

        summary.internal_edges = edges.into_iter().collect();
        summary
    }

    /// Edges from a repository onto another catalog repository it imports.
    #[must_use]
    pub fn cross_repo_dependencies(
        &self,
        imports_by_repo: &BTreeMap<String, Vec<Import>>,
        catalog: &BTreeSet<String>,
    ) -> Vec<CrossRepoEdge> {
        let mut edges = BTreeSet::new();
        for (repo, imports) in imports_by_repo {
            for package in self.analyze(repo, imports).external_packages {
                let Some(candidate) = self.candidate_repo(&package) else {
                    continue;
                };
                if candidate == *repo || !catalog.contains(&candidate) {
                    continue;
                }
                edges.insert(CrossRepoEdge {
                    source_repo: repo.clone(),
                    target_repo: candidate,
                    package,
                });
            }
        }
        edges.into_iter().collect()
    }

    /// Prefixed packages that name no catalog repository, aggregated across
    /// the repositories that import them. Empty without configured prefixes.
    #[must_use]
    pub fn suggest_missing_repos(
        &self,
        imports_by_repo: &BTreeMap<String, Vec<Import>>,
        catalog: &BTreeSet<String>,
    ) -> Vec<MissingRepoSuggestion> {
        if self.org_prefixes.is_empty() {
            return Vec::new();
        }

        let mut missing: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (repo, imports) in imports_by_repo {
            for package in self.analyze(repo, imports).external_packages {
                let Some(candidate) = self.strip_prefix(&package) else {
                    continue;
                };
                if candidate == *repo || catalog.contains(&candidate) {
                    continue;
                }
                missing.entry(candidate).or_default().insert(repo.clone());
            }
        }

        missing
            .into_iter()
            .map(|(package, repos)| MissingRepoSuggestion {
                package,
                referenced_by: repos.into_iter().collect(),
            })
            .collect()
    }

    /// File-level import cycles inside one repository. Each cycle lists its
    /// files in sorted order.
    #[must_use]
    pub fn circular_dependencies(&self, imports: &[Import]) -> Vec<Vec<String>> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        let mut node = |graph: &mut DiGraph<String, ()>, file: &str| -> NodeIndex {
            *nodes
                .entry(file.to_string())
                .or_insert_with(|| graph.add_node(file.to_string()))
        };

        for import in imports {
            if import.resolved_kind != ImportKind::Internal {
                continue;
            }
            let Some(target) = &import.resolved_path else {
                continue;
            };
            let from = node(&mut graph, &import.source_file);
            let to = node(&mut graph, target);
            graph.update_edge(from, to, ());
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut files: Vec<String> =
                    component.into_iter().map(|idx| graph[idx].clone()).collect();
                files.sort();
                files
            })
            .collect();
        cycles.sort();

        if !cycles.is_empty() {
            log::debug!("Found {} import cycles", cycles.len());
        }
        cycles
    }

    /// Imports of `package` (as reported in `external_packages`).
    #[must_use]
    pub fn package_usages<'a>(&self, imports: &'a [Import], package: &str) -> Vec<&'a Import> {
        imports
            .iter()
            .filter(|import| import.resolved_kind != ImportKind::Internal)
            .filter(|import| package_name(import.language, &import.raw_module) == package)
            .collect()
    }

    /// Repository name a package may refer to. With prefixes configured only
    /// prefixed packages qualify; without them the package name itself.
    fn candidate_repo(&self, package: &str) -> Option<String> {
        if self.org_prefixes.is_empty() {
            return Some(package.to_string());
        }
        self.strip_prefix(package)
    }

    fn strip_prefix(&self, package: &str) -> Option<String> {
        self.org_prefixes.iter().find_map(|prefix| {
            package
                .strip_prefix(prefix.as_str())
                .map(|rest| rest.trim_start_matches('/'))
                .filter(|rest| !rest.is_empty())
                .map(str::to_string)
        })
    }
}
