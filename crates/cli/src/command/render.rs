//! Plain-text output for the non-JSON mode.

use codestack_indexer::{
    AddedRepo, CrossRepoEdge, IndexResult, MissingRepoSuggestion, RepoDependencies, RepoRecord,
    StackStats, SweepOutcome,
};
use std::fmt::Write as _;

fn short_commit(commit: Option<&str>) -> &str {
    commit.map_or("-", |c| &c[..c.len().min(8)])
}

pub fn records(records: &[RepoRecord]) -> String {
    if records.is_empty() {
        return "No repositories registered.".to_string();
    }
    let width = records.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
    let mut out = format!(
        "{:<width$}  {:<8}  {:>6}  {:>7}  {:<8}  PATH\n",
        "NAME", "STATUS", "FILES", "CHUNKS", "COMMIT"
    );
    for record in records {
        let _ = writeln!(
            out,
            "{:<width$}  {:<8}  {:>6}  {:>7}  {:<8}  {}",
            record.name,
            record.status.as_str(),
            record.files_indexed,
            record.chunks_indexed,
            short_commit(record.last_commit_hash.as_deref()),
            record.path.display()
        );
        if let Some(err) = &record.last_error {
            let _ = writeln!(out, "{:<width$}  ! {err}", "");
        }
    }
    out.trim_end().to_string()
}

pub fn stats(stats: &StackStats) -> String {
    let mut out = format!("Repositories: {}\n", stats.total_repos);
    for (status, count) in &stats.by_status {
        let _ = writeln!(out, "  {:<9} {count}", format!("{status}:"));
    }
    let _ = write!(
        out,
        "Files indexed: {}\nChunks indexed: {}",
        stats.total_files_indexed, stats.total_chunks_indexed
    );
    out
}

pub fn index_result(result: &IndexResult) -> String {
    if result.unchanged {
        return format!(
            "{}: unchanged at {}, nothing to do",
            result.repo_name,
            short_commit(result.commit_hash.as_deref())
        );
    }
    let mut out = format!(
        "{}: {} files, {} chunks in {}ms (commit {})",
        result.repo_name,
        result.files_processed,
        result.chunks_indexed,
        result.duration_ms,
        short_commit(result.commit_hash.as_deref())
    );
    if result.files_skipped > 0 {
        let _ = write!(out, ", {} files filtered out", result.files_skipped);
    }
    for error in &result.errors {
        let _ = write!(out, "\n  ! {}: {}", error.file_path, error.reason);
    }
    out
}

pub fn added(added: &AddedRepo) -> String {
    let mut out = format!(
        "Added {} ({})",
        added.record.name,
        added.record.path.display()
    );
    match &added.index {
        Some(result) => {
            let _ = write!(out, "\n{}", index_result(result));
        }
        None => out.push_str(" as pending"),
    }
    out
}

pub fn sweep(outcomes: &[SweepOutcome]) -> String {
    if outcomes.is_empty() {
        return "All repositories are up to date.".to_string();
    }
    outcomes
        .iter()
        .map(|outcome| match outcome {
            SweepOutcome::Indexed(result) => index_result(result),
            SweepOutcome::Skipped { repo_name, reason } => format!("{repo_name}: skipped ({reason})"),
            SweepOutcome::Failed { repo_name, error } => format!("{repo_name}: FAILED {error}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn names(names: &[String], empty: &str, heading: &str) -> String {
    if names.is_empty() {
        return empty.to_string();
    }
    let mut out = heading.to_string();
    for name in names {
        let _ = write!(out, "\n  {name}");
    }
    out
}

pub fn dependencies(summary: &RepoDependencies, cycles: &[Vec<String>]) -> String {
    let mut out = format!(
        "{}: {} internal, {} external, {} unresolved imports",
        summary.repo_name,
        summary.internal_import_count,
        summary.external_import_count,
        summary.unresolved_import_count
    );
    if !summary.external_packages.is_empty() {
        let packages: Vec<&str> = summary.external_packages.iter().map(String::as_str).collect();
        let _ = write!(out, "\nPackages: {}", packages.join(", "));
    }
    if !summary.most_depended_files.is_empty() {
        out.push_str("\nMost imported files:");
        for (file, count) in &summary.most_depended_files {
            let _ = write!(out, "\n  {file} ({count})");
        }
    }
    for cycle in cycles {
        let _ = write!(out, "\nCycle: {}", cycle.join(" -> "));
    }
    out
}

pub fn edges(edges: &[CrossRepoEdge]) -> String {
    if edges.is_empty() {
        return "No cross-repository dependencies.".to_string();
    }
    edges
        .iter()
        .map(|e| format!("{} -> {} (via {})", e.source_repo, e.target_repo, e.package))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn suggestions(suggestions: &[MissingRepoSuggestion]) -> String {
    if suggestions.is_empty() {
        return "No missing repositories.".to_string();
    }
    suggestions
        .iter()
        .map(|s| format!("{} (referenced by {})", s.package, s.referenced_by.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codestack_indexer::RepoStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn records_show_short_commit_and_errors() {
        let mut ok = RepoRecord::new("api", "/src/api");
        ok.status = RepoStatus::Indexed;
        ok.last_commit_hash = Some("0123456789abcdef".to_string());
        let mut broken = RepoRecord::new("web", "/src/web");
        broken.status = RepoStatus::Error;
        broken.last_error = Some("path vanished".to_string());

        let text = records(&[ok, broken]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("01234567"));
        assert!(!lines[1].contains("89abcdef"));
        assert!(lines[3].ends_with("! path vanished"));
    }

    #[test]
    fn empty_outputs_have_messages() {
        assert_eq!(records(&[]), "No repositories registered.");
        assert_eq!(sweep(&[]), "All repositories are up to date.");
        assert_eq!(names(&[], "none", "some:"), "none");
        assert_eq!(
            names(&["a".to_string()], "none", "Stale:"),
            "Stale:\n  a"
        );
    }

    #[test]
    fn suggestions_list_referencing_repos() {
        let text = suggestions(&[MissingRepoSuggestion {
            package: "shared-lib".to_string(),
            referenced_by: vec!["admin".to_string(), "web-app".to_string()],
        }]);
        assert_eq!(text, "shared-lib (referenced by admin, web-app)");
    }
}
