mod common;

use async_trait::async_trait;
use codestack_code_chunker::{ImportKind, Language};
use codestack_indexer::{
    CatalogSettings, FileFilter, IndexerError, RepoIndexer, RepoRecord, RepoStatus, StackManager,
};
use codestack_vector_store::{
    Embedder, HashingEmbedder, JsonVectorStore, VectorStore, VectorStoreError,
};
use common::{seed_three_file_repo, write, FakeGit};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    repo: std::path::PathBuf,
    stack: Arc<StackManager>,
    store: Arc<JsonVectorStore>,
    git: Arc<FakeGit>,
    indexer: RepoIndexer,
}

async fn harness_with(embedder: Arc<dyn Embedder>) -> Harness {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("demo");
    std::fs::create_dir_all(&repo).unwrap();

    let stack = Arc::new(
        StackManager::open(dir.path().join("stack.json"), &CatalogSettings::default())
            .await
            .unwrap(),
    );
    let store = Arc::new(JsonVectorStore::in_memory());
    let git = Arc::new(FakeGit::default());
    let indexer = RepoIndexer::new(Arc::clone(&stack), embedder, store.clone())
        .with_git(git.clone())
        .with_max_concurrent_files(2);

    Harness {
        _dir: dir,
        repo,
        stack,
        store,
        git,
        indexer,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(HashingEmbedder::new(64).unwrap())).await
}

async fn register(h: &Harness, path: &Path) -> RepoRecord {
    h.stack
        .register(RepoRecord::new("demo", path))
        .await
        .unwrap()
}

#[tokio::test]
async fn parse_failure_is_recorded_and_the_rest_indexed() {
    let h = harness().await;
    seed_three_file_repo(&h.repo);
    h.git.set_commit(&h.repo, "c1");
    let record = register(&h, &h.repo).await;

    let result = h.indexer.index(&record, &FileFilter::new(), 4).await.unwrap();

    assert_eq!(result.files_processed, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].file_path, "pkg/broken.py");
    assert!(result.chunks_indexed > 0);
    assert_eq!(result.commit_hash.as_deref(), Some("c1"));
    assert!(result
        .imports
        .iter()
        .any(|i| i.raw_module == "os" && i.resolved_kind == ImportKind::External));

    let stored = h.stack.get("demo").await.unwrap().unwrap();
    assert_eq!(stored.status, RepoStatus::Indexed);
    assert_eq!(stored.files_indexed, 3);
    assert_eq!(stored.chunks_indexed, result.chunks_indexed);
    assert_eq!(stored.last_commit_hash.as_deref(), Some("c1"));
    assert!(stored.last_indexed_at.is_some());
    assert_eq!(stored.last_error, None);

    let stats = h.store.repo_stats("demo").await.unwrap();
    assert_eq!(stats.chunks, result.chunks_indexed);
    assert_eq!(stats.files, 2);
    assert!(stats.languages.contains(&Language::Python));
}

#[tokio::test]
async fn unchanged_commit_makes_reindex_a_no_op() {
    let h = harness().await;
    seed_three_file_repo(&h.repo);
    h.git.set_commit(&h.repo, "c1");
    let record = register(&h, &h.repo).await;
    h.indexer.index(&record, &FileFilter::new(), 8).await.unwrap();

    let result = h.indexer.reindex("demo", false).await.unwrap();
    assert_eq!(result.files_processed, 0);
    assert_eq!(result.chunks_indexed, 0);
    assert!(result.unchanged);

    let forced = h.indexer.reindex("demo", true).await.unwrap();
    assert_eq!(forced.files_processed, 3);
    assert!(!forced.unchanged);

    h.git.set_commit(&h.repo, "c2");
    let moved = h.indexer.reindex("demo", false).await.unwrap();
    assert_eq!(moved.files_processed, 3);
    assert_eq!(
        h.stack.get("demo").await.unwrap().unwrap().last_commit_hash.as_deref(),
        Some("c2")
    );
}

#[tokio::test]
async fn repository_without_commit_is_always_reindexed() {
    let h = harness().await;
    write(&h.repo, "main.py", common::TWO_FUNCTIONS);
    let record = register(&h, &h.repo).await;
    let first = h.indexer.index(&record, &FileFilter::new(), 8).await.unwrap();
    assert_eq!(first.commit_hash, None);

    let again = h.indexer.reindex("demo", false).await.unwrap();
    assert_eq!(again.files_processed, 1);
}

#[tokio::test]
async fn missing_path_marks_error_and_keeps_counts() {
    let h = harness().await;
    let gone = h.repo.join("does-not-exist");
    let record = register(&h, &gone).await;

    let err = h
        .indexer
        .index(&record, &FileFilter::new(), 8)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::RepoPathInvalid(_)));

    let stored = h.stack.get("demo").await.unwrap().unwrap();
    assert_eq!(stored.status, RepoStatus::Error);
    assert!(stored.last_error.unwrap().contains("does-not-exist"));
    assert_eq!(stored.last_commit_hash, None);
    assert_eq!(stored.files_indexed, 0);

    std::fs::create_dir_all(&gone).unwrap();
    write(&gone, "ok.py", common::TWO_FUNCTIONS);
    let recovered = h.indexer.reindex("demo", false).await.unwrap();
    assert_eq!(recovered.files_processed, 1);
    assert_eq!(
        h.stack.get("demo").await.unwrap().unwrap().status,
        RepoStatus::Indexed
    );
}

#[tokio::test]
async fn reindex_replaces_chunks_of_deleted_files() {
    let h = harness().await;
    seed_three_file_repo(&h.repo);
    let record = register(&h, &h.repo).await;
    h.indexer.index(&record, &FileFilter::new(), 8).await.unwrap();
    assert_eq!(h.store.repo_stats("demo").await.unwrap().files, 2);

    std::fs::remove_file(h.repo.join("pkg/four.py")).unwrap();
    let result = h.indexer.reindex("demo", true).await.unwrap();
    assert_eq!(result.files_processed, 2);

    let stats = h.store.repo_stats("demo").await.unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.chunks, result.chunks_indexed);
}

#[tokio::test]
async fn repository_already_indexing_is_a_conflict() {
    let h = harness().await;
    seed_three_file_repo(&h.repo);
    let record = register(&h, &h.repo).await;
    h.stack
        .transition("demo", RepoStatus::Pending, RepoStatus::Indexing)
        .await
        .unwrap();

    let err = h
        .indexer
        .index(&record, &FileFilter::new(), 8)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        h.stack.get("demo").await.unwrap().unwrap().status,
        RepoStatus::Indexing
    );
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn filter_rejections_count_as_skipped() {
    let h = harness().await;
    seed_three_file_repo(&h.repo);
    write(&h.repo, "web/app.ts", "export const x = 1;\n");
    write(&h.repo, "README.md", "# demo\n");
    write(&h.repo, "node_modules/dep/index.py", "def dep():\n    pass\n");
    let record = register(&h, &h.repo).await;

    let filter = FileFilter::new()
        .with_languages([Language::Python])
        .with_excluded_paths(["node_modules".to_string()]);
    let result = h.indexer.index(&record, &filter, 8).await.unwrap();
    assert_eq!(result.files_processed, 3);
    assert_eq!(result.files_skipped, 3);
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn dimension(&self) -> usize {
        8
    }

    async fn embed(&self, _texts: &[String]) -> codestack_vector_store::Result<Vec<Vec<f32>>> {
        Err(VectorStoreError::EmbeddingError("model offline".to_string()))
    }
}

#[tokio::test]
async fn embedding_failure_is_fatal_for_the_run() {
    let h = harness_with(Arc::new(BrokenEmbedder)).await;
    seed_three_file_repo(&h.repo);
    h.git.set_commit(&h.repo, "c1");
    let record = register(&h, &h.repo).await;

    let err = h
        .indexer
        .index(&record, &FileFilter::new(), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::VectorStoreError(_)));

    let stored = h.stack.get("demo").await.unwrap().unwrap();
    assert_eq!(stored.status, RepoStatus::Error);
    assert!(stored.last_error.unwrap().contains("model offline"));
    assert_eq!(stored.last_commit_hash, None);
    assert_eq!(stored.chunks_indexed, 0);
}
