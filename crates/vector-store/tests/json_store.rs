use codestack_code_chunker::{Chunk, Language};
use codestack_vector_store::{
    Embedder, HashingEmbedder, JsonVectorStore, QueryFilters, VectorStore, VectorStoreError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn chunk(repo: &str, file: &str, start: usize, language: Language, text: &str) -> Chunk {
    Chunk {
        repo_name: repo.to_string(),
        file_path: file.to_string(),
        start_line: start,
        end_line: start + 3,
        symbol_name: None,
        symbol_kind: None,
        parent_symbol: None,
        symbols: Vec::new(),
        language,
        leading_context: None,
        text: text.to_string(),
        token_estimate: text.len().div_ceil(4),
    }
}

async fn seeded(store: &JsonVectorStore, embedder: &HashingEmbedder) {
    let chunks = vec![
        chunk("api", "src/users.py", 1, Language::Python, "def load_user(user_id): return db.get(user_id)"),
        chunk("api", "src/orders.py", 1, Language::Python, "def create_order(cart): return Order(cart)"),
        chunk("web", "src/user.ts", 1, Language::TypeScript, "export function renderUser(user) { return user.name }"),
    ];
    let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
    let vectors = embedder.embed(&texts).await.unwrap();
    let written = store
        .upsert_batch(chunks.into_iter().zip(vectors).collect())
        .await
        .unwrap();
    assert_eq!(written, 3);
}

#[tokio::test]
async fn query_ranks_by_similarity_and_honours_filters() {
    let store = JsonVectorStore::in_memory();
    let embedder = HashingEmbedder::new(256).unwrap();
    seeded(&store, &embedder).await;

    let query = embedder.embed_one("load user by id");
    let hits = store.query(&query, 3, &QueryFilters::default()).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk.file_path, "src/users.py");
    assert!(hits[0].score >= hits[1].score);

    let web_only = store.query(&query, 5, &QueryFilters::repo("web")).await.unwrap();
    assert_eq!(web_only.len(), 1);
    assert_eq!(web_only[0].chunk.repo_name, "web");

    let orders = QueryFilters {
        language: Some(Language::Python),
        path_contains: Some("orders".to_string()),
        ..QueryFilters::default()
    };
    let hits = store.query(&query, 5, &orders).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "api:src/orders.py:1");
}

#[tokio::test]
async fn upsert_replaces_same_identity() {
    let store = JsonVectorStore::in_memory();
    let first = chunk("api", "a.py", 1, Language::Python, "old");
    let second = chunk("api", "a.py", 1, Language::Python, "new");
    store.upsert("api", first, vec![1.0, 0.0]).await.unwrap();
    store.upsert("api", second, vec![0.0, 1.0]).await.unwrap();

    assert_eq!(store.len().await, 1);
    let hits = store.query(&[0.0, 1.0], 1, &QueryFilters::default()).await.unwrap();
    assert_eq!(hits[0].chunk.text, "new");
}

#[tokio::test]
async fn delete_by_repo_only_touches_that_repo() {
    let store = JsonVectorStore::in_memory();
    let embedder = HashingEmbedder::new(32).unwrap();
    seeded(&store, &embedder).await;

    assert_eq!(store.delete_by_repo("api").await.unwrap(), 2);
    assert_eq!(store.delete_by_repo("api").await.unwrap(), 0);
    assert_eq!(store.list_repos().await.unwrap(), vec!["web".to_string()]);

    let stats = store.repo_stats("web").await.unwrap();
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.files, 1);
    assert!(stats.languages.contains(&Language::TypeScript));
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let store = JsonVectorStore::in_memory();
    store
        .upsert("api", chunk("api", "a.py", 1, Language::Python, "x"), vec![1.0, 0.0])
        .await
        .unwrap();
    let err = store
        .upsert("api", chunk("api", "b.py", 1, Language::Python, "y"), vec![1.0, 0.0, 0.0])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::DimensionMismatch { expected: 2, actual: 3 }
    ));
}

#[tokio::test]
async fn flush_then_reopen_restores_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("vectors.json");
    let embedder = HashingEmbedder::new(64).unwrap();

    let store = JsonVectorStore::open(&path).await.unwrap();
    seeded(&store, &embedder).await;
    store.flush().await.unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let reopened = JsonVectorStore::open(&path).await.unwrap();
    assert_eq!(reopened.len().await, 3);
    assert_eq!(
        reopened.list_repos().await.unwrap(),
        vec!["api".to_string(), "web".to_string()]
    );
}
