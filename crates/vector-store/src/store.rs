use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use codestack_code_chunker::{Chunk, Language};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const STORE_FORMAT_VERSION: u32 = 1;

/// Restricts a query to a subset of the stored chunks. Empty fields match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilters {
    pub repos: Vec<String>,
    pub language: Option<Language>,
    pub path_contains: Option<String>,
}

impl QueryFilters {
    #[must_use]
    pub fn repo(name: impl Into<String>) -> Self {
        Self {
            repos: vec![name.into()],
            ..Self::default()
        }
    }

    fn matches(&self, chunk: &Chunk) -> bool {
        if !self.repos.is_empty() && !self.repos.iter().any(|r| *r == chunk.repo_name) {
            return false;
        }
        if self.language.is_some_and(|lang| lang != chunk.language) {
            return false;
        }
        if let Some(needle) = &self.path_contains {
            if !chunk.file_path.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoChunkStats {
    pub repo_name: String,
    pub chunks: usize,
    pub files: usize,
    pub languages: BTreeSet<Language>,
}

/// Chunk storage keyed by chunk identity, partitioned by repository.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace entries by chunk identity. Returns the number written.
    async fn upsert_batch(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<usize>;

    async fn upsert(&self, repo_name: &str, mut chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if chunk.repo_name != repo_name {
            chunk.repo_name = repo_name.to_string();
        }
        self.upsert_batch(vec![(chunk, vector)]).await.map(|_| ())
    }

    /// Remove every chunk of `repo_name`. Returns the number removed.
    async fn delete_by_repo(&self, repo_name: &str) -> Result<usize>;

    /// Top `k` chunks by cosine similarity, best first.
    async fn query(&self, vector: &[f32], k: usize, filters: &QueryFilters) -> Result<Vec<SearchResult>>;

    async fn list_repos(&self) -> Result<Vec<String>>;

    async fn repo_stats(&self, repo_name: &str) -> Result<RepoChunkStats>;

    /// Persist pending writes. A no-op for purely in-memory stores.
    async fn flush(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStore {
    version: u32,
    #[serde(default)]
    dimension: Option<usize>,
    entries: Vec<StoredChunk>,
}

#[derive(Debug, Default)]
struct StoreState {
    dimension: Option<usize>,
    entries: BTreeMap<String, StoredChunk>,
    dirty: bool,
}

/// In-memory store with optional JSON persistence.
///
/// Writes go to memory; `flush` rewrites the whole file through a temporary
/// sibling and a rename, so readers never observe a partial file.
#[derive(Debug)]
pub struct JsonVectorStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl JsonVectorStore {
    /// A store that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Load `path` if it exists, otherwise start empty and create it on the
    /// first flush.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = StoreState::default();

        if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            let persisted: PersistedStore = serde_json::from_slice(&bytes)?;
            if persisted.version != STORE_FORMAT_VERSION {
                return Err(VectorStoreError::UnsupportedVersion(persisted.version));
            }
            state.dimension = persisted.dimension;
            state.entries = persisted
                .entries
                .into_iter()
                .map(|entry| (entry.chunk.id(), entry))
                .collect();
            log::debug!(
                "Loaded {} chunks from {}",
                state.entries.len(),
                path.display()
            );
        }

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

#[async_trait]
impl VectorStore for JsonVectorStore {
    async fn upsert_batch(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write().await;
        let expected = state.dimension.unwrap_or(entries[0].1.len());
        if let Some((_, bad)) = entries.iter().find(|(_, v)| v.len() != expected) {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        state.dimension = Some(expected);
        let written = entries.len();
        for (chunk, vector) in entries {
            state.entries.insert(chunk.id(), StoredChunk { chunk, vector });
        }
        state.dirty = true;
        Ok(written)
    }

    async fn delete_by_repo(&self, repo_name: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.chunk.repo_name != repo_name);
        let removed = before - state.entries.len();
        if removed > 0 {
            state.dirty = true;
            log::debug!("Removed {removed} chunks of {repo_name}");
        }
        Ok(removed)
    }

    async fn query(&self, vector: &[f32], k: usize, filters: &QueryFilters) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        if let Some(expected) = state.dimension {
            if vector.len() != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = ArrayView1::from(vector);
        let query_norm = query.dot(&query).sqrt();

        let mut scored: Vec<SearchResult> = state
            .entries
            .iter()
            .filter(|(_, entry)| filters.matches(&entry.chunk))
            .map(|(id, entry)| {
                let candidate = ArrayView1::from(entry.vector.as_slice());
                let denom = query_norm * candidate.dot(&candidate).sqrt();
                let score = if denom > 0.0 {
                    query.dot(&candidate) / denom
                } else {
                    0.0
                };
                SearchResult {
                    id: id.clone(),
                    chunk: entry.chunk.clone(),
                    score,
                }
            })
            .collect();

        // Ties fall back to identity order so results are reproducible.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn list_repos(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let repos: BTreeSet<&str> = state
            .entries
            .values()
            .map(|entry| entry.chunk.repo_name.as_str())
            .collect();
        Ok(repos.into_iter().map(str::to_string).collect())
    }

    async fn repo_stats(&self, repo_name: &str) -> Result<RepoChunkStats> {
        let state = self.state.read().await;
        let mut stats = RepoChunkStats {
            repo_name: repo_name.to_string(),
            ..RepoChunkStats::default()
        };
        let mut files = BTreeSet::new();
        for entry in state.entries.values().filter(|e| e.chunk.repo_name == repo_name) {
            stats.chunks += 1;
            files.insert(entry.chunk.file_path.as_str());
            stats.languages.insert(entry.chunk.language);
        }
        stats.files = files.len();
        Ok(stats)
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut state = self.state.write().await;
        if !state.dirty && tokio::fs::try_exists(path).await? {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedStore {
            version: STORE_FORMAT_VERSION,
            dimension: state.dimension,
            entries: state.entries.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        state.dirty = false;

        log::debug!("Flushed {} chunks to {}", state.entries.len(), path.display());
        Ok(())
    }
}
