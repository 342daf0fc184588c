//! Local transformer embeddings through fastembed (ONNX Runtime and
//! Hugging Face tokenizers).

use crate::embedder::Embedder;
use crate::error::{Result, VectorStoreError};
use crate::model::EmbeddingModelKind;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Sentence-embedding model run in-process.
///
/// Weights are fetched into `cache_dir` the first time `embed` is called and
/// the session is reused afterwards. Inference runs on the blocking pool.
pub struct FastEmbedder {
    kind: EmbeddingModelKind,
    cache_dir: Option<PathBuf>,
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("kind", &self.kind)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl FastEmbedder {
    #[must_use]
    pub fn new(kind: EmbeddingModelKind) -> Self {
        Self {
            kind,
            cache_dir: None,
            model: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> EmbeddingModelKind {
        self.kind
    }
}

fn fastembed_model(kind: EmbeddingModelKind) -> EmbeddingModel {
    match kind {
        EmbeddingModelKind::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
        EmbeddingModelKind::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
        EmbeddingModelKind::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
        EmbeddingModelKind::NomicEmbedTextV15 => EmbeddingModel::NomicEmbedTextV15,
    }
}

fn load(kind: EmbeddingModelKind, cache_dir: Option<PathBuf>) -> Result<TextEmbedding> {
    log::info!("Loading embedding model {kind}");
    let mut options = TextInitOptions::new(fastembed_model(kind)).with_show_download_progress(false);
    if let Some(dir) = cache_dir {
        options = options.with_cache_dir(dir);
    }
    TextEmbedding::try_new(options)
        .map_err(|e| VectorStoreError::EmbeddingError(format!("failed to load {kind}: {e}")))
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn dimension(&self) -> usize {
        self.kind.dimension()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let texts = texts.to_vec();
        let model = Arc::clone(&self.model);
        let kind = self.kind;
        let cache_dir = self.cache_dir.clone();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_none() {
                *guard = Some(load(kind, cache_dir)?);
            }
            let Some(session) = guard.as_mut() else {
                return Err(VectorStoreError::EmbeddingError(format!("{kind} not loaded")));
            };
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            session
                .embed(refs, None)
                .map_err(|e| VectorStoreError::EmbeddingError(e.to_string()))
        })
        .await
        .map_err(|e| VectorStoreError::EmbeddingError(format!("embedding task failed: {e}")))??;

        let expected = self.kind.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn reports_model_dimension_without_loading() {
        let embedder = FastEmbedder::new(EmbeddingModelKind::BgeBaseEnV15).with_cache_dir("/tmp/m");
        assert_eq!(embedder.dimension(), 768);
        assert!(format!("{embedder:?}").contains("BgeBaseEnV15"));
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn related_code_scores_closer_than_unrelated_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let embedder = FastEmbedder::new(EmbeddingModelKind::AllMiniLmL6V2).with_cache_dir(dir.path());
        let texts = vec![
            "def login(user, password): return check_credentials(user, password)".to_string(),
            "function authenticate(username, secret) { return verify(username, secret); }"
                .to_string(),
            "fn parse_csv_row(line: &str) -> Vec<String>".to_string(),
        ];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }
}
