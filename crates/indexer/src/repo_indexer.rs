use crate::error::{IndexerError, Result, StackError};
use crate::filter::FileFilter;
use crate::git::{GitCli, GitRepo};
use crate::ledger::ImportLedger;
use crate::scanner::FileScanner;
use crate::stack::{unix_now_ms, RepoRecord, RepoStatus, StackManager};
use codestack_code_chunker::parser::relative_to_root;
use codestack_code_chunker::{
    Chunk, Chunker, CodeParser, Import, Language, ParseError, ParseRequest, SourceFile,
    SourceParser,
};
use codestack_vector_store::{Embedder, VectorStore, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 16;

/// A file that could not be parsed. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub file_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    pub repo_name: String,
    /// Candidate files attempted, including those that failed to parse.
    pub files_processed: usize,
    /// Files the scanner found but the filter rejected.
    pub files_skipped: usize,
    pub chunks_indexed: usize,
    pub commit_hash: Option<String>,
    pub errors: Vec<FileError>,
    #[serde(skip)]
    pub imports: Vec<Import>,
    pub duration_ms: u64,
    /// True when the run was skipped because the commit had not moved.
    #[serde(default)]
    pub unchanged: bool,
}

impl IndexResult {
    /// Result of a reindex that found nothing to do.
    #[must_use]
    pub fn unchanged(record: &RepoRecord) -> Self {
        Self {
            repo_name: record.name.clone(),
            commit_hash: record.last_commit_hash.clone(),
            unchanged: true,
            ..Self::default()
        }
    }
}

struct ProcessedFile {
    relative_path: String,
    chunks: Vec<Chunk>,
    imports: Vec<Import>,
}

/// Accumulates chunks and writes them in embedding batches.
struct BatchWriter<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    batch_size: usize,
    pending: Vec<Chunk>,
    written: usize,
}

impl BatchWriter<'_> {
    async fn push(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        self.pending.extend(chunks);
        while self.pending.len() >= self.batch_size {
            let batch: Vec<Chunk> = self.pending.drain(..self.batch_size).collect();
            self.write(batch).await?;
        }
        Ok(())
    }

    async fn finish(mut self) -> Result<usize> {
        let rest = std::mem::take(&mut self.pending);
        if !rest.is_empty() {
            self.write(rest).await?;
        }
        Ok(self.written)
    }

    async fn write(&mut self, batch: Vec<Chunk>) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(Chunk::embedding_text).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            ))
            .into());
        }
        self.written += self
            .store
            .upsert_batch(batch.into_iter().zip(vectors).collect())
            .await?;
        Ok(())
    }
}

/// Runs indexing passes for single repositories.
///
/// A pass claims the repository (`-> indexing`), replaces its chunks in the
/// vector store, and finishes in `indexed` with fresh counts and commit, or
/// in `error` with counts and commit untouched.
pub struct RepoIndexer {
    stack: Arc<StackManager>,
    parser: Arc<dyn CodeParser>,
    chunker: Arc<Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    git: Arc<dyn GitRepo>,
    ledger: Option<ImportLedger>,
    filter: FileFilter,
    batch_size: usize,
    max_concurrent_files: usize,
    respect_gitignore: bool,
}

impl RepoIndexer {
    pub fn new(
        stack: Arc<StackManager>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            stack,
            parser: Arc::new(SourceParser::new()),
            chunker: Arc::new(Chunker::default()),
            embedder,
            store,
            git: Arc::new(GitCli),
            ledger: None,
            filter: FileFilter::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            respect_gitignore: true,
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn CodeParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = Arc::new(chunker);
        self
    }

    #[must_use]
    pub fn with_git(mut self, git: Arc<dyn GitRepo>) -> Self {
        self.git = git;
        self
    }

    #[must_use]
    pub fn with_ledger(mut self, ledger: ImportLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Filter and batch size used by [`reindex`](Self::reindex).
    #[must_use]
    pub fn with_defaults(mut self, filter: FileFilter, batch_size: usize) -> Self {
        self.filter = filter;
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_concurrent_files(mut self, limit: usize) -> Self {
        self.max_concurrent_files = limit.max(1);
        self
    }

    #[must_use]
    pub const fn respect_gitignore(mut self, enabled: bool) -> Self {
        self.respect_gitignore = enabled;
        self
    }

    #[must_use]
    pub fn stack(&self) -> &Arc<StackManager> {
        &self.stack
    }

    #[must_use]
    pub fn git(&self) -> &Arc<dyn GitRepo> {
        &self.git
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Reindex `name`. Without `force` this is a no-op when the repository
    /// is `indexed` and its HEAD still matches the last indexed commit.
    pub async fn reindex(&self, name: &str, force: bool) -> Result<IndexResult> {
        let record = self
            .stack
            .get(name)
            .await?
            .ok_or_else(|| IndexerError::RepoNotFound(name.to_string()))?;

        if !force && record.status == RepoStatus::Indexed {
            let current = self.git.current_commit(&record.path).await;
            if current.is_some() && current == record.last_commit_hash {
                log::info!("{name} unchanged since {}; skipping", current.unwrap_or_default());
                return Ok(IndexResult::unchanged(&record));
            }
        }

        self.index(&record, &self.filter, self.batch_size).await
    }

    /// Full indexing pass over `record`.
    pub async fn index(
        &self,
        record: &RepoRecord,
        filter: &FileFilter,
        batch_size: usize,
    ) -> Result<IndexResult> {
        let name = record.name.as_str();
        let current = self
            .stack
            .get(name)
            .await?
            .ok_or_else(|| IndexerError::RepoNotFound(name.to_string()))?;
        if current.status == RepoStatus::Indexing {
            return Err(StackError::Conflict {
                name: name.to_string(),
                expected: record.status,
                actual: RepoStatus::Indexing,
            }
            .into());
        }
        self.stack
            .transition(name, current.status, RepoStatus::Indexing)
            .await?;

        log::info!("Indexing {name} at {}", current.path.display());
        let started = Instant::now();

        match self.run(&current, filter, batch_size.max(1)).await {
            Ok(mut result) => {
                if let Some(ledger) = &self.ledger {
                    if let Err(err) = ledger.save(name, &result.imports).await {
                        self.mark_failed(name, &err).await;
                        return Err(err);
                    }
                }
                let commit = result.commit_hash.clone();
                let files = result.files_processed;
                let chunks = result.chunks_indexed;
                self.stack
                    .transition_with(name, RepoStatus::Indexing, RepoStatus::Indexed, |r| {
                        r.last_commit_hash = commit;
                        r.last_indexed_at = Some(unix_now_ms());
                        r.files_indexed = files;
                        r.chunks_indexed = chunks;
                        r.last_error = None;
                    })
                    .await?;

                result.duration_ms = u64::try_from(started.elapsed().as_millis())
                    .unwrap_or(u64::MAX)
                    .max(1);
                log::info!(
                    "Indexed {name}: {} files, {} chunks, {} errors in {}ms",
                    result.files_processed,
                    result.chunks_indexed,
                    result.errors.len(),
                    result.duration_ms
                );
                Ok(result)
            }
            Err(err) => {
                self.mark_failed(name, &err).await;
                Err(err)
            }
        }
    }

    async fn mark_failed(&self, name: &str, err: &IndexerError) {
        log::warn!("Indexing {name} failed: {err}");
        let reason = err.to_string();
        if let Err(update) = self
            .stack
            .transition_with(name, RepoStatus::Indexing, RepoStatus::Error, |r| {
                r.last_error = Some(reason);
            })
            .await
        {
            log::warn!("Could not record failure for {name}: {update}");
        }
    }

    async fn run(
        &self,
        record: &RepoRecord,
        filter: &FileFilter,
        batch_size: usize,
    ) -> Result<IndexResult> {
        let root = record.path.clone();
        if !tokio::fs::metadata(&root).await.is_ok_and(|m| m.is_dir()) {
            return Err(IndexerError::RepoPathInvalid(root));
        }

        let scanner = FileScanner::new(&root).respect_gitignore(self.respect_gitignore);
        let scanned = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| IndexerError::Other(format!("file scan panicked: {e}")))?;

        let mut result = IndexResult {
            repo_name: record.name.clone(),
            ..IndexResult::default()
        };
        let mut candidates = Vec::with_capacity(scanned.len());
        for path in scanned {
            if filter.allows(&relative_to_root(&root, &path)) {
                candidates.push(path);
            } else {
                result.files_skipped += 1;
            }
        }
        log::debug!(
            "{}: {} candidate files, {} filtered out",
            record.name,
            candidates.len(),
            result.files_skipped
        );

        let purged = self.store.delete_by_repo(&record.name).await?;
        if purged > 0 {
            log::info!("Purged {purged} chunks of {}", record.name);
        }

        let mut writer = BatchWriter {
            embedder: self.embedder.as_ref(),
            store: self.store.as_ref(),
            batch_size,
            pending: Vec::new(),
            written: 0,
        };

        for group in candidates.chunks(self.max_concurrent_files) {
            let mut tasks = Vec::with_capacity(group.len());
            for path in group {
                let relative_path = relative_to_root(&root, path);
                let path = path.clone();
                let root = root.clone();
                let repo_name = record.name.clone();
                let parser = Arc::clone(&self.parser);
                let chunker = Arc::clone(&self.chunker);
                let task = tokio::task::spawn_blocking(move || {
                    process_file(&root, &path, &repo_name, parser.as_ref(), &chunker)
                });
                tasks.push((relative_path, task));
            }

            for (relative_path, task) in tasks {
                result.files_processed += 1;
                let reason = match task.await {
                    Ok(Ok(processed)) => {
                        log::debug!(
                            "{}: {} chunks, {} imports",
                            processed.relative_path,
                            processed.chunks.len(),
                            processed.imports.len()
                        );
                        result.imports.extend(processed.imports);
                        writer.push(processed.chunks).await?;
                        continue;
                    }
                    Ok(Err(err)) => err.reason,
                    Err(err) => format!("parser task panicked: {err}"),
                };
                log::warn!("Skipping {relative_path} in {}: {reason}", record.name);
                result.errors.push(FileError {
                    file_path: relative_path,
                    reason,
                });
            }
        }

        result.chunks_indexed = writer.finish().await?;
        self.store.flush().await?;
        result.commit_hash = self.git.current_commit(&root).await;
        Ok(result)
    }
}

fn process_file(
    root: &Path,
    path: &Path,
    repo_name: &str,
    parser: &dyn CodeParser,
    chunker: &Chunker,
) -> std::result::Result<ProcessedFile, ParseError> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::new(path, e.to_string()))?;
    let source =
        String::from_utf8(bytes).map_err(|_| ParseError::new(path, "file is not valid UTF-8"))?;
    let language = Language::from_path(path);
    let request = ParseRequest {
        repo_root: root,
        file_path: path,
        language,
        source: &source,
    };
    let parsed = parser.parse(&request)?;

    let relative_path = request.relative_path();
    let file = SourceFile {
        repo_name,
        file_path: &relative_path,
        language,
        text: &source,
    };
    let chunks = chunker.chunk(&file, &parsed.symbols);
    Ok(ProcessedFile {
        relative_path,
        chunks,
        imports: parsed.imports,
    })
}
