//! Catalog-wide operations: registering repositories, incremental sweeps,
//! crash recovery and dependency queries.

use crate::config::{expand_home, EmbeddingProvider, StackSettings};
use crate::error::{IndexerError, Result, StackError};
use crate::filter::FileFilter;
use crate::git::{GitCli, GitRepo};
use crate::ledger::ImportLedger;
use crate::repo_indexer::{IndexResult, RepoIndexer};
use crate::stack::{RepoRecord, RepoStatus, StackManager, StackStats};
use codestack_code_chunker::{Chunker, CodeParser, Import, SourceParser};
use codestack_graph::{CrossRepoEdge, DependencyAnalyzer, MissingRepoSuggestion, RepoDependencies};
use codestack_vector_store::{Embedder, HashingEmbedder, JsonVectorStore, VectorStore};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

const RECOVERY_NOTE: &str = "indexing run was interrupted; reset by recovery";
const URL_PREFIXES: &[&str] = &["http://", "https://", "git@", "git://"];

/// External collaborators the coordinator drives.
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub git: Arc<dyn GitRepo>,
    pub parser: Arc<dyn CodeParser>,
}

/// The embedder `[embedding]` asks for.
pub fn embedder_from_settings(settings: &StackSettings) -> Result<Arc<dyn Embedder>> {
    match settings.embedding.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(
            settings.embedding.dimension,
        )?)),
        #[cfg(feature = "fastembed")]
        EmbeddingProvider::Fastembed => Ok(Arc::new(
            codestack_vector_store::FastEmbedder::new(settings.embedding.model)
                .with_cache_dir(settings.model_cache_dir()),
        )),
        #[cfg(not(feature = "fastembed"))]
        EmbeddingProvider::Fastembed => Err(IndexerError::Config(format!(
            "embedding provider `fastembed` ({}) is not compiled in; rebuild with --features fastembed",
            settings.embedding.model
        ))),
    }
}

impl Collaborators {
    /// Embedder chosen by `[embedding]`, JSON vector store under the state
    /// directory, the `git` binary and the default source parser.
    pub async fn from_settings(settings: &StackSettings) -> Result<Self> {
        let embedder = embedder_from_settings(settings)?;
        let store = JsonVectorStore::open(settings.vector_store_path()).await?;
        Ok(Self {
            embedder,
            store: Arc::new(store),
            git: Arc::new(GitCli),
            parser: Arc::new(SourceParser::new()),
        })
    }
}

/// Per-repository result of [`StackCoordinator::reindex_changed`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Indexed(IndexResult),
    Skipped { repo_name: String, reason: String },
    Failed { repo_name: String, error: String },
}

impl SweepOutcome {
    #[must_use]
    pub fn repo_name(&self) -> &str {
        match self {
            Self::Indexed(result) => &result.repo_name,
            Self::Skipped { repo_name, .. } | Self::Failed { repo_name, .. } => repo_name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddedRepo {
    pub record: RepoRecord,
    pub index: Option<IndexResult>,
}

/// Fans indexing out over the catalog.
pub struct StackCoordinator {
    settings: StackSettings,
    stack: Arc<StackManager>,
    indexer: Arc<RepoIndexer>,
    store: Arc<dyn VectorStore>,
    git: Arc<dyn GitRepo>,
    ledger: ImportLedger,
    analyzer: DependencyAnalyzer,
    filter: FileFilter,
    interrupted: Mutex<BTreeSet<String>>,
}

impl StackCoordinator {
    pub async fn open(settings: StackSettings) -> Result<Self> {
        let collaborators = Collaborators::from_settings(&settings).await?;
        Self::open_with(settings, collaborators).await
    }

    /// Open the catalog and remember any records left in `indexing` by an
    /// earlier process; they must go through [`recover`](Self::recover).
    pub async fn open_with(settings: StackSettings, collaborators: Collaborators) -> Result<Self> {
        settings.validate()?;
        let stack = Arc::new(StackManager::open(settings.catalog_path(), &settings.catalog).await?);
        let analyzer = DependencyAnalyzer::with_org_prefixes(settings.dependencies.org_prefixes.clone())?;
        let filter = FileFilter::from_settings(&settings.indexing)?;
        let chunker = Chunker::try_new(settings.chunking.chunker_config())?;
        let ledger = ImportLedger::new(settings.imports_dir());

        let indexer = RepoIndexer::new(
            Arc::clone(&stack),
            collaborators.embedder,
            Arc::clone(&collaborators.store),
        )
        .with_parser(collaborators.parser)
        .with_chunker(chunker)
        .with_git(Arc::clone(&collaborators.git))
        .with_ledger(ledger.clone())
        .with_defaults(filter.clone(), settings.indexing.batch_size)
        .with_max_concurrent_files(settings.indexing.max_concurrent_files)
        .respect_gitignore(settings.indexing.respect_gitignore);

        let interrupted: BTreeSet<String> = stack
            .list_by_status(RepoStatus::Indexing)
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect();
        if !interrupted.is_empty() {
            log::warn!(
                "Found {} repositories left in indexing by an interrupted run: {}",
                interrupted.len(),
                interrupted.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        Ok(Self {
            settings,
            stack,
            indexer: Arc::new(indexer),
            store: collaborators.store,
            git: collaborators.git,
            ledger,
            analyzer,
            filter,
            interrupted: Mutex::new(interrupted),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &StackSettings {
        &self.settings
    }

    #[must_use]
    pub fn stack(&self) -> &Arc<StackManager> {
        &self.stack
    }

    #[must_use]
    pub fn indexer(&self) -> &Arc<RepoIndexer> {
        &self.indexer
    }

    /// Records found in `indexing` at open time and not yet recovered.
    #[must_use]
    pub fn interrupted(&self) -> Vec<String> {
        self.interrupted_set().iter().cloned().collect()
    }

    fn interrupted_set(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.interrupted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a local path or clone a remote URL, optionally indexing it
    /// right away.
    pub async fn add_repo(
        &self,
        source: &str,
        name: Option<&str>,
        auto_index: bool,
    ) -> Result<AddedRepo> {
        let source = source.trim();
        if source.is_empty() {
            return Err(IndexerError::InvalidSource("empty source".to_string()));
        }

        let record = if is_url(source) {
            self.clone_remote(source, name).await?
        } else {
            local_record(source, name).await?
        };

        let record = self.stack.register(record).await?;
        log::info!("Registered {} at {}", record.name, record.path.display());

        let index = if auto_index {
            Some(
                self.indexer
                    .index(&record, &self.filter, self.settings.indexing.batch_size)
                    .await?,
            )
        } else {
            None
        };

        let record = self
            .stack
            .get(&record.name)
            .await?
            .ok_or_else(|| IndexerError::RepoNotFound(record.name.clone()))?;
        Ok(AddedRepo { record, index })
    }

    async fn clone_remote(&self, url: &str, name: Option<&str>) -> Result<RepoRecord> {
        let name = match name {
            Some(name) => validate_name(name)?,
            None => repo_name_from_url(url)?,
        };
        if self.stack.get(&name).await?.is_some() {
            return Err(StackError::AlreadyRegistered(name).into());
        }

        let clone_dir = self.settings.clone_dir();
        let dest = clone_dir.join(&name);
        if tokio::fs::try_exists(&dest).await? {
            return Err(IndexerError::InvalidSource(format!(
                "clone destination already exists: {}",
                dest.display()
            )));
        }
        tokio::fs::create_dir_all(&clone_dir).await?;

        if let Err(err) = self.git.clone_repo(url, &dest).await {
            if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&dest).await {
                    log::warn!("Failed to remove partial clone {}: {cleanup}", dest.display());
                }
            }
            return Err(err);
        }

        Ok(RepoRecord::new(name, dest).with_source_url(url))
    }

    pub async fn reindex_repo(&self, name: &str, force: bool) -> Result<IndexResult> {
        if self.interrupted_set().contains(name) {
            let still_stuck = self
                .stack
                .get(name)
                .await?
                .is_some_and(|record| record.status == RepoStatus::Indexing);
            if still_stuck {
                return Err(IndexerError::InterruptedRun(name.to_string()));
            }
            self.interrupted_set().remove(name);
        }
        self.indexer.reindex(name, force).await
    }

    /// Drop a repository from the catalog, the vector store and the ledger.
    pub async fn remove_repo(&self, name: &str) -> Result<RepoRecord> {
        let record = self.stack.remove(name).await.map_err(|err| match err {
            StackError::NotFound(name) => IndexerError::RepoNotFound(name),
            other => other.into(),
        })?;
        let removed = self.store.delete_by_repo(name).await?;
        self.store.flush().await?;
        self.ledger.remove(name).await?;
        self.interrupted_set().remove(name);
        log::info!("Removed {name} ({removed} chunks)");
        Ok(record)
    }

    pub async fn stack_stats(&self) -> Result<StackStats> {
        Ok(self.stack.stats().await?)
    }

    /// Names of `indexed` repositories whose HEAD moved since their last
    /// pass. Repositories without a readable commit are left out.
    pub async fn check_updates(&self) -> Result<Vec<String>> {
        let mut stale = Vec::new();
        for record in self.stack.list_by_status(RepoStatus::Indexed).await? {
            let current = self.git.current_commit(&record.path).await;
            if current.is_some() && current != record.last_commit_hash {
                log::debug!(
                    "{} moved from {} to {}",
                    record.name,
                    record.last_commit_hash.as_deref().unwrap_or("-"),
                    current.as_deref().unwrap_or("-")
                );
                stale.push(record.name);
            }
        }
        Ok(stale)
    }

    /// Reindex every stale repository, at most `max_concurrent_repos` at a
    /// time. A repository another run already owns is skipped.
    pub async fn reindex_changed(&self) -> Result<Vec<SweepOutcome>> {
        let stale = self.check_updates().await?;
        if stale.is_empty() {
            log::info!("All indexed repositories are up to date");
            return Ok(Vec::new());
        }

        let manual: BTreeSet<String> = self
            .stack
            .list()
            .await?
            .into_iter()
            .filter(|record| !record.auto_reindex)
            .map(|record| record.name)
            .collect();

        let permits = Arc::new(Semaphore::new(self.settings.indexing.max_concurrent_repos));
        let mut tasks = Vec::with_capacity(stale.len());
        let mut outcomes = Vec::with_capacity(stale.len());

        for name in stale {
            if manual.contains(&name) {
                outcomes.push(SweepOutcome::Skipped {
                    repo_name: name,
                    reason: "auto reindex disabled".to_string(),
                });
                continue;
            }
            let indexer = Arc::clone(&self.indexer);
            let permits = Arc::clone(&permits);
            let task_name = name.clone();
            let task = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| IndexerError::Other(e.to_string()))?;
                indexer.reindex(&task_name, false).await
            });
            tasks.push((name, task));
        }

        for (name, task) in tasks {
            let outcome = match task.await {
                Ok(Ok(result)) if result.unchanged => SweepOutcome::Skipped {
                    repo_name: name,
                    reason: "already up to date".to_string(),
                },
                Ok(Ok(result)) => SweepOutcome::Indexed(result),
                Ok(Err(err)) if err.is_conflict() => {
                    log::info!("Skipping {name}: {err}");
                    SweepOutcome::Skipped {
                        repo_name: name,
                        reason: err.to_string(),
                    }
                }
                Ok(Err(err)) => SweepOutcome::Failed {
                    repo_name: name,
                    error: err.to_string(),
                },
                Err(err) => SweepOutcome::Failed {
                    repo_name: name,
                    error: format!("reindex task panicked: {err}"),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Reset every record stuck in `indexing` to `pending`. Unless `force`
    /// is set, `confirm` sees the stuck records first and may decline.
    pub async fn recover<F>(&self, force: bool, confirm: F) -> Result<Vec<String>>
    where
        F: FnOnce(&[RepoRecord]) -> bool,
    {
        let stuck = self.stack.list_by_status(RepoStatus::Indexing).await?;
        if stuck.is_empty() {
            self.interrupted_set().clear();
            return Ok(Vec::new());
        }
        if !force && !confirm(&stuck) {
            log::info!("Recovery declined; {} repositories left in indexing", stuck.len());
            return Ok(Vec::new());
        }

        let mut reset = Vec::with_capacity(stuck.len());
        for record in stuck {
            let outcome = self
                .stack
                .transition_with(&record.name, RepoStatus::Indexing, RepoStatus::Pending, |r| {
                    r.last_error = Some(RECOVERY_NOTE.to_string());
                })
                .await;
            match outcome {
                Ok(_) => {
                    log::info!("Recovered {}", record.name);
                    self.interrupted_set().remove(&record.name);
                    reset.push(record.name);
                }
                Err(StackError::Conflict { .. } | StackError::NotFound(_)) => {
                    log::debug!("{} changed during recovery; leaving it", record.name);
                    self.interrupted_set().remove(&record.name);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(reset)
    }

    pub async fn dependency_summary(&self, name: &str) -> Result<RepoDependencies> {
        if self.stack.get(name).await?.is_none() {
            return Err(IndexerError::RepoNotFound(name.to_string()));
        }
        let imports = self.ledger.load(name).await?;
        Ok(self.analyzer.analyze(name, &imports))
    }

    pub async fn circular_dependencies(&self, name: &str) -> Result<Vec<Vec<String>>> {
        if self.stack.get(name).await?.is_none() {
            return Err(IndexerError::RepoNotFound(name.to_string()));
        }
        let imports = self.ledger.load(name).await?;
        Ok(self.analyzer.circular_dependencies(&imports))
    }

    pub async fn cross_repo_dependencies(&self) -> Result<Vec<CrossRepoEdge>> {
        let (imports, catalog) = self.dependency_inputs().await?;
        Ok(self.analyzer.cross_repo_dependencies(&imports, &catalog))
    }

    pub async fn suggest_missing_repos(&self) -> Result<Vec<MissingRepoSuggestion>> {
        let (imports, catalog) = self.dependency_inputs().await?;
        Ok(self.analyzer.suggest_missing_repos(&imports, &catalog))
    }

    /// Ledger entries of repositories still in the catalog, plus the
    /// catalog's names.
    async fn dependency_inputs(&self) -> Result<(BTreeMap<String, Vec<Import>>, BTreeSet<String>)> {
        let catalog: BTreeSet<String> = self
            .stack
            .list()
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect();
        let mut imports = self.ledger.load_all().await?;
        imports.retain(|repo, _| catalog.contains(repo));
        Ok((imports, catalog))
    }
}

fn is_url(source: &str) -> bool {
    URL_PREFIXES.iter().any(|prefix| source.starts_with(prefix))
}

/// `https://github.com/acme/web-app.git` -> `web-app`.
pub fn repo_name_from_url(url: &str) -> Result<String> {
    let pattern = Regex::new(r"([^/:]+?)(?:\.git)?/*$")
        .map_err(|e| IndexerError::Other(e.to_string()))?;
    let name = pattern
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| IndexerError::InvalidSource(format!("cannot derive a name from {url}")))?;
    validate_name(&name)
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(IndexerError::InvalidSource(format!("invalid repository name: {name:?}")));
    }
    Ok(name.to_string())
}

async fn local_record(source: &str, name: Option<&str>) -> Result<RepoRecord> {
    let raw = expand_home(Path::new(source));
    let path: PathBuf = tokio::fs::canonicalize(&raw)
        .await
        .map_err(|_| IndexerError::RepoPathInvalid(raw.clone()))?;
    if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
        return Err(IndexerError::RepoPathInvalid(path));
    }

    let name = match name {
        Some(name) => validate_name(name)?,
        None => validate_name(
            &path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        )?,
    };
    if !tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false) {
        log::warn!("{} is not a git repository; incremental updates are disabled", path.display());
    }
    Ok(RepoRecord::new(name, path))
}
