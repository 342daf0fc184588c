//! The repository catalog.
//!
//! [`StackManager`] owns every [`RepoRecord`]. Status only changes through
//! [`StackManager::transition`] / [`StackManager::transition_with`], which
//! validate the caller's expected prior status under an exclusive lock, so
//! two runs can never both move a repository into `indexing`.
//!
//! Every mutation is a read-modify-write of the whole catalog file: reload
//! under the lock, apply, write `<catalog>.tmp`, rename over the original.

use crate::config::CatalogSettings;
use crate::error::StackError;
use crate::lock::CatalogLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

pub const CATALOG_VERSION: u32 = 1;

type StackResult<T> = std::result::Result<T, StackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    #[serde(alias = "not_indexed")]
    Pending,
    Indexing,
    #[serde(alias = "stale")]
    Indexed,
    Error,
}

impl RepoStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Indexing, Self::Indexed, Self::Error];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexing => "indexing",
            Self::Indexed => "indexed",
            Self::Error => "error",
        }
    }

    /// Edges of the status machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Indexed | Self::Error, Self::Indexing)
                | (Self::Indexing, Self::Indexed | Self::Error | Self::Pending)
                | (Self::Error, Self::Pending)
        )
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "not_indexed" => Ok(Self::Pending),
            "indexing" => Ok(Self::Indexing),
            "indexed" | "stale" => Ok(Self::Indexed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown repository status: {other}")),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Catalog entry for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub name: String,
    pub path: PathBuf,
    pub status: RepoStatus,
    /// Unix milliseconds of the last completed pass.
    #[serde(default)]
    pub last_indexed_at: Option<u64>,
    #[serde(default, alias = "last_commit")]
    pub last_commit_hash: Option<String>,
    #[serde(default)]
    pub files_indexed: usize,
    #[serde(default)]
    pub chunks_indexed: usize,
    #[serde(default = "default_true")]
    pub auto_reindex: bool,
    #[serde(default, alias = "error_message")]
    pub last_error: Option<String>,
    /// Remote the repository was cloned from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl RepoRecord {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            status: RepoStatus::Pending,
            last_indexed_at: None,
            last_commit_hash: None,
            files_indexed: 0,
            chunks_indexed: 0,
            auto_reindex: true,
            last_error: None,
            source_url: None,
        }
    }

    #[must_use]
    pub const fn with_auto_reindex(mut self, auto_reindex: bool) -> Self {
        self.auto_reindex = auto_reindex;
        self
    }

    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackStats {
    pub total_repos: usize,
    pub by_status: BTreeMap<RepoStatus, usize>,
    pub total_files_indexed: usize,
    pub total_chunks_indexed: usize,
}

#[derive(Deserialize)]
struct CatalogFile {
    // `version` is not read back; older catalogs wrote "1.0".
    #[serde(default)]
    repos: BTreeMap<String, RepoRecord>,
}

#[derive(Serialize)]
struct CatalogFileRef<'a> {
    version: u32,
    repos: &'a BTreeMap<String, RepoRecord>,
}

/// Owner of the persisted catalog.
#[derive(Debug)]
pub struct StackManager {
    catalog_path: PathBuf,
    lock_timeout: Duration,
    stale_lock: Duration,
    writer: Mutex<()>,
    snapshot: RwLock<BTreeMap<String, RepoRecord>>,
}

impl StackManager {
    /// Open the catalog at `catalog_path`. A missing file is an empty
    /// catalog; an unparsable one is [`StackError::CatalogCorrupt`].
    pub async fn open(
        catalog_path: impl Into<PathBuf>,
        settings: &CatalogSettings,
    ) -> StackResult<Self> {
        let manager = Self {
            catalog_path: catalog_path.into(),
            lock_timeout: settings.lock_timeout(),
            stale_lock: settings.stale_lock(),
            writer: Mutex::new(()),
            snapshot: RwLock::new(BTreeMap::new()),
        };
        let repos = manager.load().await?;
        log::debug!(
            "Opened catalog {} with {} repositories",
            manager.catalog_path.display(),
            repos.len()
        );
        Ok(manager)
    }

    #[must_use]
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// Re-read the catalog file and refresh the cached snapshot.
    pub async fn load(&self) -> StackResult<BTreeMap<String, RepoRecord>> {
        let repos = read_catalog(&self.catalog_path).await?;
        *self.snapshot.write().await = repos.clone();
        Ok(repos)
    }

    /// Rewrite the catalog in the current format. The file is re-read under
    /// the lock, so records written by other managers survive; the cached
    /// snapshot is refreshed, never written back.
    pub async fn persist(&self) -> StackResult<()> {
        self.mutate(|_| Ok(())).await
    }

    /// Last snapshot seen by this process, without touching the file.
    pub async fn snapshot(&self) -> BTreeMap<String, RepoRecord> {
        self.snapshot.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> StackResult<Option<RepoRecord>> {
        Ok(self.load().await?.remove(name))
    }

    /// All records, ordered by name.
    pub async fn list(&self) -> StackResult<Vec<RepoRecord>> {
        Ok(self.load().await?.into_values().collect())
    }

    pub async fn list_by_status(&self, status: RepoStatus) -> StackResult<Vec<RepoRecord>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|record| record.status == status)
            .collect())
    }

    /// Insert a new record (always `pending`) or replace an existing one's
    /// fields. An existing record keeps its status.
    pub async fn upsert(&self, record: RepoRecord) -> StackResult<RepoRecord> {
        self.mutate(move |repos| {
            let mut record = record;
            match repos.get(&record.name) {
                Some(existing) => record.status = existing.status,
                None => record.status = RepoStatus::Pending,
            }
            repos.insert(record.name.clone(), record.clone());
            Ok(record)
        })
        .await
    }

    /// Insert a new `pending` record, failing if the name is taken.
    pub async fn register(&self, record: RepoRecord) -> StackResult<RepoRecord> {
        self.mutate(move |repos| {
            if repos.contains_key(&record.name) {
                return Err(StackError::AlreadyRegistered(record.name));
            }
            let mut record = record;
            record.status = RepoStatus::Pending;
            repos.insert(record.name.clone(), record.clone());
            Ok(record)
        })
        .await
    }

    pub async fn remove(&self, name: &str) -> StackResult<RepoRecord> {
        self.mutate(|repos| {
            repos
                .remove(name)
                .ok_or_else(|| StackError::NotFound(name.to_string()))
        })
        .await
    }

    /// Move `name` from `expected` to `next`.
    pub async fn transition(
        &self,
        name: &str,
        expected: RepoStatus,
        next: RepoStatus,
    ) -> StackResult<RepoRecord> {
        self.transition_with(name, expected, next, |_| {}).await
    }

    /// Like [`transition`](Self::transition), also applying `apply` to the
    /// record in the same write. `apply` cannot change the status.
    pub async fn transition_with<F>(
        &self,
        name: &str,
        expected: RepoStatus,
        next: RepoStatus,
        apply: F,
    ) -> StackResult<RepoRecord>
    where
        F: FnOnce(&mut RepoRecord),
    {
        let record = self
            .mutate(|repos| {
                let record = repos
                    .get_mut(name)
                    .ok_or_else(|| StackError::NotFound(name.to_string()))?;
                if record.status != expected {
                    return Err(StackError::Conflict {
                        name: name.to_string(),
                        expected,
                        actual: record.status,
                    });
                }
                if !expected.can_transition_to(next) {
                    return Err(StackError::IllegalTransition {
                        name: name.to_string(),
                        from: expected,
                        to: next,
                    });
                }
                apply(record);
                record.status = next;
                Ok(record.clone())
            })
            .await?;
        log::debug!("{name}: {expected} -> {next}");
        Ok(record)
    }

    pub async fn stats(&self) -> StackResult<StackStats> {
        let repos = self.load().await?;
        let mut stats = StackStats {
            total_repos: repos.len(),
            ..StackStats::default()
        };
        for status in RepoStatus::ALL {
            stats.by_status.insert(status, 0);
        }
        for record in repos.values() {
            *stats.by_status.entry(record.status).or_default() += 1;
            stats.total_files_indexed += record.files_indexed;
            stats.total_chunks_indexed += record.chunks_indexed;
        }
        Ok(stats)
    }

    async fn lock(&self) -> StackResult<CatalogLock> {
        CatalogLock::acquire(&self.catalog_path, self.lock_timeout, self.stale_lock).await
    }

    /// Reload, apply `f`, and persist if `f` succeeded. The catalog is
    /// left untouched when `f` fails.
    async fn mutate<T, F>(&self, f: F) -> StackResult<T>
    where
        F: FnOnce(&mut BTreeMap<String, RepoRecord>) -> StackResult<T>,
    {
        let _writer = self.writer.lock().await;
        let lock = self.lock().await?;

        let mut repos = read_catalog(&self.catalog_path).await?;
        let out = f(&mut repos)?;
        lock.ensure_held().await?;
        write_catalog(&self.catalog_path, &repos).await?;
        *self.snapshot.write().await = repos;
        Ok(out)
    }
}

async fn read_catalog(path: &Path) -> StackResult<BTreeMap<String, RepoRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(err.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(StackError::CatalogCorrupt {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }

    let file: CatalogFile =
        serde_json::from_slice(&bytes).map_err(|e| StackError::CatalogCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    // The map key is authoritative.
    Ok(file
        .repos
        .into_iter()
        .map(|(name, mut record)| {
            record.name.clone_from(&name);
            (name, record)
        })
        .collect())
}

async fn write_catalog(path: &Path, repos: &BTreeMap<String, RepoRecord>) -> StackResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(&CatalogFileRef {
        version: CATALOG_VERSION,
        repos,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
