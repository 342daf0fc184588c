use crate::error::{IndexerError, Result};
use codestack_code_chunker::Import;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerFile {
    repo_name: String,
    recorded_at_unix_ms: u64,
    imports: Vec<Import>,
}

/// Imports produced by each repository's last completed indexing pass.
///
/// Dependency queries are re-derived from this set on demand; it is
/// replaced wholesale per repository, never patched.
#[derive(Debug, Clone)]
pub struct ImportLedger {
    dir: PathBuf,
}

impl ImportLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, repo_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(repo_name)))
    }

    pub async fn save(&self, repo_name: &str, imports: &[Import]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(repo_name);
        let bytes = serde_json::to_vec_pretty(&LedgerFile {
            repo_name: repo_name.to_string(),
            recorded_at_unix_ms: crate::stack::unix_now_ms(),
            imports: imports.to_vec(),
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Recorded {} imports for {repo_name}", imports.len());
        Ok(())
    }

    /// Imports for `repo_name`; empty when nothing was recorded.
    pub async fn load(&self, repo_name: &str) -> Result<Vec<Import>> {
        let path = self.path_for(repo_name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: LedgerFile = serde_json::from_slice(&bytes)?;
                Ok(file.imports)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Every recorded `(repo_name, imports)` pair. Unreadable entries are
    /// skipped with a warning.
    pub async fn load_all(&self) -> Result<BTreeMap<String, Vec<Import>>> {
        let mut out = BTreeMap::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(IndexerError::from)
                .and_then(|bytes| {
                    serde_json::from_slice::<LedgerFile>(&bytes).map_err(IndexerError::from)
                });
            match parsed {
                Ok(file) if self.path_for(&file.repo_name) != path => {
                    log::warn!(
                        "Skipping import ledger {}: it belongs at {}",
                        path.display(),
                        self.path_for(&file.repo_name).display()
                    );
                }
                Ok(file) => {
                    out.insert(file.repo_name, file.imports);
                }
                Err(err) => log::warn!("Skipping import ledger {}: {err}", path.display()),
            }
        }
        Ok(out)
    }

    pub async fn remove(&self, repo_name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(repo_name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Percent-encoded, so distinct names never share a file.
fn file_stem(repo_name: &str) -> String {
    urlencoding::encode(repo_name).into_owned()
}
