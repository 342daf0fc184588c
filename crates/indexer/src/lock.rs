use crate::error::StackError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Identifies one acquisition across processes and within this one.
fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    format!(
        "{}-{nanos}-{}",
        std::process::id(),
        NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
    )
}

/// Cross-process exclusive lock on the catalog: a sibling `<catalog>.lock`
/// file created with create-new semantics and holding an owner token.
/// Released on drop if the file still carries that token.
#[derive(Debug)]
pub struct CatalogLock {
    path: PathBuf,
    token: String,
}

impl CatalogLock {
    #[must_use]
    pub fn lock_path_for(catalog_path: &Path) -> PathBuf {
        let mut name = catalog_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        catalog_path.with_file_name(name)
    }

    /// Acquire the lock for `catalog_path`, waiting up to `timeout`. A lock
    /// file older than `stale_after` is assumed abandoned and broken.
    pub async fn acquire(
        catalog_path: &Path,
        timeout: Duration,
        stale_after: Duration,
    ) -> Result<Self, StackError> {
        let path = Self::lock_path_for(catalog_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let started = Instant::now();
        let mut contended = false;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let lock = Self {
                        path: path.clone(),
                        token: new_token(),
                    };
                    file.write_all(lock.token.as_bytes()).await?;
                    file.sync_all().await?;
                    drop(file);

                    if lock.is_held().await {
                        if contended {
                            log::debug!(
                                "Acquired catalog lock after {}ms",
                                started.elapsed().as_millis()
                            );
                        }
                        return Ok(lock);
                    }
                    log::debug!("Catalog lock {} was broken under us; retrying", path.display());
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if !contended {
                        log::debug!("Catalog lock {} is held; waiting", path.display());
                        contended = true;
                    }
                    if Self::is_stale(&path, stale_after).await {
                        Self::break_stale(&path, stale_after).await?;
                        continue;
                    }
                }
                Err(err) => return Err(err.into()),
            }

            if started.elapsed() >= timeout {
                return Err(StackError::LockTimeout(path));
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lock file still carries this acquisition's token.
    pub async fn is_held(&self) -> bool {
        tokio::fs::read_to_string(&self.path)
            .await
            .is_ok_and(|content| content == self.token)
    }

    /// Fails with [`StackError::LockLost`] unless this lock is still held.
    pub async fn ensure_held(&self) -> Result<(), StackError> {
        if self.is_held().await {
            Ok(())
        } else {
            Err(StackError::LockLost(self.path.clone()))
        }
    }

    async fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after)
    }

    /// Move the lock file aside under a unique name, so that of several
    /// breakers only one gets a given file, then re-check the age of the
    /// file actually moved. A live lock taken by mistake is linked back
    /// unless a newer lock already replaced it.
    async fn break_stale(path: &Path, stale_after: Duration) -> Result<(), StackError> {
        let mut aside = path.as_os_str().to_os_string();
        aside.push(format!(".broken-{}", new_token()));
        let aside = PathBuf::from(aside);

        match tokio::fs::rename(path, &aside).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        if Self::is_stale(&aside, stale_after).await {
            log::warn!("Breaking stale catalog lock {}", path.display());
        } else {
            match tokio::fs::hard_link(&aside, path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    log::warn!("Live catalog lock {} was replaced while restoring it", path.display());
                }
                Err(err) => return Err(err.into()),
            }
        }

        match tokio::fs::remove_file(&aside).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content == self.token => {}
            Ok(_) => {
                log::warn!("Catalog lock {} changed owner; leaving it", self.path.display());
                return;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => return,
            Err(err) => {
                log::warn!("Failed to read catalog lock {}: {err}", self.path.display());
                return;
            }
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                log::warn!("Failed to release catalog lock {}: {err}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn age(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    fn leftovers(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("stack.json");
        let long = Duration::from_secs(60);

        let held = CatalogLock::acquire(&catalog, long, long).await.unwrap();
        assert_eq!(held.path(), dir.path().join("stack.json.lock"));
        assert!(held.is_held().await);

        let err = CatalogLock::acquire(&catalog, Duration::from_millis(60), long)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::LockTimeout(_)));

        drop(held);
        assert!(!dir.path().join("stack.json.lock").exists());
        CatalogLock::acquire(&catalog, long, long).await.unwrap();
    }

    #[tokio::test]
    async fn stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("stack.json");
        let lock_path = CatalogLock::lock_path_for(&catalog);
        std::fs::write(&lock_path, "12345").unwrap();
        age(&lock_path, Duration::from_secs(120));

        let lock = CatalogLock::acquire(&catalog, Duration::from_secs(5), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(lock.is_held().await);
        assert_eq!(leftovers(&dir), vec!["stack.json.lock".to_string()]);
    }

    #[tokio::test]
    async fn racing_breakers_leave_a_single_holder() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("stack.json");
        let lock_path = CatalogLock::lock_path_for(&catalog);
        std::fs::write(&lock_path, "crashed-owner").unwrap();
        age(&lock_path, Duration::from_secs(120));

        let attempts: Vec<_> = (0..4)
            .map(|_| {
                let catalog = catalog.clone();
                tokio::spawn(async move {
                    CatalogLock::acquire(&catalog, Duration::from_millis(200), Duration::from_secs(30))
                        .await
                })
            })
            .collect();

        let mut held = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(lock) => held.push(lock),
                Err(err) => assert!(matches!(err, StackError::LockTimeout(_)), "{err}"),
            }
        }
        let mut owners = 0;
        for lock in &held {
            owners += usize::from(lock.is_held().await);
        }
        assert_eq!(owners, 1);
        assert_eq!(leftovers(&dir), vec!["stack.json.lock".to_string()]);
    }

    #[tokio::test]
    async fn breaking_a_fresh_lock_puts_it_back() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("stack.json.lock");
        std::fs::write(&lock_path, "live-owner").unwrap();

        CatalogLock::break_stale(&lock_path, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), "live-owner");
        assert_eq!(leftovers(&dir), vec!["stack.json.lock".to_string()]);
    }

    #[tokio::test]
    async fn taken_over_lock_is_detected_and_not_released() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("stack.json");
        let long = Duration::from_secs(60);
        let lock = CatalogLock::acquire(&catalog, long, long).await.unwrap();

        std::fs::write(lock.path(), "someone-else").unwrap();
        assert!(!lock.is_held().await);
        assert!(matches!(lock.ensure_held().await, Err(StackError::LockLost(_))));

        let path = lock.path().to_path_buf();
        drop(lock);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "someone-else");
    }
}
