use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use std::path::Path;

/// Version-control collaborator.
#[async_trait]
pub trait GitRepo: Send + Sync {
    /// HEAD commit of `path`, or `None` when it is not a git checkout.
    async fn current_commit(&self, path: &Path) -> Option<String>;

    /// Clone `url` into `dest`, which must not exist yet.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Shells out to the `git` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

#[async_trait]
impl GitRepo for GitCli {
    async fn current_commit(&self, path: &Path) -> Option<String> {
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(path)
            .args(["rev-parse", "--show-toplevel", "HEAD"])
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines().map(str::trim);
        let (toplevel, head) = (lines.next()?, lines.next()?);

        // A plain directory inside another checkout must not borrow its HEAD.
        let toplevel = tokio::fs::canonicalize(toplevel).await.ok()?;
        let here = tokio::fs::canonicalize(path).await.ok()?;
        if toplevel != here {
            log::debug!(
                "{} is inside the checkout at {}; treating it as unversioned",
                here.display(),
                toplevel.display()
            );
            return None;
        }
        (!head.is_empty()).then(|| head.to_string())
    }

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        log::info!("Cloning {url} into {}", dest.display());
        let output = tokio::process::Command::new("git")
            .arg("clone")
            .arg("--quiet")
            .arg(url)
            .arg(dest)
            .output()
            .await
            .map_err(|e| IndexerError::CloneFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(IndexerError::CloneFailed {
                url: url.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn plain_directory_has_no_commit() {
        let dir = TempDir::new().unwrap();
        assert_eq!(GitCli.current_commit(dir.path()).await, None);
    }

    fn git(dir: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=codestack", "-c", "user.email=codestack@localhost"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .output()
            .is_ok_and(|out| out.status.success())
    }

    #[tokio::test]
    async fn nested_plain_directory_does_not_borrow_parent_head() {
        let dir = TempDir::new().unwrap();
        let ready = git(dir.path(), &["init", "--quiet"])
            && git(dir.path(), &["commit", "--quiet", "--allow-empty", "-m", "init"]);
        if !ready {
            // git is not installed here.
            return;
        }
        let nested = dir.path().join("vendor/lib");
        std::fs::create_dir_all(&nested).unwrap();

        let head = GitCli.current_commit(dir.path()).await;
        assert!(head.as_deref().is_some_and(|h| h.len() >= 40));
        assert_eq!(GitCli.current_commit(&nested).await, None);
    }

    #[tokio::test]
    async fn missing_directory_has_no_commit() {
        let dir = TempDir::new().unwrap();
        assert_eq!(GitCli.current_commit(&dir.path().join("gone")).await, None);
    }
}
