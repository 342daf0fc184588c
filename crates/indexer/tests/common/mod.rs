#![allow(dead_code)]

use async_trait::async_trait;
use codestack_indexer::{GitRepo, IndexerError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Git double with settable HEADs and scripted clones.
#[derive(Default)]
pub struct FakeGit {
    commits: Mutex<HashMap<PathBuf, String>>,
    fail_clones: AtomicBool,
}

impl FakeGit {
    pub fn set_commit(&self, path: &Path, commit: &str) {
        self.commits
            .lock()
            .unwrap()
            .insert(key(path), commit.to_string());
    }

    pub fn fail_clones(&self) {
        self.fail_clones.store(true, Ordering::SeqCst);
    }
}

fn key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[async_trait]
impl GitRepo for FakeGit {
    async fn current_commit(&self, path: &Path) -> Option<String> {
        self.commits.lock().unwrap().get(&key(path)).cloned()
    }

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        if self.fail_clones.load(Ordering::SeqCst) {
            std::fs::write(dest.join("partial"), "x")?;
            return Err(IndexerError::CloneFailed {
                url: url.to_string(),
                reason: "remote hung up".to_string(),
            });
        }
        std::fs::write(dest.join("main.py"), "def main():\n    return 0\n")?;
        Ok(())
    }
}

pub fn write(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

pub const FOUR_FUNCTIONS: &str = "import os


def one():
    return os.getcwd()


def two():
    return 2


def three():
    return 3


def four():
    return 4
";

pub const TWO_FUNCTIONS: &str = "def alpha(x):
    return x + 1


def beta(y):
    return alpha(y) * 2
";

/// Two clean Python files and one that is not UTF-8.
pub fn seed_three_file_repo(root: &Path) {
    write(root, "pkg/four.py", FOUR_FUNCTIONS);
    write(root, "pkg/two.py", TWO_FUNCTIONS);
    write(root, "pkg/broken.py", [0xff_u8, 0xfe, 0x00, b'x']);
}
